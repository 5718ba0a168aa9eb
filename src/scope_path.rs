/// Lexically normalizes a path: backslashes become `/`, empty and `.`
/// segments are dropped, `..` pops its parent, trailing slashes go away.
pub fn normalize(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let rooted = unified.starts_with('/');

    let mut parts: Vec<&str> = Vec::new();
    for part in unified.split('/') {
        match part {
            "" | "." => {}
            ".." => match parts.last() {
                Some(last) if *last != ".." => {
                    parts.pop();
                }
                _ if rooted => {}
                _ => parts.push(".."),
            },
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    if rooted {
        format!("/{joined}")
    } else {
        joined
    }
}

pub fn is_absolute(path: &str) -> bool {
    let unified = path.replace('\\', "/");
    if unified.starts_with('/') {
        return true;
    }
    let bytes = unified.as_bytes();
    bytes.len() >= 3 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' && bytes[2] == b'/'
}

pub fn is_within_scope(path: &str, root: &str) -> bool {
    strip_root(path, root).is_some()
}

/// Path of `path` relative to `root`, `""` for the root itself, `None` when
/// `path` lies outside it.
pub fn strip_root(path: &str, root: &str) -> Option<String> {
    let path = normalize(path);
    let root = normalize(root);

    let (cmp_path, cmp_root) = if cfg!(windows) {
        (path.to_ascii_lowercase(), root.to_ascii_lowercase())
    } else {
        (path.clone(), root.clone())
    };

    if cmp_path == cmp_root {
        return Some(String::new());
    }

    if cmp_root == "/" {
        return cmp_path
            .starts_with('/')
            .then(|| path.trim_start_matches('/').to_string());
    }

    cmp_path
        .starts_with(&(cmp_root + "/"))
        .then(|| path[root.len() + 1..].to_string())
}

pub fn join_root(root: &str, relative: &str) -> String {
    if relative.is_empty() {
        return normalize(root);
    }
    normalize(&format!("{root}/{relative}"))
}

pub fn file_name(path: &str) -> &str {
    path.trim_end_matches(['/', '\\'])
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(path)
}

pub fn parent(path: &str) -> String {
    let normalized = normalize(path);
    match normalized.rfind('/') {
        Some(0) => "/".to_string(),
        Some(index) => normalized[..index].to_string(),
        None => String::new(),
    }
}

pub fn extension(path: &str) -> Option<String> {
    let name = file_name(path);
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
