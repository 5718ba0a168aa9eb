use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::RuntimePaths;
use crate::error::AppError;
use crate::models::mountable::MountableItem;
use crate::scope_path;

/// The process with real filesystem access. `Err` means the broker itself
/// could not answer; `Ok(None)` means the path is not part of the project.
#[async_trait]
pub trait PrivilegedBridge: Send + Sync {
    async fn resolve_project_path(&self, path: &str) -> Result<Option<String>, AppError>;

    async fn to_project_relative_path(&self, path: &str) -> Result<Option<String>, AppError>;

    fn runtime_paths_sync(&self) -> RuntimePaths;

    /// Answers from the runtime paths alone, never from a round trip.
    fn resolve_project_path_sync(&self, path: &str) -> Option<String> {
        let root = self.runtime_paths_sync().external_root;
        let candidate = anchor(path, &root);
        scope_path::is_within_scope(&candidate, &root).then_some(candidate)
    }

    /// Answers from the runtime paths alone, never from a round trip.
    fn to_project_relative_path_sync(&self, path: &str) -> Option<String> {
        let root = self.runtime_paths_sync().external_root;
        scope_path::strip_root(&anchor(path, &root), &root)
    }

    /// `None` when nothing exists at `path`.
    async fn entry_kind(&self, path: &str) -> Option<EntryKind>;

    /// Files directly inside `folder` (absolute), hidden entries excluded.
    async fn list_files(&self, folder: &str) -> Result<Vec<String>, AppError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    File,
    Folder,
}

impl EntryKind {
    fn expected(is_folder: bool) -> Self {
        if is_folder {
            Self::Folder
        } else {
            Self::File
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Folder => "folder",
        }
    }
}

/// Absolute inputs are normalized; relative ones are taken from `root`.
fn anchor(path: &str, root: &str) -> String {
    if scope_path::is_absolute(path) {
        scope_path::normalize(path)
    } else {
        scope_path::join_root(root, path)
    }
}

/// In-process bridge backed by the host filesystem.
pub struct LocalBridge {
    paths: RuntimePaths,
}

impl LocalBridge {
    pub fn new(paths: RuntimePaths) -> Self {
        Self { paths }
    }
}

#[async_trait]
impl PrivilegedBridge for LocalBridge {
    async fn resolve_project_path(&self, path: &str) -> Result<Option<String>, AppError> {
        Ok(self.resolve_project_path_sync(path))
    }

    async fn to_project_relative_path(&self, path: &str) -> Result<Option<String>, AppError> {
        Ok(self.to_project_relative_path_sync(path))
    }

    fn runtime_paths_sync(&self) -> RuntimePaths {
        self.paths.clone()
    }

    async fn entry_kind(&self, path: &str) -> Option<EntryKind> {
        let metadata = std::fs::metadata(path).ok()?;
        Some(if metadata.is_dir() {
            EntryKind::Folder
        } else {
            EntryKind::File
        })
    }

    async fn list_files(&self, folder: &str) -> Result<Vec<String>, AppError> {
        let folder = folder.to_string();
        tokio::task::spawn_blocking(move || {
            let dir = Path::new(&folder);
            if !dir.is_dir() {
                return Err(AppError::InvalidTarget(format!("not a directory: {folder}")));
            }

            let mut files: Vec<String> = walkdir::WalkDir::new(dir)
                .min_depth(1)
                .max_depth(1)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .filter(|e| !e.file_name().to_string_lossy().starts_with('.'))
                .map(|e| scope_path::normalize(&e.path().to_string_lossy()))
                .collect();
            files.sort();
            Ok(files)
        })
        .await
        .map_err(|e| AppError::Io(format!("directory listing task failed: {e}")))?
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PathAuthority {
    /// Answered by the privileged process.
    Authoritative,
    /// Derived by prefix stripping against the cached external root.
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedPath {
    pub path: String,
    pub authority: PathAuthority,
}

impl ResolvedPath {
    fn authoritative(path: String) -> Self {
        Self {
            path,
            authority: PathAuthority::Authoritative,
        }
    }

    fn degraded(path: String) -> Self {
        Self {
            path,
            authority: PathAuthority::Degraded,
        }
    }
}

pub struct PathResolver {
    bridge: Arc<dyn PrivilegedBridge>,
    runtime: RuntimePaths,
}

impl PathResolver {
    pub fn new(bridge: Arc<dyn PrivilegedBridge>) -> Self {
        let runtime = bridge.runtime_paths_sync();
        Self { bridge, runtime }
    }

    pub fn runtime_paths(&self) -> &RuntimePaths {
        &self.runtime
    }

    /// Authoritative absolute path. There is no fallback: a failed broker
    /// answer fails closed.
    pub async fn resolve_absolute(&self, ui_path: &str) -> Result<String, AppError> {
        match self.bridge.resolve_project_path(ui_path).await {
            Ok(Some(path)) => Ok(scope_path::normalize(&path)),
            Ok(None) => Err(AppError::NotInProject(ui_path.to_string())),
            Err(err) => {
                tracing::warn!(path = ui_path, error = %err, "privileged path resolution failed");
                Err(AppError::NotInProject(format!("{ui_path} ({err})")))
            }
        }
    }

    pub async fn to_relative(&self, path: &str) -> Option<ResolvedPath> {
        match self.bridge.to_project_relative_path(path).await {
            Ok(relative) => relative.map(|r| ResolvedPath::authoritative(scope_path::normalize(&r))),
            Err(err) => {
                tracing::warn!(path, error = %err, "falling back to prefix stripping");
                self.to_relative_sync(path)
            }
        }
    }

    /// Answers from the cached runtime paths only.
    pub fn to_relative_sync(&self, path: &str) -> Option<ResolvedPath> {
        self.bridge
            .to_project_relative_path_sync(path)
            .map(ResolvedPath::degraded)
    }

    /// Answers from the cached runtime paths only.
    pub fn resolve_absolute_sync(&self, relative: &str) -> Option<String> {
        self.bridge.resolve_project_path_sync(relative)
    }

    /// Identity for a mount-grade operation. Requires an authoritative
    /// absolute path and an existing item of the requested kind; the
    /// relative path may be derived from that absolute path if the broker
    /// cannot map it.
    pub async fn identify(&self, ui_path: &str, is_folder: bool) -> Result<MountableItem, AppError> {
        let absolute_path = self.resolve_absolute(ui_path).await?;

        let kind = self
            .bridge
            .entry_kind(&absolute_path)
            .await
            .ok_or_else(|| AppError::NotInProject(format!("{absolute_path} does not exist")))?;
        let expected = EntryKind::expected(is_folder);
        if kind != expected {
            return Err(AppError::InvalidTarget(format!(
                "{absolute_path} is a {}, not a {}",
                kind.as_str(),
                expected.as_str()
            )));
        }

        let project_relative_path = match self.bridge.to_project_relative_path(&absolute_path).await
        {
            Ok(Some(relative)) => scope_path::normalize(&relative),
            Ok(None) => return Err(AppError::NotInProject(absolute_path)),
            Err(err) => {
                tracing::warn!(path = %absolute_path, error = %err, "deriving relative path locally");
                scope_path::strip_root(&absolute_path, &self.runtime.external_root)
                    .ok_or_else(|| AppError::NotInProject(absolute_path.clone()))?
            }
        };

        if project_relative_path.is_empty() {
            return Err(AppError::InvalidTarget(
                "the project root itself cannot be mounted".to_string(),
            ));
        }

        Ok(MountableItem {
            absolute_path,
            project_relative_path,
            is_folder,
        })
    }
}
