use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::{ProjectDirs, UserDirs};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::scope_path;

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1200;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

const CONFIG_FILE_NAME: &str = "config.toml";
const BACKEND_URL_ENV: &str = "DOCMOUNT_BACKEND_URL";
const EXTERNAL_ROOT_ENV: &str = "DOCMOUNT_EXTERNAL_ROOT";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub external_root: Option<PathBuf>,
    pub data_root: Option<PathBuf>,
    pub meta_root: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub backend_url: String,
    pub request_timeout_secs: u64,
    pub poll_interval_ms: u64,
    /// Extensions (lowercase, no dot) whose files go through an extraction
    /// job before they can be mounted.
    pub extraction_extensions: Vec<String>,
    pub paths: PathSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            extraction_extensions: vec!["pdf".to_string()],
            paths: PathSettings::default(),
        }
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "docmount")
}

impl AppConfig {
    pub fn default_config_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Defaults, then the TOML file (explicit path or the platform config
    /// dir), then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let file = path
            .map(Path::to_path_buf)
            .or_else(Self::default_config_path);

        let mut config = match file {
            Some(file) if file.is_file() => Self::from_toml(&std::fs::read_to_string(&file)?)?,
            Some(file) if path.is_some() => {
                return Err(AppError::Config(format!(
                    "config file not found: {}",
                    file.display()
                )));
            }
            _ => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self, AppError> {
        Ok(toml::from_str(raw)?)
    }

    fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(BACKEND_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.backend_url = url.trim().to_string();
        }
        if let Some(root) = lookup(EXTERNAL_ROOT_ENV).filter(|v| !v.trim().is_empty()) {
            self.paths.external_root = Some(PathBuf::from(root.trim()));
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if !self.backend_url.starts_with("http://") && !self.backend_url.starts_with("https://")
        {
            return Err(AppError::Config(format!(
                "backend_url must be an http(s) URL, got '{}'",
                self.backend_url
            )));
        }
        if self.poll_interval_ms == 0 {
            return Err(AppError::Config(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(AppError::Config(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn needs_extraction(&self, path: &str) -> bool {
        scope_path::extension(path)
            .map(|ext| {
                self.extraction_extensions
                    .iter()
                    .any(|candidate| candidate.eq_ignore_ascii_case(&ext))
            })
            .unwrap_or(false)
    }
}

/// Roots resolved once at startup. Paths are stored normalized with `/`
/// separators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimePaths {
    pub external_root: String,
    pub data_root: String,
    pub meta_root: String,
}

impl RuntimePaths {
    pub fn new(external_root: &str, data_root: &str, meta_root: &str) -> Self {
        Self {
            external_root: scope_path::normalize(external_root),
            data_root: scope_path::normalize(data_root),
            meta_root: scope_path::normalize(meta_root),
        }
    }

    pub fn resolve(settings: &PathSettings) -> Result<Self, AppError> {
        let dirs = project_dirs();

        let external_root = match &settings.external_root {
            Some(root) => root.clone(),
            None => UserDirs::new()
                .and_then(|user| user.document_dir().map(Path::to_path_buf))
                .ok_or_else(|| {
                    AppError::Config("could not determine an external root".to_string())
                })?,
        };

        let data_root = match &settings.data_root {
            Some(root) => root.clone(),
            None => dirs
                .as_ref()
                .map(|d| d.data_dir().to_path_buf())
                .ok_or_else(|| AppError::Config("could not determine a data root".to_string()))?,
        };

        let meta_root = settings
            .meta_root
            .clone()
            .unwrap_or_else(|| data_root.join("meta"));

        Ok(Self::new(
            &external_root.to_string_lossy(),
            &data_root.to_string_lossy(),
            &meta_root.to_string_lossy(),
        ))
    }
}
