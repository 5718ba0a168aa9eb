use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Semaphore;

use crate::error::AppError;
use crate::models::backend::{
    FolderResponse, ParseResponse, ReuploadResponse, UnmountResponse, UploadResponse,
    UploadStatusResponse,
};
use crate::services::backend_client::DocumentBackend;

/// Scripted backend. Each endpoint answers from its queue first, then from
/// its sticky answer, and records every call with its path argument.
#[derive(Default)]
pub struct FakeBackend {
    scripts: Mutex<HashMap<&'static str, VecDeque<Result<Value, AppError>>>>,
    sticky: Mutex<HashMap<&'static str, Value>>,
    calls: Mutex<Vec<(&'static str, String)>>,
    gates: Mutex<HashMap<&'static str, Arc<Semaphore>>>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, endpoint: &'static str, value: Value) {
        self.push(endpoint, Ok(value));
    }

    pub fn fail(&self, endpoint: &'static str, err: AppError) {
        self.push(endpoint, Err(err));
    }

    pub fn respond_always(&self, endpoint: &'static str, value: Value) {
        self.sticky.lock().unwrap().insert(endpoint, value);
    }

    /// Blocks every call to `endpoint` until the returned semaphore gets a
    /// permit per call.
    pub fn hold(&self, endpoint: &'static str) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.gates.lock().unwrap().insert(endpoint, gate.clone());
        gate
    }

    pub fn calls(&self, endpoint: &str) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| *name == endpoint)
            .map(|(_, arg)| arg.clone())
            .collect()
    }

    pub fn call_count(&self, endpoint: &str) -> usize {
        self.calls(endpoint).len()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn push(&self, endpoint: &'static str, answer: Result<Value, AppError>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(endpoint)
            .or_default()
            .push_back(answer);
    }

    async fn answer<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        arg: &str,
    ) -> Result<T, AppError> {
        self.calls.lock().unwrap().push((endpoint, arg.to_string()));

        let gate = self.gates.lock().unwrap().get(endpoint).cloned();
        if let Some(gate) = gate {
            gate.acquire()
                .await
                .map_err(|e| AppError::Transport(e.to_string()))?
                .forget();
        }

        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(endpoint)
            .and_then(VecDeque::pop_front);
        let value = match scripted {
            Some(answer) => answer?,
            None => self
                .sticky
                .lock()
                .unwrap()
                .get(endpoint)
                .cloned()
                .ok_or_else(|| {
                    AppError::Transport(format!("no scripted response for {endpoint}"))
                })?,
        };
        Ok(serde_json::from_value(value)?)
    }
}

#[async_trait]
impl DocumentBackend for FakeBackend {
    async fn upload(&self, file_path: &str) -> Result<UploadResponse, AppError> {
        self.answer("upload", file_path).await
    }

    async fn reupload(
        &self,
        file_path: &str,
        force_reupload: bool,
    ) -> Result<ReuploadResponse, AppError> {
        self.answer("reupload", &format!("{file_path} force={force_reupload}"))
            .await
    }

    async fn unmount(&self, path: &str, is_folder: bool) -> Result<UnmountResponse, AppError> {
        self.answer("unmount", &format!("{path} folder={is_folder}"))
            .await
    }

    async fn mount_folder(&self, folder_path: &str) -> Result<FolderResponse, AppError> {
        self.answer("mount-folder", folder_path).await
    }

    async fn remount_folder(
        &self,
        folder_path: &str,
        force_reupload: bool,
    ) -> Result<FolderResponse, AppError> {
        self.answer(
            "remount-folder",
            &format!("{folder_path} force={force_reupload}"),
        )
        .await
    }

    async fn unmount_folder(&self, folder_path: &str) -> Result<FolderResponse, AppError> {
        self.answer("unmount-folder", folder_path).await
    }

    async fn parse_document(&self, file_path: &str) -> Result<ParseResponse, AppError> {
        self.answer("parse-pdf", file_path).await
    }

    async fn parse_status(&self, task_id: &str) -> Result<ParseResponse, AppError> {
        self.answer("parse-status", task_id).await
    }

    async fn upload_status(&self, folder_path: &str) -> Result<UploadStatusResponse, AppError> {
        self.answer("upload-status", folder_path).await
    }
}

/// Creates `<tmp>/kb` with the given relative files (folders end in `/`).
pub fn knowledge_base(entries: &[&str]) -> (tempfile::TempDir, String) {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("kb");
    std::fs::create_dir_all(&root).unwrap();
    for entry in entries {
        let path = root.join(entry.trim_end_matches('/'));
        if entry.ends_with('/') {
            std::fs::create_dir_all(&path).unwrap();
        } else {
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, entry.as_bytes()).unwrap();
        }
    }
    let root = crate::scope_path::normalize(&root.to_string_lossy());
    (dir, root)
}
