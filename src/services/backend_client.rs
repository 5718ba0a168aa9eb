use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::AppError;
use crate::models::backend::{
    ErrorBody, FileRequest, FolderRequest, FolderResponse, ParseResponse, RemountFolderRequest,
    ReuploadRequest, ReuploadResponse, UnmountRequest, UnmountResponse, UploadResponse,
    UploadStatusResponse,
};

/// The document indexing service. Every path argument is project-relative.
#[async_trait]
pub trait DocumentBackend: Send + Sync {
    async fn upload(&self, file_path: &str) -> Result<UploadResponse, AppError>;

    async fn reupload(
        &self,
        file_path: &str,
        force_reupload: bool,
    ) -> Result<ReuploadResponse, AppError>;

    async fn unmount(&self, path: &str, is_folder: bool) -> Result<UnmountResponse, AppError>;

    async fn mount_folder(&self, folder_path: &str) -> Result<FolderResponse, AppError>;

    async fn remount_folder(
        &self,
        folder_path: &str,
        force_reupload: bool,
    ) -> Result<FolderResponse, AppError>;

    async fn unmount_folder(&self, folder_path: &str) -> Result<FolderResponse, AppError>;

    async fn parse_document(&self, file_path: &str) -> Result<ParseResponse, AppError>;

    async fn parse_status(&self, task_id: &str) -> Result<ParseResponse, AppError>;

    async fn upload_status(&self, folder_path: &str) -> Result<UploadStatusResponse, AppError>;
}

pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/api/document/{endpoint}", self.base_url)
    }

    async fn post<B, T>(&self, endpoint: &str, body: &B) -> Result<T, AppError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        tracing::debug!(endpoint, "POST");
        let response = self.client.post(self.url(endpoint)).json(body).send().await?;
        decode(response).await
    }

    async fn get<T>(&self, endpoint: &str) -> Result<T, AppError>
    where
        T: DeserializeOwned,
    {
        tracing::debug!(endpoint, "GET");
        let response = self.client.get(self.url(endpoint)).send().await?;
        decode(response).await
    }
}

async fn decode<T>(response: reqwest::Response) -> Result<T, AppError>
where
    T: DeserializeOwned,
{
    let status = response.status();
    let bytes = response.bytes().await?;

    if !status.is_success() {
        let message = serde_json::from_slice::<ErrorBody>(&bytes)
            .ok()
            .and_then(ErrorBody::into_message)
            .unwrap_or_else(|| {
                let text = String::from_utf8_lossy(&bytes).trim().to_string();
                if text.is_empty() {
                    status.canonical_reason().unwrap_or("request failed").to_string()
                } else {
                    text
                }
            });
        return Err(AppError::Server {
            status: status.as_u16(),
            message,
        });
    }

    Ok(serde_json::from_slice(&bytes)?)
}

#[async_trait]
impl DocumentBackend for HttpBackend {
    async fn upload(&self, file_path: &str) -> Result<UploadResponse, AppError> {
        self.post("upload", &FileRequest { file_path }).await
    }

    async fn reupload(
        &self,
        file_path: &str,
        force_reupload: bool,
    ) -> Result<ReuploadResponse, AppError> {
        self.post(
            "reupload",
            &ReuploadRequest {
                file_path,
                force_reupload,
            },
        )
        .await
    }

    async fn unmount(&self, path: &str, is_folder: bool) -> Result<UnmountResponse, AppError> {
        self.post(
            "unmount",
            &UnmountRequest {
                file_path: path,
                is_folder,
            },
        )
        .await
    }

    async fn mount_folder(&self, folder_path: &str) -> Result<FolderResponse, AppError> {
        self.post("mount-folder", &FolderRequest { folder_path })
            .await
    }

    async fn remount_folder(
        &self,
        folder_path: &str,
        force_reupload: bool,
    ) -> Result<FolderResponse, AppError> {
        self.post(
            "remount-folder",
            &RemountFolderRequest {
                folder_path,
                force_reupload,
            },
        )
        .await
    }

    async fn unmount_folder(&self, folder_path: &str) -> Result<FolderResponse, AppError> {
        self.post("unmount-folder", &FolderRequest { folder_path })
            .await
    }

    async fn parse_document(&self, file_path: &str) -> Result<ParseResponse, AppError> {
        self.post("parse-pdf", &FileRequest { file_path }).await
    }

    async fn parse_status(&self, task_id: &str) -> Result<ParseResponse, AppError> {
        self.get(&format!("parse-pdf/status/{task_id}")).await
    }

    async fn upload_status(&self, folder_path: &str) -> Result<UploadStatusResponse, AppError> {
        self.post("upload-status", &FolderRequest { folder_path })
            .await
    }
}
