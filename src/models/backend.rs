//! Request and response bodies of the document backend.
//!
//! Status strings are decoded into enums; a status this client does not know
//! is a decode error rather than a silent fall-through.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::job::JobState;

#[derive(Debug, Clone, Serialize)]
pub struct FolderRequest<'a> {
    pub folder_path: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct RemountFolderRequest<'a> {
    pub folder_path: &'a str,
    pub force_reupload: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileRequest<'a> {
    pub file_path: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReuploadRequest<'a> {
    pub file_path: &'a str,
    pub force_reupload: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnmountRequest<'a> {
    pub file_path: &'a str,
    pub is_folder: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Mounted,
    Exists,
    Updated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub status: UploadStatus,
    #[serde(default)]
    pub document_count: Option<u64>,
    #[serde(default)]
    pub vector_count: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReuploadStatus {
    Reuploaded,
    Uploaded,
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReuploadResponse {
    pub status: ReuploadStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnmountResponse {
    pub status: String,
    pub unmounted_documents: u64,
    pub unmounted_vectors: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FolderResponse {
    pub status: String,
    pub mounted: u64,
    pub failed: u64,
    pub folder: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseStatus {
    Queued,
    Processing,
    Success,
    Error,
}

impl From<ParseStatus> for JobState {
    fn from(status: ParseStatus) -> Self {
        match status {
            ParseStatus::Queued => Self::Queued,
            ParseStatus::Processing => Self::Processing,
            ParseStatus::Success => Self::Succeeded,
            ParseStatus::Error => Self::Failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseResponse {
    pub status: ParseStatus,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub stage: Option<String>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ParseResponse {
    pub fn failure_reason(&self) -> String {
        self.error
            .clone()
            .or_else(|| self.message.clone())
            .or_else(|| self.stage.clone())
            .unwrap_or_else(|| "extraction failed".to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadStatusResponse {
    #[serde(default)]
    pub files: BTreeMap<String, bool>,
}

/// Error body of a non-2xx answer. `detail` may be a string or a
/// structured validation list.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ErrorBody {
    pub detail: Option<serde_json::Value>,
    pub message: Option<String>,
}

impl ErrorBody {
    pub fn into_message(self) -> Option<String> {
        match self.detail {
            Some(serde_json::Value::String(text)) => Some(text),
            Some(serde_json::Value::Null) | None => self.message,
            Some(other) => Some(other.to_string()),
        }
    }
}
