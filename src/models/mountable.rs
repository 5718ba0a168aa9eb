use serde::{Deserialize, Serialize};

/// A file or folder addressed by both of its identities.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MountableItem {
    /// Host path. Only meaningful inside the privileged process.
    pub absolute_path: String,
    /// Path relative to the external root; the only form sent to the backend.
    pub project_relative_path: String,
    pub is_folder: bool,
}

impl MountableItem {
    pub fn name(&self) -> &str {
        crate::scope_path::file_name(&self.project_relative_path)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MountState {
    #[default]
    Unmounted,
    Mounting,
    Mounted {
        document_count: u64,
        vector_count: u64,
    },
    /// A folder whose files are mounted. The backend reports files here,
    /// never documents or vectors.
    FolderMounted {
        files: u64,
    },
    Failed {
        reason: String,
    },
    Unmounting,
    Remounting,
}

impl MountState {
    /// A transition is running; any other attempt on the item must wait.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Mounting | Self::Unmounting | Self::Remounting)
    }

    pub fn is_mounted(&self) -> bool {
        matches!(self, Self::Mounted { .. } | Self::FolderMounted { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unmounted => "unmounted",
            Self::Mounting => "mounting",
            Self::Mounted { .. } | Self::FolderMounted { .. } => "mounted",
            Self::Failed { .. } => "failed",
            Self::Unmounting => "unmounting",
            Self::Remounting => "remounting",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderSummary {
    pub succeeded: u64,
    pub failed: u64,
}

/// What one controller operation did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MountOutcome {
    Mounted { document_count: u64, vector_count: u64 },
    AlreadyMounted,
    Updated { document_count: u64, vector_count: u64 },
    Removed { documents: u64, vectors: u64 },
    NothingToRemove,
    Reuploaded,
    Uploaded,
    Unchanged,
    Folder(FolderSummary),
}

impl MountOutcome {
    /// Successful no-ops. These never raise a success notification.
    pub fn is_quiet(&self) -> bool {
        matches!(
            self,
            Self::AlreadyMounted | Self::NothingToRemove | Self::Unchanged
        )
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Mounted { document_count, .. } => {
                format!("Mounted ({document_count} documents)")
            }
            Self::AlreadyMounted => "Already mounted".to_string(),
            Self::Updated { document_count, .. } => {
                format!("Updated changed content ({document_count} documents)")
            }
            Self::Removed { documents, vectors } => {
                format!("Removed {documents} documents and {vectors} vectors")
            }
            Self::NothingToRemove => "Nothing to remove".to_string(),
            Self::Reuploaded => "Re-uploaded".to_string(),
            Self::Uploaded => "Uploaded".to_string(),
            Self::Unchanged => "Content unchanged".to_string(),
            Self::Folder(summary) => format!(
                "{} succeeded, {} failed",
                summary.succeeded, summary.failed
            ),
        }
    }
}
