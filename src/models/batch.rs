use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FolderOperation {
    Mount,
    Remount,
    Unmount,
}

impl std::fmt::Display for FolderOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mount => write!(f, "mount"),
            Self::Remount => write!(f, "remount"),
            Self::Unmount => write!(f, "unmount"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchOutcome {
    Success,
    Partial,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub succeeded: u64,
    pub failed: u64,
    pub total: u64,
    pub outcome: BatchOutcome,
}

impl BatchResult {
    pub fn new(succeeded: u64, failed: u64) -> Self {
        Self {
            succeeded,
            failed,
            total: succeeded + failed,
            outcome: classify(succeeded, failed),
        }
    }
}

pub fn classify(succeeded: u64, failed: u64) -> BatchOutcome {
    if succeeded == 0 && failed > 0 {
        BatchOutcome::Failed
    } else if failed == 0 {
        BatchOutcome::Success
    } else {
        BatchOutcome::Partial
    }
}
