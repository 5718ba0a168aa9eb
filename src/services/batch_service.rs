use std::sync::Arc;

use crate::error::AppError;
use crate::models::batch::{BatchOutcome, BatchResult, FolderOperation};
use crate::models::mountable::MountableItem;
use crate::scope_path;
use crate::services::indicator_service::IndicatorSynchronizer;
use crate::services::mount_service::MountController;
use crate::services::path_service::PrivilegedBridge;

pub struct BatchAggregator {
    controller: Arc<MountController>,
    indicators: Arc<IndicatorSynchronizer>,
    bridge: Arc<dyn PrivilegedBridge>,
}

impl BatchAggregator {
    pub fn new(
        controller: Arc<MountController>,
        indicators: Arc<IndicatorSynchronizer>,
        bridge: Arc<dyn PrivilegedBridge>,
    ) -> Self {
        Self {
            controller,
            indicators,
            bridge,
        }
    }

    /// Runs `operation` on `folder` as one backend request and folds the
    /// backend's counters into a single outcome. Anything short of full
    /// success triggers an authoritative indicator refresh for the folder.
    pub async fn run_on_folder(
        &self,
        folder: &MountableItem,
        operation: FolderOperation,
    ) -> Result<BatchResult, AppError> {
        if !folder.is_folder {
            return Err(AppError::InvalidTarget(format!(
                "not a folder: {}",
                folder.project_relative_path
            )));
        }

        let files = match self.bridge.list_files(&folder.absolute_path).await {
            Ok(files) => files,
            Err(err) => {
                tracing::warn!(folder = %folder.project_relative_path, error = %err, "could not enumerate folder");
                Vec::new()
            }
        };

        let summary = self.controller.run_folder(folder, operation).await?;
        let result = BatchResult::new(summary.succeeded, summary.failed);
        tracing::info!(
            folder = %folder.project_relative_path,
            %operation,
            succeeded = result.succeeded,
            failed = result.failed,
            outcome = ?result.outcome,
            "folder batch finished"
        );

        if result.outcome == BatchOutcome::Success {
            let mounted = operation != FolderOperation::Unmount;
            for file in &files {
                self.indicators.mark_provisional(
                    &folder.project_relative_path,
                    scope_path::file_name(file),
                    mounted,
                );
            }
        } else if let Err(err) = self
            .indicators
            .ensure_folder_status(&folder.project_relative_path)
            .await
        {
            tracing::warn!(folder = %folder.project_relative_path, error = %err, "indicator refresh failed");
        }

        Ok(result)
    }
}
