use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::config::AppConfig;
use crate::error::AppError;
use crate::models::backend::{FolderResponse, ReuploadStatus, UploadResponse, UploadStatus};
use crate::models::batch::{classify, BatchOutcome, FolderOperation};
use crate::models::job::JobProgress;
use crate::models::mountable::{FolderSummary, MountOutcome, MountState, MountableItem};
use crate::services::backend_client::DocumentBackend;
use crate::services::job_poller::JobPoller;

type StateTable = Mutex<HashMap<String, MountState>>;

/// One running transition. Whatever happens to the operation, dropping this
/// leaves the item in a settled state, so the item is never stuck busy.
struct Transition<'a> {
    states: &'a StateTable,
    key: String,
    previous: MountState,
    settled: bool,
}

impl Transition<'_> {
    fn settle(mut self, state: MountState) {
        write_state(self.states, &self.key, state);
        self.settled = true;
    }

    fn revert(self) {
        let previous = self.previous.clone();
        self.settle(previous);
    }
}

impl Drop for Transition<'_> {
    fn drop(&mut self) {
        if !self.settled {
            tracing::warn!(path = %self.key, "transition interrupted, restoring previous state");
            write_state(self.states, &self.key, self.previous.clone());
        }
    }
}

fn write_state(states: &StateTable, key: &str, state: MountState) {
    let mut states = states
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    tracing::info!(path = key, state = state.as_str(), "mount state settled");
    if state == MountState::Unmounted {
        states.remove(key);
    } else {
        states.insert(key.to_string(), state);
    }
}

fn mounted(document_count: u64, vector_count: u64) -> MountState {
    MountState::Mounted {
        document_count,
        vector_count,
    }
}

fn counts_of(state: &MountState) -> Option<(u64, u64)> {
    match state {
        MountState::Mounted {
            document_count,
            vector_count,
        } => Some((*document_count, *vector_count)),
        _ => None,
    }
}

/// Tracks the mount state of every item the user has acted on and issues
/// the backend requests that move it between states.
pub struct MountController {
    backend: Arc<dyn DocumentBackend>,
    poller: Arc<JobPoller>,
    config: Arc<AppConfig>,
    states: StateTable,
}

impl MountController {
    pub fn new(
        backend: Arc<dyn DocumentBackend>,
        poller: Arc<JobPoller>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            backend,
            poller,
            config,
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn state_of(&self, relative_path: &str) -> MountState {
        let states = self
            .states
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        states.get(relative_path).cloned().unwrap_or_default()
    }

    /// Drops local knowledge of an item. Items with a running transition
    /// are kept.
    pub fn forget(&self, relative_path: &str) -> bool {
        let mut states = self
            .states
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match states.get(relative_path) {
            Some(state) if state.is_in_flight() => false,
            Some(_) => {
                states.remove(relative_path);
                true
            }
            None => false,
        }
    }

    fn begin(&self, item: &MountableItem, next: MountState) -> Result<Transition<'_>, AppError> {
        let key = item.project_relative_path.clone();
        let mut states = self
            .states
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let previous = states.get(&key).cloned().unwrap_or_default();

        if previous.is_in_flight() {
            tracing::warn!(
                path = %key,
                running = previous.as_str(),
                requested = next.as_str(),
                "transition rejected"
            );
            return Err(AppError::Busy(key));
        }

        tracing::info!(path = %key, from = previous.as_str(), to = next.as_str(), "transition started");
        states.insert(key.clone(), next);
        Ok(Transition {
            states: &self.states,
            key,
            previous,
            settled: false,
        })
    }

    pub async fn mount(&self, item: &MountableItem) -> Result<MountOutcome, AppError> {
        self.mount_with_progress(item, |_| {}).await
    }

    /// Mounts a file or folder. Files in an extraction format are extracted
    /// first; `observer` receives the job's progress.
    pub async fn mount_with_progress<F>(
        &self,
        item: &MountableItem,
        observer: F,
    ) -> Result<MountOutcome, AppError>
    where
        F: FnMut(JobProgress) + Send,
    {
        let transition = self.begin(item, MountState::Mounting)?;

        let result = if item.is_folder {
            self.backend
                .mount_folder(&item.project_relative_path)
                .await
                .map(|response| {
                    let (summary, state) =
                        settle_folder(FolderOperation::Mount, &response, &transition.previous);
                    (MountOutcome::Folder(summary), state)
                })
        } else {
            self.upload_file(item, &transition.previous, observer).await
        };

        finish(transition, result)
    }

    async fn upload_file<F>(
        &self,
        item: &MountableItem,
        previous: &MountState,
        observer: F,
    ) -> Result<(MountOutcome, MountState), AppError>
    where
        F: FnMut(JobProgress) + Send,
    {
        if self.config.needs_extraction(&item.project_relative_path) {
            self.poller
                .run(&item.project_relative_path, observer)
                .await?;
        }

        let response = self.backend.upload(&item.project_relative_path).await?;
        Ok(settle_upload(&response, previous))
    }

    /// Removes the item's indexed artifacts. A failed request leaves the
    /// item where it was.
    pub async fn unmount(&self, item: &MountableItem) -> Result<MountOutcome, AppError> {
        let transition = self.begin(item, MountState::Unmounting)?;

        match self
            .backend
            .unmount(&item.project_relative_path, item.is_folder)
            .await
        {
            Ok(response) => {
                let outcome = if response.unmounted_documents == 0 && response.unmounted_vectors == 0
                {
                    MountOutcome::NothingToRemove
                } else {
                    MountOutcome::Removed {
                        documents: response.unmounted_documents,
                        vectors: response.unmounted_vectors,
                    }
                };
                transition.settle(MountState::Unmounted);
                Ok(outcome)
            }
            Err(err) => {
                transition.revert();
                Err(err.capture())
            }
        }
    }

    pub async fn remount(&self, item: &MountableItem) -> Result<MountOutcome, AppError> {
        self.remount_with_progress(item, |_| {}).await
    }

    /// Forced re-submission regardless of the current state. Never passes
    /// through `Unmounted`.
    pub async fn remount_with_progress<F>(
        &self,
        item: &MountableItem,
        observer: F,
    ) -> Result<MountOutcome, AppError>
    where
        F: FnMut(JobProgress) + Send,
    {
        let transition = self.begin(item, MountState::Remounting)?;

        let result = if item.is_folder {
            self.backend
                .remount_folder(&item.project_relative_path, true)
                .await
                .map(|response| {
                    let (summary, state) =
                        settle_folder(FolderOperation::Remount, &response, &transition.previous);
                    (MountOutcome::Folder(summary), state)
                })
        } else {
            self.reupload_file(item, true, &transition.previous, observer)
                .await
        };

        finish(transition, result)
    }

    /// Re-uploads a file whose content may have changed. The backend
    /// short-circuits identical content with `unchanged`.
    pub async fn reupload(&self, item: &MountableItem) -> Result<MountOutcome, AppError> {
        if item.is_folder {
            return Err(AppError::InvalidTarget(format!(
                "reupload applies to files only: {}",
                item.project_relative_path
            )));
        }

        let transition = self.begin(item, MountState::Remounting)?;
        let result = self
            .reupload_file(item, false, &transition.previous, |_| {})
            .await;
        finish(transition, result)
    }

    async fn reupload_file<F>(
        &self,
        item: &MountableItem,
        force_reupload: bool,
        previous: &MountState,
        observer: F,
    ) -> Result<(MountOutcome, MountState), AppError>
    where
        F: FnMut(JobProgress) + Send,
    {
        if force_reupload && self.config.needs_extraction(&item.project_relative_path) {
            self.poller
                .run(&item.project_relative_path, observer)
                .await?;
        }

        let response = self
            .backend
            .reupload(&item.project_relative_path, force_reupload)
            .await?;
        Ok(settle_reupload(response.status, previous))
    }

    /// One folder-level request for the whole folder; the backend recurses.
    pub async fn run_folder(
        &self,
        folder: &MountableItem,
        operation: FolderOperation,
    ) -> Result<FolderSummary, AppError> {
        if !folder.is_folder {
            return Err(AppError::InvalidTarget(format!(
                "not a folder: {}",
                folder.project_relative_path
            )));
        }

        let next = match operation {
            FolderOperation::Mount => MountState::Mounting,
            FolderOperation::Remount => MountState::Remounting,
            FolderOperation::Unmount => MountState::Unmounting,
        };
        let transition = self.begin(folder, next)?;
        let path = folder.project_relative_path.as_str();

        let response = match operation {
            FolderOperation::Mount => self.backend.mount_folder(path).await,
            FolderOperation::Remount => self.backend.remount_folder(path, true).await,
            FolderOperation::Unmount => self.backend.unmount_folder(path).await,
        };

        match response.map(|response| settle_folder(operation, &response, &transition.previous)) {
            Ok((summary, state)) => {
                transition.settle(state);
                Ok(summary)
            }
            Err(err) if operation == FolderOperation::Unmount => {
                transition.revert();
                Err(err.capture())
            }
            Err(err) => {
                transition.settle(MountState::Failed {
                    reason: err.user_message(),
                });
                Err(err.capture())
            }
        }
    }
}

/// Settles a mount-like transition: success takes the computed state, any
/// error leaves the item `Failed` with the user-facing reason.
fn finish(
    transition: Transition<'_>,
    result: Result<(MountOutcome, MountState), AppError>,
) -> Result<MountOutcome, AppError> {
    match result {
        Ok((outcome, state)) => {
            transition.settle(state);
            Ok(outcome)
        }
        Err(err) => {
            transition.settle(MountState::Failed {
                reason: err.user_message(),
            });
            Err(err.capture())
        }
    }
}

fn settle_upload(response: &UploadResponse, previous: &MountState) -> (MountOutcome, MountState) {
    let reported = (
        response.document_count.unwrap_or(0),
        response.vector_count.unwrap_or(0),
    );

    match response.status {
        UploadStatus::Mounted => (
            MountOutcome::Mounted {
                document_count: reported.0,
                vector_count: reported.1,
            },
            mounted(reported.0, reported.1),
        ),
        UploadStatus::Exists => {
            let (documents, vectors) = counts_of(previous).unwrap_or(reported);
            (MountOutcome::AlreadyMounted, mounted(documents, vectors))
        }
        UploadStatus::Updated => (
            MountOutcome::Updated {
                document_count: reported.0,
                vector_count: reported.1,
            },
            mounted(reported.0, reported.1),
        ),
    }
}

fn settle_reupload(status: ReuploadStatus, previous: &MountState) -> (MountOutcome, MountState) {
    let (documents, vectors) = counts_of(previous).unwrap_or((0, 0));
    let outcome = match status {
        ReuploadStatus::Reuploaded => MountOutcome::Reuploaded,
        ReuploadStatus::Uploaded => MountOutcome::Uploaded,
        ReuploadStatus::Unchanged => MountOutcome::Unchanged,
    };
    (outcome, mounted(documents, vectors))
}

fn settle_folder(
    operation: FolderOperation,
    response: &FolderResponse,
    previous: &MountState,
) -> (FolderSummary, MountState) {
    let summary = FolderSummary {
        succeeded: response.mounted,
        failed: response.failed,
    };
    let outcome = classify(summary.succeeded, summary.failed);

    let state = match (operation, outcome) {
        (FolderOperation::Unmount, BatchOutcome::Failed) => previous.clone(),
        (FolderOperation::Unmount, _) => MountState::Unmounted,
        (_, BatchOutcome::Failed) => MountState::Failed {
            reason: format!(
                "{} of {} files failed to {operation}",
                summary.failed,
                summary.succeeded + summary.failed
            ),
        },
        (_, _) => MountState::FolderMounted {
            files: summary.succeeded,
        },
    };

    (summary, state)
}
