use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::models::backend::ParseStatus;
use crate::models::job::{ExtractionResult, JobProgress, JobState, Submission};
use crate::services::backend_client::DocumentBackend;

struct ActivePoll {
    token: CancellationToken,
    watchers: usize,
}

/// Drives extraction jobs to a terminal state. Every running poll is
/// registered under its task id so the owner can cancel it when the view
/// that started it goes away.
pub struct JobPoller {
    backend: Arc<dyn DocumentBackend>,
    interval: Duration,
    active: Mutex<HashMap<String, ActivePoll>>,
}

struct PollRegistration<'a> {
    poller: &'a JobPoller,
    task_id: &'a str,
}

impl Drop for PollRegistration<'_> {
    fn drop(&mut self) {
        self.poller.release(self.task_id);
    }
}

impl JobPoller {
    pub fn new(backend: Arc<dyn DocumentBackend>, interval: Duration) -> Self {
        Self {
            backend,
            interval,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Starts a job. A backend that finishes inline yields `Finished`.
    pub async fn submit(&self, file_path: &str) -> Result<Submission, AppError> {
        let response = self
            .backend
            .parse_document(file_path)
            .await
            .map_err(|err| match err {
                AppError::Decode(detail) => AppError::Job(format!("malformed job payload: {detail}")),
                other => other,
            })?;

        match response.status {
            ParseStatus::Success => Ok(Submission::Finished(ExtractionResult {
                task_id: response.task_id,
                stage: response.stage,
                payload: response.result,
            })),
            ParseStatus::Error => Err(AppError::Job(response.failure_reason())),
            ParseStatus::Queued | ParseStatus::Processing => match response.task_id {
                Some(task_id) => {
                    tracing::info!(file_path, task_id = %task_id, "extraction job started");
                    Ok(Submission::Pending(JobProgress {
                        task_id,
                        state: JobState::from(response.status),
                        stage: response.stage,
                        observed_at: chrono::Utc::now(),
                    }))
                }
                None => Err(AppError::Job(
                    "backend reported a running job without a task id".to_string(),
                )),
            },
        }
    }

    /// Polls until the job succeeds, fails, a status fetch fails, or the
    /// task is cancelled. Non-terminal answers go to `observer`.
    pub async fn await_completion<F>(
        &self,
        task_id: &str,
        mut observer: F,
    ) -> Result<ExtractionResult, AppError>
    where
        F: FnMut(JobProgress) + Send,
    {
        let token = self.register(task_id);
        let _registration = PollRegistration {
            poller: self,
            task_id,
        };

        loop {
            tokio::select! {
                _ = token.cancelled() => return Err(cancelled(task_id)),
                _ = tokio::time::sleep(self.interval) => {}
            }

            let fetched = tokio::select! {
                _ = token.cancelled() => return Err(cancelled(task_id)),
                fetched = self.backend.parse_status(task_id) => fetched,
            };

            let response = fetched.map_err(|err| {
                AppError::Job(format!("status check for task {task_id} failed: {err}"))
                    .capture()
            })?;

            let state = JobState::from(response.status);
            if !state.is_terminal() {
                observer(JobProgress {
                    task_id: task_id.to_string(),
                    state,
                    stage: response.stage,
                    observed_at: chrono::Utc::now(),
                });
                continue;
            }

            if state == JobState::Succeeded {
                tracing::info!(task_id, stage = ?response.stage, "extraction job succeeded");
                return Ok(ExtractionResult {
                    task_id: Some(task_id.to_string()),
                    stage: response.stage,
                    payload: response.result,
                });
            }
            return Err(AppError::Job(response.failure_reason()).capture());
        }
    }

    /// Submits and waits. A stage reported with the submission reaches the
    /// observer before the first poll.
    pub async fn run<F>(&self, file_path: &str, mut observer: F) -> Result<ExtractionResult, AppError>
    where
        F: FnMut(JobProgress) + Send,
    {
        match self.submit(file_path).await? {
            Submission::Finished(result) => Ok(result),
            Submission::Pending(progress) => {
                let task_id = progress.task_id.clone();
                if progress.stage.is_some() {
                    observer(progress);
                }
                self.await_completion(&task_id, observer).await
            }
        }
    }

    /// Returns whether a running poll was found.
    pub fn cancel(&self, task_id: &str) -> bool {
        let active = self
            .active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match active.get(task_id) {
            Some(poll) => {
                poll.token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        let active = self
            .active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for poll in active.values() {
            poll.token.cancel();
        }
    }

    pub fn active_tasks(&self) -> Vec<String> {
        let active = self
            .active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut tasks: Vec<String> = active.keys().cloned().collect();
        tasks.sort();
        tasks
    }

    fn register(&self, task_id: &str) -> CancellationToken {
        let mut active = self
            .active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let poll = active
            .entry(task_id.to_string())
            .or_insert_with(|| ActivePoll {
                token: CancellationToken::new(),
                watchers: 0,
            });
        poll.watchers += 1;
        poll.token.clone()
    }

    fn release(&self, task_id: &str) {
        let mut active = self
            .active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(poll) = active.get_mut(task_id) {
            poll.watchers = poll.watchers.saturating_sub(1);
            if poll.watchers == 0 {
                active.remove(task_id);
            }
        }
    }
}

fn cancelled(task_id: &str) -> AppError {
    tracing::info!(task_id, "extraction poll cancelled");
    AppError::Cancelled(format!("extraction job {task_id}"))
}
