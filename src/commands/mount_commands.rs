use serde::Serialize;

use crate::error::AppError;
use crate::models::batch::{BatchOutcome, BatchResult, FolderOperation};
use crate::models::job::{ExtractionResult, JobProgress};
use crate::models::mountable::{MountOutcome, MountState};
use crate::services::indicator_service::FolderIndicators;
use crate::services::notification_service::{Notification, NotificationLevel};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemCommand {
    Mount,
    Remount,
    Unmount,
    Reupload,
}

impl ItemCommand {
    fn folder_operation(self) -> Option<FolderOperation> {
        match self {
            Self::Mount => Some(FolderOperation::Mount),
            Self::Remount => Some(FolderOperation::Remount),
            Self::Unmount => Some(FolderOperation::Unmount),
            Self::Reupload => None,
        }
    }

    fn verb(self) -> &'static str {
        match self {
            Self::Mount => "Mount",
            Self::Remount => "Remount",
            Self::Unmount => "Unmount",
            Self::Reupload => "Re-upload",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum CommandOutcome {
    Item { outcome: MountOutcome },
    Folder { result: BatchResult },
}

pub async fn mount_path(
    state: &AppState,
    ui_path: &str,
    is_folder: bool,
) -> Result<CommandOutcome, AppError> {
    run_command(state, ui_path, is_folder, ItemCommand::Mount).await
}

pub async fn unmount_path(
    state: &AppState,
    ui_path: &str,
    is_folder: bool,
) -> Result<CommandOutcome, AppError> {
    run_command(state, ui_path, is_folder, ItemCommand::Unmount).await
}

pub async fn remount_path(
    state: &AppState,
    ui_path: &str,
    is_folder: bool,
) -> Result<CommandOutcome, AppError> {
    run_command(state, ui_path, is_folder, ItemCommand::Remount).await
}

pub async fn reupload_path(state: &AppState, ui_path: &str) -> Result<CommandOutcome, AppError> {
    run_command(state, ui_path, false, ItemCommand::Reupload).await
}

async fn run_command(
    state: &AppState,
    ui_path: &str,
    is_folder: bool,
    command: ItemCommand,
) -> Result<CommandOutcome, AppError> {
    let result = execute(state, ui_path, is_folder, command).await;
    match &result {
        Ok(outcome) => announce(state, command, outcome),
        Err(err) => notify_failure(state, &format!("{} failed", command.verb()), err),
    }
    result
}

async fn execute(
    state: &AppState,
    ui_path: &str,
    is_folder: bool,
    command: ItemCommand,
) -> Result<CommandOutcome, AppError> {
    let item = state.resolver.identify(ui_path, is_folder).await?;

    if item.is_folder {
        if let Some(operation) = command.folder_operation() {
            let result = state.batch.run_on_folder(&item, operation).await?;
            return Ok(CommandOutcome::Folder { result });
        }
    }

    let outcome = match command {
        ItemCommand::Mount => {
            state
                .controller
                .mount_with_progress(&item, extraction_progress(state))
                .await?
        }
        ItemCommand::Remount => {
            state
                .controller
                .remount_with_progress(&item, extraction_progress(state))
                .await?
        }
        ItemCommand::Unmount => state.controller.unmount(&item).await?,
        ItemCommand::Reupload => state.controller.reupload(&item).await?,
    };

    match &outcome {
        MountOutcome::Folder(_) => {}
        MountOutcome::Removed { .. } | MountOutcome::NothingToRemove => {
            state.indicators.mark_item(&item, false)
        }
        _ => state.indicators.mark_item(&item, true),
    }

    Ok(CommandOutcome::Item { outcome })
}

fn announce(state: &AppState, command: ItemCommand, outcome: &CommandOutcome) {
    let verb = command.verb();
    let notification = match outcome {
        CommandOutcome::Item { outcome } if outcome.is_quiet() => return,
        CommandOutcome::Item { outcome } => Notification::new(
            NotificationLevel::Success,
            &format!("{verb} complete"),
            outcome.describe(),
        ),
        CommandOutcome::Folder { result } => match result.outcome {
            BatchOutcome::Success => Notification::new(
                NotificationLevel::Success,
                &format!("{verb} complete"),
                format!("{} of {} files", result.succeeded, result.total),
            ),
            BatchOutcome::Partial => Notification::new(
                NotificationLevel::Error,
                &format!("{verb} partially failed"),
                format!("{} succeeded, {} failed", result.succeeded, result.failed),
            ),
            BatchOutcome::Failed => Notification::new(
                NotificationLevel::Error,
                &format!("{verb} failed"),
                format!("all {} files failed", result.failed),
            ),
        },
    };
    state.notifier.notify(notification);
}

/// Inline status line for each running extraction poll.
fn extraction_progress(state: &AppState) -> impl FnMut(JobProgress) + Send {
    let notifier = state.notifier.clone();
    move |progress: JobProgress| {
        notifier.notify(Notification::new(
            NotificationLevel::Info,
            "Extracting",
            progress.stage.unwrap_or_else(|| "processing".to_string()),
        ));
    }
}

fn notify_failure(state: &AppState, title: &str, err: &AppError) {
    state.notifier.notify(Notification::new(
        NotificationLevel::Error,
        title,
        err.user_message(),
    ));
}

/// Pulls the backend's view of a folder and replaces its indicators.
pub async fn refresh_folder_status(
    state: &AppState,
    ui_path: &str,
) -> Result<FolderIndicators, AppError> {
    let result = match state.resolver.to_relative(ui_path).await {
        Some(folder) => state.indicators.ensure_folder_status(&folder.path).await,
        None => Err(AppError::NotInProject(ui_path.to_string())),
    };
    if let Err(err) = &result {
        notify_failure(state, "Status refresh failed", err);
    }
    result
}

/// Render path: answers from local state only.
pub fn folder_indicators(state: &AppState, ui_path: &str) -> Option<FolderIndicators> {
    let folder = state.resolver.to_relative_sync(ui_path)?;
    state.indicators.folder_snapshot(&folder.path)
}

pub fn mount_state(state: &AppState, ui_path: &str) -> Option<MountState> {
    let item = state.resolver.to_relative_sync(ui_path)?;
    Some(state.controller.state_of(&item.path))
}

/// Host path of a project-relative path, for display next to a tree node.
pub fn host_path(state: &AppState, relative: &str) -> Option<String> {
    state.resolver.resolve_absolute_sync(relative)
}

/// Standalone extraction, with stage updates as inline notifications.
pub async fn extract_document(
    state: &AppState,
    ui_path: &str,
) -> Result<ExtractionResult, AppError> {
    let result = match state.resolver.identify(ui_path, false).await {
        Ok(item) => {
            state
                .poller
                .run(&item.project_relative_path, extraction_progress(state))
                .await
        }
        Err(err) => Err(err),
    };

    match &result {
        Ok(extraction) => state.notifier.notify(Notification::new(
            NotificationLevel::Success,
            "Extraction complete",
            extraction
                .stage
                .clone()
                .unwrap_or_else(|| "done".to_string()),
        )),
        Err(err) => notify_failure(state, "Extraction failed", err),
    }
    result
}

pub fn cancel_extraction(state: &AppState, task_id: &str) -> bool {
    state.poller.cancel(task_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, RuntimePaths};
    use crate::services::notification_service::{MemoryNotifier, Notifier};
    use crate::services::path_service::{LocalBridge, PrivilegedBridge};
    use crate::services::testing::{knowledge_base, FakeBackend};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn app(root: &str) -> (AppState, Arc<FakeBackend>, Arc<MemoryNotifier>) {
        let backend = FakeBackend::new();
        let notifier = Arc::new(MemoryNotifier::new());
        let bridge: Arc<dyn PrivilegedBridge> = Arc::new(LocalBridge::new(RuntimePaths::new(
            root,
            "/var/data",
            "/var/meta",
        )));
        let sink: Arc<dyn Notifier> = notifier.clone();
        let state = AppState::new(AppConfig::default(), bridge, backend.clone(), sink);
        (state, backend, notifier)
    }

    #[tokio::test]
    async fn mount_notifies_once_and_repeat_is_quiet() {
        let (_dir, root) = knowledge_base(&["data/notes.md"]);
        let (state, backend, notifier) = app(&root);
        backend.respond(
            "upload",
            json!({"status": "mounted", "document_count": 3, "vector_count": 12}),
        );
        backend.respond("upload", json!({"status": "exists"}));

        mount_path(&state, "data/notes.md", false).await.unwrap();
        let second = mount_path(&state, "data/notes.md", false).await.unwrap();

        assert_eq!(
            second,
            CommandOutcome::Item {
                outcome: MountOutcome::AlreadyMounted
            }
        );
        let notes = notifier.drain();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].level, NotificationLevel::Success);
        assert_eq!(notes[0].message, "Mounted (3 documents)");
        assert!(state.indicators.is_marked("data", "notes.md"));
        assert_eq!(
            mount_state(&state, "data/notes.md"),
            Some(MountState::Mounted {
                document_count: 3,
                vector_count: 12
            })
        );
    }

    #[tokio::test]
    async fn path_outside_project_fails_closed_with_notification() {
        let (_dir, root) = knowledge_base(&["data/notes.md"]);
        let (state, backend, notifier) = app(&root);

        let err = mount_path(&state, "/elsewhere/notes.md", false)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::NotInProject(_)));
        assert_eq!(backend.total_calls(), 0);
        let notes = notifier.drain();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].level, NotificationLevel::Error);
        assert_eq!(notes[0].title, "Mount failed");
    }

    #[tokio::test]
    async fn server_reason_reaches_the_user() {
        let (_dir, root) = knowledge_base(&["data/notes.md"]);
        let (state, backend, notifier) = app(&root);
        backend.fail(
            "upload",
            AppError::Server {
                status: 422,
                message: "unsupported encoding".to_string(),
            },
        );

        mount_path(&state, "data/notes.md", false).await.unwrap_err();

        let notes = notifier.drain();
        assert_eq!(notes[0].message, "unsupported encoding");
        assert_eq!(
            mount_state(&state, "data/notes.md"),
            Some(MountState::Failed {
                reason: "unsupported encoding".to_string()
            })
        );
    }

    #[tokio::test]
    async fn empty_unmount_is_quiet_and_removal_is_notified() {
        let (_dir, root) = knowledge_base(&["data/a.md", "data/b.md"]);
        let (state, backend, notifier) = app(&root);
        backend.respond(
            "unmount",
            json!({"status": "ok", "unmounted_documents": 0, "unmounted_vectors": 0}),
        );
        backend.respond(
            "unmount",
            json!({"status": "ok", "unmounted_documents": 2, "unmounted_vectors": 9}),
        );

        unmount_path(&state, "data/a.md", false).await.unwrap();
        assert!(notifier.is_empty());

        unmount_path(&state, "data/b.md", false).await.unwrap();
        let notes = notifier.drain();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].title, "Unmount complete");
        assert_eq!(
            backend.calls("unmount"),
            vec!["data/a.md folder=false", "data/b.md folder=false"]
        );
    }

    #[tokio::test]
    async fn partial_folder_mount_reports_and_reconciles() {
        let (_dir, root) =
            knowledge_base(&["data/docs/a.md", "data/docs/b.md", "data/docs/c.md"]);
        let (state, backend, notifier) = app(&root);
        backend.respond(
            "mount-folder",
            json!({"status": "partial", "mounted": 2, "failed": 1, "folder": "data/docs"}),
        );
        backend.respond(
            "upload-status",
            json!({"files": {"a.md": true, "b.md": true, "c.md": false}}),
        );

        let outcome = mount_path(&state, "data/docs", true).await.unwrap();

        assert_eq!(
            outcome,
            CommandOutcome::Folder {
                result: BatchResult::new(2, 1)
            }
        );
        let notes = notifier.drain();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].level, NotificationLevel::Error);
        assert_eq!(notes[0].message, "2 succeeded, 1 failed");

        let indicators = folder_indicators(&state, "data/docs").unwrap();
        assert_eq!(indicators.marked_names(), vec!["a.md", "b.md"]);
    }

    #[tokio::test]
    async fn folder_reupload_is_rejected() {
        let (_dir, root) = knowledge_base(&["data/docs/a.md"]);
        let (state, backend, notifier) = app(&root);

        let err = run_command(&state, "data/docs", true, ItemCommand::Reupload)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::InvalidTarget(_)));
        assert_eq!(backend.total_calls(), 0);
        assert_eq!(notifier.drain()[0].title, "Re-upload failed");
    }

    #[tokio::test]
    async fn folder_passed_as_file_is_rejected_before_any_request() {
        let (_dir, root) = knowledge_base(&["data/docs/", "data/docs/a.md"]);
        let (state, backend, notifier) = app(&root);

        let err = mount_path(&state, "data/docs", false).await.unwrap_err();

        assert!(matches!(err, AppError::InvalidTarget(_)));
        assert_eq!(backend.total_calls(), 0);
        let notes = notifier.drain();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].level, NotificationLevel::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn extraction_progress_is_shown_inline() {
        let (_dir, root) = knowledge_base(&["data/report.pdf"]);
        let (state, backend, notifier) = app(&root);
        backend.respond(
            "parse-pdf",
            json!({"status": "processing", "task_id": "t1", "stage": "queued"}),
        );
        backend.respond(
            "parse-status",
            json!({"status": "processing", "task_id": "t1", "stage": "ocr"}),
        );
        backend.respond(
            "parse-status",
            json!({"status": "success", "task_id": "t1", "stage": "done", "result": {"pages": 4}}),
        );

        let result = extract_document(&state, "data/report.pdf").await.unwrap();

        assert_eq!(result.payload, Some(json!({"pages": 4})));
        let notes = notifier.drain();
        let levels: Vec<_> = notes.iter().map(|n| n.level).collect();
        assert_eq!(
            levels,
            vec![
                NotificationLevel::Info,
                NotificationLevel::Info,
                NotificationLevel::Success
            ]
        );
        assert_eq!(notes[0].message, "queued");
        assert_eq!(notes[1].message, "ocr");
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_extraction_surfaces_as_failure() {
        let (_dir, root) = knowledge_base(&["data/report.pdf"]);
        let (state, backend, notifier) = app(&root);
        backend.respond(
            "parse-pdf",
            json!({"status": "processing", "task_id": "t1"}),
        );
        backend.respond_always(
            "parse-status",
            json!({"status": "processing", "task_id": "t1", "stage": "ocr"}),
        );
        let state = Arc::new(state);

        let task = {
            let state = state.clone();
            tokio::spawn(async move { extract_document(&state, "data/report.pdf").await })
        };
        while state.poller.active_tasks().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert!(cancel_extraction(&state, "t1"));
        let err = task.await.unwrap().unwrap_err();

        assert!(matches!(err, AppError::Cancelled(_)));
        assert!(state.poller.active_tasks().is_empty());
        let notes = notifier.drain();
        assert_eq!(notes.last().map(|n| n.title.as_str()), Some("Extraction failed"));
    }

    #[test]
    fn render_lookups_answer_from_cached_roots() {
        let (state, backend, _notifier) = app("/kb");

        assert_eq!(host_path(&state, "data/a.md").as_deref(), Some("/kb/data/a.md"));
        assert_eq!(host_path(&state, "../etc/passwd"), None);
        assert_eq!(
            mount_state(&state, "/kb/data/a.md"),
            Some(MountState::Unmounted)
        );
        assert_eq!(backend.total_calls(), 0);
    }

    #[tokio::test]
    async fn refresh_outside_project_is_reported() {
        let (_dir, root) = knowledge_base(&["data/a.md"]);
        let (state, backend, notifier) = app(&root);

        refresh_folder_status(&state, "/elsewhere").await.unwrap_err();

        assert_eq!(backend.total_calls(), 0);
        assert_eq!(notifier.drain()[0].title, "Status refresh failed");
    }
}
