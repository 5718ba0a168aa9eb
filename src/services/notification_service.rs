use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Success,
    Info,
    Error,
}

/// A user-visible message: a modal for successes and errors, inline status
/// for progress.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub level: NotificationLevel,
    pub title: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(level: NotificationLevel, title: &str, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            level,
            title: title.to_string(),
            message: message.into(),
            created_at: Utc::now(),
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Default sink when no UI is attached.
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: Notification) {
        match notification.level {
            NotificationLevel::Error => {
                tracing::error!(title = %notification.title, "{}", notification.message)
            }
            NotificationLevel::Success | NotificationLevel::Info => {
                tracing::info!(title = %notification.title, "{}", notification.message)
            }
        }
    }
}

/// Queues notifications until the UI drains them.
#[derive(Default)]
pub struct MemoryNotifier {
    queue: Mutex<Vec<Notification>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<Notification> {
        let mut queue = self
            .queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::take(&mut *queue)
    }

    pub fn len(&self) -> usize {
        self.queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&self, notification: Notification) {
        self.queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_notifier_drains_in_order() {
        let notifier = MemoryNotifier::new();
        notifier.notify(Notification::new(NotificationLevel::Info, "Extraction", "ocr"));
        notifier.notify(Notification::new(NotificationLevel::Error, "Mount failed", "boom"));
        assert_eq!(notifier.len(), 2);

        let drained = notifier.drain();
        assert_eq!(drained[0].title, "Extraction");
        assert_eq!(drained[1].level, NotificationLevel::Error);
        assert!(notifier.is_empty());
    }
}
