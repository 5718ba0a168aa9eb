use std::sync::Arc;

use crate::config::{AppConfig, RuntimePaths};
use crate::error::AppError;
use crate::services::backend_client::{DocumentBackend, HttpBackend};
use crate::services::batch_service::BatchAggregator;
use crate::services::indicator_service::IndicatorSynchronizer;
use crate::services::job_poller::JobPoller;
use crate::services::mount_service::MountController;
use crate::services::notification_service::Notifier;
use crate::services::path_service::{LocalBridge, PathResolver, PrivilegedBridge};

pub struct AppState {
    pub config: Arc<AppConfig>,
    pub resolver: Arc<PathResolver>,
    pub poller: Arc<JobPoller>,
    pub controller: Arc<MountController>,
    pub indicators: Arc<IndicatorSynchronizer>,
    pub batch: BatchAggregator,
    pub notifier: Arc<dyn Notifier>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        bridge: Arc<dyn PrivilegedBridge>,
        backend: Arc<dyn DocumentBackend>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let config = Arc::new(config);
        let resolver = Arc::new(PathResolver::new(bridge.clone()));
        let poller = Arc::new(JobPoller::new(backend.clone(), config.poll_interval()));
        let controller = Arc::new(MountController::new(
            backend.clone(),
            poller.clone(),
            config.clone(),
        ));
        let indicators = Arc::new(IndicatorSynchronizer::new(backend));
        let batch = BatchAggregator::new(controller.clone(), indicators.clone(), bridge);

        Self {
            config,
            resolver,
            poller,
            controller,
            indicators,
            batch,
            notifier,
        }
    }

    /// Wires the HTTP backend and the local filesystem bridge. Runtime paths
    /// are resolved here, once.
    pub fn from_config(config: AppConfig, notifier: Arc<dyn Notifier>) -> Result<Self, AppError> {
        let paths = RuntimePaths::resolve(&config.paths)?;
        tracing::info!(
            external_root = %paths.external_root,
            backend = %config.backend_url,
            "runtime paths resolved"
        );
        let bridge: Arc<dyn PrivilegedBridge> = Arc::new(LocalBridge::new(paths));
        let backend: Arc<dyn DocumentBackend> =
            Arc::new(HttpBackend::new(&config.backend_url, config.request_timeout())?);
        Ok(Self::new(config, bridge, backend, notifier))
    }

    /// Called when the owning window goes away. Stops every extraction poll
    /// so none outlives the view that started it.
    pub fn shutdown(&self) {
        let tasks = self.poller.active_tasks();
        if !tasks.is_empty() {
            tracing::info!(count = tasks.len(), "cancelling extraction polls");
        }
        self.poller.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PathSettings;
    use crate::services::notification_service::MemoryNotifier;
    use crate::services::testing::FakeBackend;
    use serde_json::json;
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn from_config_uses_configured_roots() {
        let config = AppConfig {
            paths: PathSettings {
                external_root: Some(PathBuf::from("/kb")),
                data_root: Some(PathBuf::from("/var/docmount")),
                meta_root: None,
            },
            ..AppConfig::default()
        };

        let state = AppState::from_config(config, Arc::new(MemoryNotifier::new())).unwrap();
        assert_eq!(state.resolver.runtime_paths().external_root, "/kb");
        assert_eq!(state.resolver.runtime_paths().meta_root, "/var/docmount/meta");
        assert!(state.poller.active_tasks().is_empty());
    }

    #[test]
    fn shutdown_without_polls_is_harmless() {
        let config = AppConfig {
            paths: PathSettings {
                external_root: Some(PathBuf::from("/kb")),
                data_root: Some(PathBuf::from("/var/docmount")),
                meta_root: None,
            },
            ..AppConfig::default()
        };
        let state = AppState::from_config(config, Arc::new(MemoryNotifier::new())).unwrap();
        state.shutdown();
        assert!(state.poller.active_tasks().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_every_running_poll() {
        let backend = FakeBackend::new();
        backend.respond_always("parse-status", json!({"status": "processing", "stage": "ocr"}));
        let bridge: Arc<dyn PrivilegedBridge> = Arc::new(LocalBridge::new(RuntimePaths::new(
            "/kb",
            "/var/data",
            "/var/meta",
        )));
        let state = Arc::new(AppState::new(
            AppConfig::default(),
            bridge,
            backend.clone(),
            Arc::new(MemoryNotifier::new()),
        ));

        let polls: Vec<_> = ["t1", "t2"]
            .into_iter()
            .map(|task_id| {
                let state = state.clone();
                tokio::spawn(async move { state.poller.await_completion(task_id, |_| {}).await })
            })
            .collect();
        while state.poller.active_tasks().len() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tokio::time::sleep(state.config.poll_interval() + Duration::from_millis(100)).await;
        let polled = backend.call_count("parse-status");
        assert!(polled >= 2);

        state.shutdown();
        for poll in polls {
            let err = poll.await.unwrap().unwrap_err();
            assert!(matches!(err, AppError::Cancelled(_)));
        }
        assert!(state.poller.active_tasks().is_empty());

        tokio::time::sleep(state.config.poll_interval() * 5).await;
        assert_eq!(backend.call_count("parse-status"), polled);
    }
}
