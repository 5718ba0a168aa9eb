pub mod commands;
pub mod config;
pub mod error;
pub mod models;
pub mod scope_path;
pub mod services;
pub mod state;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

pub use error::AppError;
pub use services::backend_client::{DocumentBackend, HttpBackend};
pub use services::notification_service::{Notifier, TracingNotifier};
pub use state::AppState;

const DEFAULT_LOG_FILTER: &str = "docmount_lib=info";

/// Installs the fmt subscriber. `RUST_LOG` overrides the default filter.
pub fn init_logging() -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install log subscriber: {e}"))
}

/// Loads configuration and wires the services. Notifications go to
/// `notifier`, or to the log when no UI is attached.
pub fn bootstrap(
    config_path: Option<&Path>,
    notifier: Option<Arc<dyn Notifier>>,
) -> anyhow::Result<AppState> {
    if let Err(err) = init_logging() {
        eprintln!("{err}");
    }

    let config = config::AppConfig::load(config_path).context("failed to load configuration")?;
    let notifier: Arc<dyn Notifier> = match notifier {
        Some(notifier) => notifier,
        None => Arc::new(TracingNotifier),
    };
    let state = AppState::from_config(config, notifier).context("failed to start services")?;
    tracing::info!("docmount ready");
    Ok(state)
}
