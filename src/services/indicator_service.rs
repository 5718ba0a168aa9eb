use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;

use crate::error::AppError;
use crate::models::mountable::MountableItem;
use crate::scope_path;
use crate::services::backend_client::DocumentBackend;

/// Indicator state of the files directly inside one folder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderIndicators {
    pub folder: String,
    /// File names the backend last reported as mounted.
    pub mounted: BTreeSet<String>,
    /// Local marks set after an operation, valid until the next sync.
    pub provisional: BTreeMap<String, bool>,
    pub synced_at: Option<DateTime<Utc>>,
}

impl FolderIndicators {
    pub fn is_marked(&self, name: &str) -> bool {
        self.provisional
            .get(name)
            .copied()
            .unwrap_or_else(|| self.mounted.contains(name))
    }

    pub fn marked_names(&self) -> Vec<String> {
        let mut names: BTreeSet<String> = self
            .mounted
            .iter()
            .filter(|name| self.provisional.get(*name) != Some(&false))
            .cloned()
            .collect();
        names.extend(
            self.provisional
                .iter()
                .filter(|(_, marked)| **marked)
                .map(|(name, _)| name.clone()),
        );
        names.into_iter().collect()
    }
}

type FolderTable = Arc<RwLock<HashMap<String, FolderIndicators>>>;
type PendingSync = Shared<BoxFuture<'static, Result<FolderIndicators, AppError>>>;

pub struct IndicatorSynchronizer {
    backend: Arc<dyn DocumentBackend>,
    folders: FolderTable,
    in_flight: Mutex<HashMap<String, (u64, PendingSync)>>,
    next_sync_id: AtomicU64,
}

impl IndicatorSynchronizer {
    pub fn new(backend: Arc<dyn DocumentBackend>) -> Self {
        Self {
            backend,
            folders: Arc::new(RwLock::new(HashMap::new())),
            in_flight: Mutex::new(HashMap::new()),
            next_sync_id: AtomicU64::new(1),
        }
    }

    /// Fetches the backend's view of `relative_path` and replaces the local
    /// indicators with it. Callers arriving while a fetch for the same
    /// folder is running share that fetch.
    pub async fn ensure_folder_status(
        &self,
        relative_path: &str,
    ) -> Result<FolderIndicators, AppError> {
        let folder = scope_path::normalize(relative_path);

        let (sync_id, pending) = {
            let mut in_flight = self
                .in_flight
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            match in_flight.get(&folder) {
                Some((sync_id, pending)) => {
                    tracing::debug!(folder = %folder, "joining pending status refresh");
                    (*sync_id, pending.clone())
                }
                None => {
                    let sync_id = self.next_sync_id.fetch_add(1, Ordering::Relaxed);
                    let pending =
                        fetch_folder(self.backend.clone(), self.folders.clone(), folder.clone())
                            .boxed()
                            .shared();
                    in_flight.insert(folder.clone(), (sync_id, pending.clone()));
                    (sync_id, pending)
                }
            }
        };

        let result = pending.await;

        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if matches!(in_flight.get(&folder), Some((current, _)) if *current == sync_id) {
            in_flight.remove(&folder);
        }

        result
    }

    /// Optimistic mark, overwritten by the next authoritative sync.
    pub fn mark_provisional(&self, folder: &str, name: &str, mounted: bool) {
        let folder = scope_path::normalize(folder);
        let mut folders = self
            .folders
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let entry = folders
            .entry(folder.clone())
            .or_insert_with(|| FolderIndicators {
                folder,
                ..FolderIndicators::default()
            });
        entry.provisional.insert(name.to_string(), mounted);
    }

    pub fn mark_item(&self, item: &MountableItem, mounted: bool) {
        let folder = scope_path::parent(&item.project_relative_path);
        self.mark_provisional(&folder, item.name(), mounted);
    }

    pub fn is_marked(&self, folder: &str, name: &str) -> bool {
        let folders = self
            .folders
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        folders
            .get(&scope_path::normalize(folder))
            .map(|indicators| indicators.is_marked(name))
            .unwrap_or(false)
    }

    pub fn folder_snapshot(&self, folder: &str) -> Option<FolderIndicators> {
        let folders = self
            .folders
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        folders.get(&scope_path::normalize(folder)).cloned()
    }

    pub fn clear_folder(&self, folder: &str) {
        let mut folders = self
            .folders
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        folders.remove(&scope_path::normalize(folder));
    }
}

async fn fetch_folder(
    backend: Arc<dyn DocumentBackend>,
    folders: FolderTable,
    folder: String,
) -> Result<FolderIndicators, AppError> {
    let response = backend.upload_status(&folder).await?;

    let mounted: BTreeSet<String> = response
        .files
        .into_iter()
        .filter(|(_, mounted)| *mounted)
        .filter_map(|(name, _)| direct_child(&folder, &name))
        .collect();

    let indicators = FolderIndicators {
        folder: folder.clone(),
        mounted,
        provisional: BTreeMap::new(),
        synced_at: Some(Utc::now()),
    };
    tracing::debug!(folder = %folder, mounted = indicators.mounted.len(), "indicators reconciled");

    let mut folders = folders
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    folders.insert(folder, indicators.clone());
    Ok(indicators)
}

/// Reduces a status key to a name directly inside `folder`. Keys naming
/// something deeper in the tree have no indicator at this level.
fn direct_child(folder: &str, key: &str) -> Option<String> {
    let key = scope_path::normalize(key);
    let name = scope_path::strip_root(&key, folder).unwrap_or(key);
    (!name.is_empty() && !name.contains('/')).then_some(name)
}
