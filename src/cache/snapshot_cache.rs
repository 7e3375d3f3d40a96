use futures_util::future::BoxFuture;
use moka::future::Cache;
use std::time::Duration;
use tokio::time::timeout;
use tracing::info;

use crate::config::Config;
use crate::error::SyncError;

pub const WORKSPACE_CACHE_PREFIX: &str = "workspace:";

/// Cache key holding the latest snapshot of a workspace.
pub fn workspace_cache_key(workspace_id: &str) -> String {
    format!("{}{}", WORKSPACE_CACHE_PREFIX, workspace_id)
}

/// Key-value store for in-flight workspace snapshots.
///
/// The cache is only authoritative while a workspace is being edited; the
/// database stays the system of record.
pub trait SnapshotCache: Send + Sync {
    fn get(&self, key: String) -> BoxFuture<'_, Result<Option<String>, SyncError>>;

    fn set(&self, key: String, snapshot: String) -> BoxFuture<'_, Result<(), SyncError>>;

    fn remove(&self, key: String) -> BoxFuture<'_, Result<(), SyncError>>;

    /// Approximate number of cached snapshots, for diagnostics.
    fn entry_count(&self) -> u64 {
        0
    }
}

/// In-process snapshot cache backed by moka.
pub struct MokaSnapshotCache {
    cache: Cache<String, String>,
}

impl MokaSnapshotCache {
    pub fn new(max_capacity: u64, time_to_idle: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_idle(time_to_idle)
            .build();
        info!("Snapshot cache initialized (capacity {}, idle {:?})", max_capacity, time_to_idle);
        Self { cache }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.cache_max_capacity, config.cache_time_to_idle())
    }
}

impl SnapshotCache for MokaSnapshotCache {
    fn get(&self, key: String) -> BoxFuture<'_, Result<Option<String>, SyncError>> {
        Box::pin(async move { Ok(self.cache.get(&key).await) })
    }

    fn set(&self, key: String, snapshot: String) -> BoxFuture<'_, Result<(), SyncError>> {
        Box::pin(async move {
            self.cache.insert(key, snapshot).await;
            Ok(())
        })
    }

    fn remove(&self, key: String) -> BoxFuture<'_, Result<(), SyncError>> {
        Box::pin(async move {
            self.cache.invalidate(&key).await;
            Ok(())
        })
    }

    fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

/// Read a snapshot, treating an elapsed deadline as a cache failure.
pub async fn get_with_timeout(
    cache: &dyn SnapshotCache,
    key: String,
    limit: Duration,
) -> Result<Option<String>, SyncError> {
    match timeout(limit, cache.get(key)).await {
        Ok(res) => res,
        Err(_) => Err(SyncError::CacheTimeout(limit)),
    }
}

/// Write a snapshot, treating an elapsed deadline as a cache failure.
pub async fn set_with_timeout(
    cache: &dyn SnapshotCache,
    key: String,
    snapshot: String,
    limit: Duration,
) -> Result<(), SyncError> {
    match timeout(limit, cache.set(key, snapshot)).await {
        Ok(res) => res,
        Err(_) => Err(SyncError::CacheTimeout(limit)),
    }
}

pub async fn remove_with_timeout(
    cache: &dyn SnapshotCache,
    key: String,
    limit: Duration,
) -> Result<(), SyncError> {
    match timeout(limit, cache.remove(key)).await {
        Ok(res) => res,
        Err(_) => Err(SyncError::CacheTimeout(limit)),
    }
}
