use futures_util::future::BoxFuture;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_tungstenite::tungstenite::Utf8Bytes;

use crate::cache::{MokaSnapshotCache, SnapshotCache};
use crate::error::SyncError;
use super::context::{SyncContext, SyncOptions};
use super::persist::SnapshotPersister;
use super::registry::WorkspaceRegistry;

pub fn frame(text: &str) -> Utf8Bytes {
    Utf8Bytes::from(text.to_string())
}

#[derive(Clone, Default)]
pub struct RecordingPersister {
    calls: Arc<Mutex<Vec<(String, String)>>>,
    fail: bool,
}

impl RecordingPersister {
    pub fn failing() -> Self {
        Self { fail: true, ..Self::default() }
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

impl SnapshotPersister for RecordingPersister {
    fn persist(&self, workspace_id: String, snapshot: String) -> BoxFuture<'_, Result<(), SyncError>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push((workspace_id.clone(), snapshot));
            if self.fail {
                return Err(SyncError::BlockNotFound(workspace_id));
            }
            Ok(())
        })
    }
}

/// Persister that never answers.
pub struct StalledPersister;

impl SnapshotPersister for StalledPersister {
    fn persist(&self, _workspace_id: String, _snapshot: String) -> BoxFuture<'_, Result<(), SyncError>> {
        Box::pin(futures_util::future::pending())
    }
}

/// Cache whose operations never complete.
pub struct StalledCache;

impl SnapshotCache for StalledCache {
    fn get(&self, _key: String) -> BoxFuture<'_, Result<Option<String>, SyncError>> {
        Box::pin(futures_util::future::pending())
    }

    fn set(&self, _key: String, _snapshot: String) -> BoxFuture<'_, Result<(), SyncError>> {
        Box::pin(futures_util::future::pending())
    }

    fn remove(&self, _key: String) -> BoxFuture<'_, Result<(), SyncError>> {
        Box::pin(futures_util::future::pending())
    }
}

pub struct FailingCache;

impl SnapshotCache for FailingCache {
    fn get(&self, _key: String) -> BoxFuture<'_, Result<Option<String>, SyncError>> {
        Box::pin(async { Err(SyncError::CacheUnavailable("connection refused".into())) })
    }

    fn set(&self, _key: String, _snapshot: String) -> BoxFuture<'_, Result<(), SyncError>> {
        Box::pin(async { Err(SyncError::CacheUnavailable("connection refused".into())) })
    }

    fn remove(&self, _key: String) -> BoxFuture<'_, Result<(), SyncError>> {
        Box::pin(async { Err(SyncError::CacheUnavailable("connection refused".into())) })
    }
}

pub fn test_options(echo_to_sender: bool) -> SyncOptions {
    SyncOptions {
        echo_to_sender,
        cache_timeout: Duration::from_millis(500),
        persist_timeout: Duration::from_millis(500),
        handshake_timeout: Duration::from_millis(500),
    }
}

pub fn registry_with(persister: RecordingPersister, echo_to_sender: bool) -> WorkspaceRegistry {
    registry_with_cache(
        Arc::new(MokaSnapshotCache::new(1_000, Duration::from_secs(60))),
        persister,
        echo_to_sender,
    )
}

pub fn registry_with_cache(
    cache: Arc<dyn SnapshotCache>,
    persister: RecordingPersister,
    echo_to_sender: bool,
) -> WorkspaceRegistry {
    registry_with_parts(cache, Arc::new(persister), echo_to_sender)
}

pub fn registry_with_parts(
    cache: Arc<dyn SnapshotCache>,
    persister: Arc<dyn SnapshotPersister>,
    echo_to_sender: bool,
) -> WorkspaceRegistry {
    WorkspaceRegistry::new(SyncContext::new(cache, Some(persister), test_options(echo_to_sender)))
}
