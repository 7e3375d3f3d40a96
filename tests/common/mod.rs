//! Shared fixtures for the integration tests
//!
//! The doubles mirror `src/ws/test_support.rs`, which is only compiled for unit tests.

#![allow(dead_code)]

use block_sync::{
    cache::{MokaSnapshotCache, SnapshotCache},
    error::SyncError,
    ws::{SnapshotPersister, SyncContext, SyncOptions, UpgradeDispatcher, WorkspaceRegistry},
};
use futures_util::future::BoxFuture;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

pub const STEP: Duration = Duration::from_secs(2);

/// Persister that records every call in memory
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

/// Cache that refuses every operation
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

pub fn test_options() -> SyncOptions {
    SyncOptions {
        echo_to_sender: false,
        cache_timeout: Duration::from_millis(500),
        persist_timeout: Duration::from_millis(500),
        handshake_timeout: Duration::from_millis(500),
    }
}

pub fn moka_cache() -> Arc<MokaSnapshotCache> {
    Arc::new(MokaSnapshotCache::new(1_000, Duration::from_secs(60)))
}

pub fn registry(cache: Arc<dyn SnapshotCache>, persister: RecordingPersister) -> WorkspaceRegistry {
    WorkspaceRegistry::new(SyncContext::new(cache, Some(Arc::new(persister)), test_options()))
}

/// Start a dispatcher on an ephemeral port and return its address
pub async fn start_dispatcher(registry: WorkspaceRegistry) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(UpgradeDispatcher::new(registry).serve(listener));
    addr
}

pub fn ws_url(addr: SocketAddr, workspace_id: &str) -> String {
    format!("ws://{}/?workspaceId={}", addr, workspace_id)
}

/// Poll `check` until it holds or `STEP` elapses
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + STEP;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
