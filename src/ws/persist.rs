use futures_util::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::cache::{get_with_timeout, remove_with_timeout, set_with_timeout, workspace_cache_key, SnapshotCache};
use crate::error::SyncError;
use super::context::SyncContext;

/// Durable storage for a drained workspace.
///
/// Called at most once per drain-to-empty transition with the snapshot that
/// was cached when the last client left.
pub trait SnapshotPersister: Send + Sync {
    fn persist(&self, workspace_id: String, snapshot: String) -> BoxFuture<'_, Result<(), SyncError>>;
}

/// Outcome of the cache writer of one fan-out server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotStatus {
    /// Nothing was sent while the server was alive.
    Empty,
    /// The newest snapshot reached the cache.
    Written,
    /// The newest snapshot could not be cached; whatever the cache holds is stale.
    Failed,
}

/// What happened to a workspace's snapshot when it drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainReport {
    Persisted,
    NoSnapshot,
    NoPersister,
    Failed,
}

/// Start the ordered cache writer of a workspace.
///
/// Snapshots are written in the order they were queued. When several are
/// waiting only the newest one is written.
pub(crate) fn spawn_snapshot_writer(
    workspace_id: String,
    cache: Arc<dyn SnapshotCache>,
    limit: Duration,
) -> (mpsc::UnboundedSender<String>, JoinHandle<SnapshotStatus>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(write_snapshots(workspace_id, cache, limit, rx));
    (tx, handle)
}

async fn write_snapshots(
    workspace_id: String,
    cache: Arc<dyn SnapshotCache>,
    limit: Duration,
    mut rx: mpsc::UnboundedReceiver<String>,
) -> SnapshotStatus {
    let key = workspace_cache_key(&workspace_id);
    let mut status = SnapshotStatus::Empty;

    while let Some(mut snapshot) = rx.recv().await {
        while let Ok(newer) = rx.try_recv() {
            snapshot = newer;
        }

        match set_with_timeout(cache.as_ref(), key.clone(), snapshot, limit).await {
            Ok(()) => status = SnapshotStatus::Written,
            Err(e) => {
                warn!("Failed to cache snapshot for workspace {}: {}", workspace_id, e);
                status = SnapshotStatus::Failed;
                if let Err(e) = remove_with_timeout(cache.as_ref(), key.clone(), limit).await {
                    debug!("Could not drop stale snapshot for workspace {}: {}", workspace_id, e);
                }
            }
        }
    }

    status
}

/// Flush a drained workspace to durable storage.
///
/// Waits for pending cache writes, reads the snapshot back and hands it to the
/// persister. Every step is bounded; failures are logged and reported, never
/// retried.
pub(crate) async fn flush_on_drain(
    workspace_id: String,
    ctx: SyncContext,
    writer: Option<JoinHandle<SnapshotStatus>>,
) -> DrainReport {
    let cache_limit = ctx.options.cache_timeout;

    let status = match writer {
        // One write may be in flight and one more queued behind it
        Some(mut handle) => match timeout(cache_limit * 2, &mut handle).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                error!("Snapshot writer for workspace {} failed: {}", workspace_id, e);
                SnapshotStatus::Failed
            }
            Err(_) => {
                handle.abort();
                warn!("Snapshot writer for workspace {} did not finish in time", workspace_id);
                SnapshotStatus::Failed
            }
        },
        None => SnapshotStatus::Empty,
    };

    // Empty still flushes a snapshot left in the cache by an earlier session
    if status == SnapshotStatus::Failed {
        warn!("Snapshot for workspace {} is unavailable, skipping persistence", workspace_id);
        return DrainReport::NoSnapshot;
    }

    let persister = match &ctx.persister {
        Some(persister) => persister.clone(),
        None => {
            warn!("No persistence configured - snapshot for workspace {} stays in the cache only", workspace_id);
            return DrainReport::NoPersister;
        }
    };

    let key = workspace_cache_key(&workspace_id);
    let snapshot = match get_with_timeout(ctx.cache.as_ref(), key, cache_limit).await {
        Ok(Some(snapshot)) => snapshot,
        Ok(None) => {
            match status {
                SnapshotStatus::Empty => info!("Workspace {} drained without changes, nothing to persist", workspace_id),
                _ => warn!("Snapshot for workspace {} is no longer cached", workspace_id),
            }
            return DrainReport::NoSnapshot;
        }
        Err(e) => {
            warn!("Failed to read snapshot for workspace {}: {}", workspace_id, e);
            return DrainReport::NoSnapshot;
        }
    };

    let persist_limit = ctx.options.persist_timeout;
    let size = snapshot.len();
    match timeout(persist_limit, persister.persist(workspace_id.clone(), snapshot)).await {
        Ok(Ok(())) => {
            info!("Persisted snapshot for workspace {} ({} bytes)", workspace_id, size);
            DrainReport::Persisted
        }
        Ok(Err(e)) => {
            error!("Failed to persist snapshot for workspace {}: {}", workspace_id, e);
            DrainReport::Failed
        }
        Err(_) => {
            error!("Failed to persist snapshot for workspace {}: {}", workspace_id, SyncError::PersistenceTimeout(persist_limit));
            DrainReport::Failed
        }
    }
}
