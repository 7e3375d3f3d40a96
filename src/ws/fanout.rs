use serde::de::IgnoredAny;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Weak;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Utf8Bytes;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::SyncError;
use super::context::SyncContext;
use super::persist::{flush_on_drain, spawn_snapshot_writer, DrainReport, SnapshotStatus};
use super::registry::{evict, ServerMap};

/// Frames a client may have queued before it is considered too slow to keep.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

pub type ConnectionId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Created,
    Active,
    Draining,
    Terminated,
}

impl Lifecycle {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Lifecycle::Created,
            1 => Lifecycle::Active,
            2 => Lifecycle::Draining,
            _ => Lifecycle::Terminated,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Lifecycle::Created => 0,
            Lifecycle::Active => 1,
            Lifecycle::Draining => 2,
            Lifecycle::Terminated => 3,
        }
    }
}

enum ConnState {
    Open(mpsc::Sender<Utf8Bytes>),
    Closed,
}

impl ConnState {
    fn is_open(&self) -> bool {
        matches!(self, ConnState::Open(tx) if !tx.is_closed())
    }
}

struct ServerState {
    connections: HashMap<ConnectionId, ConnState>,
    snapshots: Option<mpsc::UnboundedSender<String>>,
    writer: Option<JoinHandle<SnapshotStatus>>,
}

/// A client's side of a fan-out server: its id and the frames relayed to it.
pub struct ClientHandle {
    pub id: ConnectionId,
    pub outbound: mpsc::Receiver<Utf8Bytes>,
}

#[derive(Debug)]
pub enum DisconnectOutcome {
    /// Other clients are still connected.
    Remaining(usize),
    /// The last client left; the server is gone and its snapshot is being flushed.
    Drained(JoinHandle<DrainReport>),
    /// The connection was not registered (already removed or server closed).
    Unknown,
}

/// Relays messages between the clients of one workspace.
pub struct FanoutServer {
    workspace_id: String,
    lifecycle: AtomicU8,
    state: Mutex<ServerState>,
    ctx: SyncContext,
    registry: Weak<ServerMap>,
}

impl FanoutServer {
    pub(crate) fn new(workspace_id: String, ctx: SyncContext, registry: Weak<ServerMap>) -> Self {
        Self {
            workspace_id,
            lifecycle: AtomicU8::new(Lifecycle::Created.as_u8()),
            state: Mutex::new(ServerState {
                connections: HashMap::new(),
                snapshots: None,
                writer: None,
            }),
            ctx,
            registry,
        }
    }

    pub fn workspace_id(&self) -> &str {
        &self.workspace_id
    }

    pub fn lifecycle(&self) -> Lifecycle {
        Lifecycle::from_u8(self.lifecycle.load(Ordering::Acquire))
    }

    pub fn is_terminated(&self) -> bool {
        self.lifecycle() == Lifecycle::Terminated
    }

    fn set_lifecycle(&self, lifecycle: Lifecycle) {
        self.lifecycle.store(lifecycle.as_u8(), Ordering::Release);
    }

    /// Number of open connections.
    pub async fn connection_count(&self) -> usize {
        let state = self.state.lock().await;
        state.connections.values().filter(|c| c.is_open()).count()
    }

    /// Register a new client. It only receives messages sent from now on.
    pub async fn connect(&self) -> Result<ClientHandle, SyncError> {
        let mut state = self.state.lock().await;
        if self.is_terminated() {
            return Err(SyncError::WorkspaceTerminated(self.workspace_id.clone()));
        }

        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        state.connections.insert(id, ConnState::Open(tx));
        self.set_lifecycle(Lifecycle::Active);

        info!("Client {} connected to workspace: {} ({} connections)", id, self.workspace_id, state.connections.len());
        Ok(ClientHandle { id, outbound: rx })
    }

    /// Relay a text frame from `from` to the other open clients and queue it
    /// as the workspace snapshot. Returns how many clients it was queued for.
    ///
    /// Payloads that are not valid JSON are rejected without side effects.
    pub async fn handle_message(&self, from: ConnectionId, text: Utf8Bytes) -> Result<usize, SyncError> {
        if let Err(e) = serde_json::from_str::<IgnoredAny>(text.as_str()) {
            warn!("Dropping malformed message from {} in workspace {}: {}", from, self.workspace_id, e);
            return Err(SyncError::MalformedMessage(e));
        }

        let mut state = self.state.lock().await;
        if self.is_terminated() {
            return Err(SyncError::WorkspaceTerminated(self.workspace_id.clone()));
        }

        let echo = self.ctx.options.echo_to_sender;
        let mut delivered = 0;
        for (id, conn) in state.connections.iter_mut() {
            if *id == from && !echo {
                continue;
            }
            let sent = match conn {
                ConnState::Open(tx) => tx.try_send(text.clone()),
                ConnState::Closed => continue,
            };
            match sent {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    // Dropping the sender ends the client's writer, which closes its socket
                    warn!("Client {} in workspace {} is not keeping up, closing it", id, self.workspace_id);
                    *conn = ConnState::Closed;
                }
                Err(TrySendError::Closed(_)) => *conn = ConnState::Closed,
            }
        }

        if state.snapshots.is_none() {
            let (tx, writer) = spawn_snapshot_writer(
                self.workspace_id.clone(),
                self.ctx.cache.clone(),
                self.ctx.options.cache_timeout,
            );
            state.snapshots = Some(tx);
            state.writer = Some(writer);
        }
        if let Some(snapshots) = &state.snapshots {
            if snapshots.send(text.as_str().to_owned()).is_err() {
                warn!("Snapshot writer for workspace {} has stopped", self.workspace_id);
            }
        }

        debug!("Relayed message from {} in workspace {} to {} clients", from, self.workspace_id, delivered);
        Ok(delivered)
    }

    /// Unregister a client. When no open client remains the server terminates,
    /// leaves the registry and flushes its snapshot in the background.
    pub async fn disconnect(&self, id: ConnectionId) -> DisconnectOutcome {
        let mut state = self.state.lock().await;
        if state.connections.remove(&id).is_none() {
            return DisconnectOutcome::Unknown;
        }
        info!("Client {} disconnected from workspace: {}", id, self.workspace_id);

        self.set_lifecycle(Lifecycle::Draining);
        let remaining = state.connections.values().filter(|c| c.is_open()).count();
        if remaining > 0 {
            self.set_lifecycle(Lifecycle::Active);
            return DisconnectOutcome::Remaining(remaining);
        }

        info!("Workspace {} is no longer active.", self.workspace_id);
        self.set_lifecycle(Lifecycle::Terminated);
        state.connections.clear();
        // Closing the queue lets the writer finish what is pending
        state.snapshots = None;
        let writer = state.writer.take();
        evict(&self.registry, &self.workspace_id, self).await;
        drop(state);

        let flush = tokio::spawn(flush_on_drain(self.workspace_id.clone(), self.ctx.clone(), writer));
        DisconnectOutcome::Drained(flush)
    }

    /// Terminate without flushing; used at service shutdown.
    pub(crate) async fn close(&self) {
        let mut state = self.state.lock().await;
        self.set_lifecycle(Lifecycle::Terminated);
        state.connections.clear();
        state.snapshots = None;
        state.writer = None;
    }
}
