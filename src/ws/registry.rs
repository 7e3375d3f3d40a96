use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::RwLock;
use tracing::info;

use crate::error::SyncError;
use super::context::SyncContext;
use super::fanout::FanoutServer;

pub(crate) type ServerMap = RwLock<HashMap<String, Arc<FanoutServer>>>;

/// Table of live fan-out servers, keyed by workspace id.
///
/// Owned by the application state and handed to the control API and the
/// upgrade dispatcher. Entries are created explicitly with `ensure_server`
/// and only ever removed by the server itself once its last client leaves.
///
/// Locking: a server may take the registry lock while holding its own state
/// lock, never the other way round.
#[derive(Clone)]
pub struct WorkspaceRegistry {
    servers: Arc<ServerMap>,
    ctx: SyncContext,
}

/// Result of `ensure_server`.
pub struct EnsuredServer {
    pub server: Arc<FanoutServer>,
    pub created: bool,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    pub workspaces: usize,
    pub connections: usize,
}

impl WorkspaceRegistry {
    pub fn new(ctx: SyncContext) -> Self {
        Self {
            servers: Arc::new(RwLock::new(HashMap::new())),
            ctx,
        }
    }

    pub fn context(&self) -> &SyncContext {
        &self.ctx
    }

    /// Return the live server for a workspace, creating it if needed.
    pub async fn ensure_server(&self, workspace_id: &str) -> Result<EnsuredServer, SyncError> {
        if workspace_id.is_empty() {
            return Err(SyncError::EmptyWorkspaceId);
        }

        let mut servers = self.servers.write().await;
        if let Some(existing) = servers.get(workspace_id) {
            // A terminated instance can linger until its eviction completes
            if !existing.is_terminated() {
                info!("WebSocket already initialized for workspace: {}", workspace_id);
                return Ok(EnsuredServer { server: existing.clone(), created: false });
            }
        }

        let server = Arc::new(FanoutServer::new(
            workspace_id.to_string(),
            self.ctx.clone(),
            Arc::downgrade(&self.servers),
        ));
        servers.insert(workspace_id.to_string(), server.clone());
        info!("WebSocket server initialized for workspace: {}", workspace_id);

        Ok(EnsuredServer { server, created: true })
    }

    /// Find the live server for a workspace.
    pub async fn lookup(&self, workspace_id: &str) -> Option<Arc<FanoutServer>> {
        let servers = self.servers.read().await;
        servers
            .get(workspace_id)
            .filter(|server| !server.is_terminated())
            .cloned()
    }

    pub async fn contains(&self, workspace_id: &str) -> bool {
        self.lookup(workspace_id).await.is_some()
    }

    pub async fn stats(&self) -> RegistryStats {
        // Release the registry before touching any server lock
        let servers: Vec<Arc<FanoutServer>> = self.servers.read().await.values().cloned().collect();

        let mut stats = RegistryStats { workspaces: servers.len(), connections: 0 };
        for server in servers {
            stats.connections += server.connection_count().await;
        }
        stats
    }

    /// Drop every server without flushing. Returns how many were live.
    pub async fn shutdown(&self) -> usize {
        let servers: Vec<Arc<FanoutServer>> = {
            let mut map = self.servers.write().await;
            map.drain().map(|(_, server)| server).collect()
        };

        let count = servers.len();
        for server in servers {
            server.close().await;
        }
        info!("Workspace registry shut down ({} live workspaces dropped)", count);
        count
    }
}

/// Remove `server` from the registry if it is still the registered instance.
pub(crate) async fn evict(servers: &Weak<ServerMap>, workspace_id: &str, server: &FanoutServer) -> bool {
    let Some(servers) = servers.upgrade() else {
        return false;
    };

    let mut servers = servers.write().await;
    match servers.get(workspace_id) {
        Some(entry) if std::ptr::eq(Arc::as_ptr(entry), server) => {
            servers.remove(workspace_id);
            true
        }
        _ => false,
    }
}
