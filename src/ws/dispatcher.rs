use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::accept_async;
use tracing::{debug, error, info, warn};

use crate::error::SyncError;
use super::connection::serve_connection;
use super::fanout::{ClientHandle, FanoutServer};
use super::registry::WorkspaceRegistry;
use super::rewind::Rewind;

/// Query parameter naming the workspace on the upgrade URL.
pub const WORKSPACE_QUERY_PARAM: &str = "workspaceId";

const MAX_REQUEST_HEAD_BYTES: usize = 8 * 1024;
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Routes WebSocket upgrade requests to the fan-out server of their workspace.
///
/// The dispatcher never creates servers. Requests for a workspace without a
/// registered server are dropped before anything is written back.
#[derive(Clone)]
pub struct UpgradeDispatcher {
    registry: WorkspaceRegistry,
    handshake_timeout: Duration,
}

impl UpgradeDispatcher {
    pub fn new(registry: WorkspaceRegistry) -> Self {
        let handshake_timeout = registry.context().options.handshake_timeout;
        Self { registry, handshake_timeout }
    }

    /// Accept connections forever, one task per socket.
    pub async fn serve(self, listener: TcpListener) {
        if let Ok(addr) = listener.local_addr() {
            info!("📡 WebSocket dispatcher listening on ws://{}", addr);
        }

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let dispatcher = self.clone();
                    tokio::spawn(async move {
                        match dispatcher.dispatch(stream).await {
                            Ok(()) => {}
                            Err(e @ SyncError::Handshake(_)) => debug!("Upgrade from {} failed: {}", peer, e),
                            Err(e) => warn!("Rejected upgrade from {}: {}", peer, e),
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept WebSocket connection: {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }

    /// Inspect one inbound upgrade and either serve it or drop it.
    ///
    /// Returns once the connection ends. Errors before the handshake drop the
    /// stream without a response.
    pub async fn dispatch<S>(&self, mut stream: S) -> Result<(), SyncError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let head = match timeout(self.handshake_timeout, read_request_head(&mut stream)).await {
            Ok(head) => head?,
            Err(_) => return Err(SyncError::InvalidUpgrade("timed out reading request".into())),
        };

        let workspace_id = workspace_id_from_head(&head).ok_or(SyncError::EmptyWorkspaceId)?;

        let server = self
            .registry
            .lookup(&workspace_id)
            .await
            .ok_or_else(|| SyncError::UnknownWorkspace(workspace_id.clone()))?;

        let mut socket = match timeout(self.handshake_timeout, accept_async(Rewind::new(head, stream))).await {
            Ok(socket) => socket?,
            Err(_) => return Err(SyncError::InvalidUpgrade("handshake timed out".into())),
        };

        let (server, client) = match self.attach(server, &workspace_id).await {
            Ok(attached) => attached,
            Err(e) => {
                let _ = socket.close(None).await;
                return Err(e);
            }
        };

        serve_connection(server, client, socket).await;
        Ok(())
    }

    /// Register a client with the server found before the handshake.
    ///
    /// That server may have drained in the meantime; if the workspace was
    /// initialized again, the client joins the replacement instead.
    async fn attach(
        &self,
        server: Arc<FanoutServer>,
        workspace_id: &str,
    ) -> Result<(Arc<FanoutServer>, ClientHandle), SyncError> {
        match server.connect().await {
            Ok(client) => Ok((server, client)),
            Err(SyncError::WorkspaceTerminated(_)) => {
                let replacement = self
                    .registry
                    .lookup(workspace_id)
                    .await
                    .ok_or_else(|| SyncError::WorkspaceTerminated(workspace_id.to_string()))?;
                debug!("Workspace {} was recreated during the handshake", workspace_id);
                let client = replacement.connect().await?;
                Ok((replacement, client))
            }
            Err(e) => Err(e),
        }
    }
}

/// Read until the end of the HTTP request head. Bytes past the head, if any,
/// are kept so they can be replayed.
async fn read_request_head<S>(stream: &mut S) -> Result<Vec<u8>, SyncError>
where
    S: AsyncRead + Unpin,
{
    let mut head = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    loop {
        let n = stream
            .read(&mut chunk)
            .await
            .map_err(|e| SyncError::InvalidUpgrade(e.to_string()))?;
        if n == 0 {
            return Err(SyncError::InvalidUpgrade("connection closed before request head".into()));
        }

        // Resume the terminator search a few bytes back in case it straddles chunks
        let search_from = head.len().saturating_sub(3);
        head.extend_from_slice(&chunk[..n]);
        if head[search_from..].windows(4).any(|w| w == b"\r\n\r\n") {
            return Ok(head);
        }
        if head.len() > MAX_REQUEST_HEAD_BYTES {
            return Err(SyncError::InvalidUpgrade("request head too large".into()));
        }
    }
}

/// Extract a non-empty `workspaceId` from the request line's query string.
pub fn workspace_id_from_head(head: &[u8]) -> Option<String> {
    let line_end = head.windows(2).position(|w| w == b"\r\n")?;
    let request_line = std::str::from_utf8(&head[..line_end]).ok()?;

    let mut parts = request_line.split_whitespace();
    let _method = parts.next()?;
    let target = parts.next()?;
    let (_, query) = target.split_once('?')?;

    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == WORKSPACE_QUERY_PARAM)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::fanout::DisconnectOutcome;
    use crate::ws::test_support::{registry_with, RecordingPersister};
    use futures_util::{SinkExt, StreamExt};
    use tokio::io::AsyncWriteExt;
    use tokio_tungstenite::{client_async, tungstenite::Message};

    #[test]
    fn parses_workspace_id_from_query() {
        let head = b"GET /sync?token=x&workspaceId=block%201 HTTP/1.1\r\nHost: h\r\n\r\n";
        assert_eq!(workspace_id_from_head(head).as_deref(), Some("block 1"));
    }

    #[test]
    fn missing_or_empty_workspace_id_is_none() {
        assert_eq!(workspace_id_from_head(b"GET / HTTP/1.1\r\n\r\n"), None);
        assert_eq!(workspace_id_from_head(b"GET /?workspaceId= HTTP/1.1\r\n\r\n"), None);
        assert_eq!(workspace_id_from_head(b"GET /?other=1 HTTP/1.1\r\n\r\n"), None);
        assert_eq!(workspace_id_from_head(b"garbage"), None);
    }

    #[tokio::test]
    async fn unknown_workspace_is_dropped_without_a_response() {
        let registry = registry_with(RecordingPersister::default(), false);
        let dispatcher = UpgradeDispatcher::new(registry);
        let (mut client, server_side) = tokio::io::duplex(4096);

        client
            .write_all(b"GET /?workspaceId=missing HTTP/1.1\r\nHost: localhost\r\nUpgrade: websocket\r\n\r\n")
            .await
            .unwrap();

        let res = dispatcher.dispatch(server_side).await;
        assert!(matches!(res, Err(SyncError::UnknownWorkspace(id)) if id == "missing"));

        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        assert!(response.is_empty());
    }

    #[tokio::test]
    async fn request_without_workspace_is_dropped() {
        let registry = registry_with(RecordingPersister::default(), false);
        registry.ensure_server("block-1").await.unwrap();
        let dispatcher = UpgradeDispatcher::new(registry);
        let (mut client, server_side) = tokio::io::duplex(4096);

        client.write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n").await.unwrap();

        assert!(matches!(dispatcher.dispatch(server_side).await, Err(SyncError::EmptyWorkspaceId)));
        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        assert!(response.is_empty());
    }

    #[tokio::test]
    async fn silent_client_times_out() {
        let registry = registry_with(RecordingPersister::default(), false);
        let dispatcher = UpgradeDispatcher::new(registry);
        let (_client, server_side) = tokio::io::duplex(4096);

        assert!(matches!(dispatcher.dispatch(server_side).await, Err(SyncError::InvalidUpgrade(_))));
    }

    #[tokio::test]
    async fn client_joins_the_replacement_of_a_terminated_server() {
        let registry = registry_with(RecordingPersister::default(), false);
        let stale = registry.ensure_server("block-1").await.unwrap().server;
        stale.close().await;
        let fresh = registry.ensure_server("block-1").await.unwrap();
        assert!(fresh.created);

        let dispatcher = UpgradeDispatcher::new(registry);
        let (server, client) = dispatcher.attach(stale, "block-1").await.unwrap();

        assert!(Arc::ptr_eq(&server, &fresh.server));
        assert_eq!(fresh.server.connection_count().await, 1);
        assert!(matches!(fresh.server.disconnect(client.id).await, DisconnectOutcome::Drained(_)));
    }

    #[tokio::test]
    async fn client_is_refused_when_the_workspace_is_gone() {
        let registry = registry_with(RecordingPersister::default(), false);
        let server = registry.ensure_server("block-1").await.unwrap().server;
        let only = server.connect().await.unwrap();
        assert!(matches!(server.disconnect(only.id).await, DisconnectOutcome::Drained(_)));

        let dispatcher = UpgradeDispatcher::new(registry);
        let res = dispatcher.attach(server, "block-1").await;
        assert!(matches!(res, Err(SyncError::WorkspaceTerminated(id)) if id == "block-1"));
    }

    #[tokio::test]
    async fn known_workspace_completes_the_handshake() {
        let registry = registry_with(RecordingPersister::default(), false);
        let server = registry.ensure_server("block-1").await.unwrap().server;
        let dispatcher = UpgradeDispatcher::new(registry.clone());
        let (client, server_side) = tokio::io::duplex(64 * 1024);

        let serving = tokio::spawn(async move { dispatcher.dispatch(server_side).await });

        let (mut ws, _) = client_async("ws://localhost/sync?workspaceId=block-1", client).await.unwrap();
        // Give the server a moment to register the connection
        for _ in 0..50 {
            if server.connection_count().await == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(server.connection_count().await, 1);

        ws.send(Message::Close(None)).await.unwrap();
        while let Some(Ok(_)) = ws.next().await {}

        assert!(serving.await.unwrap().is_ok());
        assert!(registry.lookup("block-1").await.is_none());
    }
}
