use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, info, warn};

use crate::error::SyncError;
use super::fanout::{ClientHandle, DisconnectOutcome, FanoutServer};

/// How long a closing client gets to receive what was already queued for it.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Run one client's connection until either side goes away.
///
/// `client` must already be registered with `server`. A reader task feeds
/// inbound frames to the server; a writer task drains the client's outbound
/// queue into the socket.
pub async fn serve_connection<S>(server: Arc<FanoutServer>, client: ClientHandle, socket: WebSocketStream<S>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let workspace_id = server.workspace_id().to_string();
    let ClientHandle { id, mut outbound } = client;

    let (mut sender, mut receiver) = socket.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(text) = outbound.recv().await {
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });

    let reader = server.clone();
    let reader_workspace = workspace_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(frame) = receiver.next().await {
            match frame {
                Ok(Message::Text(text)) => match reader.handle_message(id, text).await {
                    Ok(_) | Err(SyncError::MalformedMessage(_)) => {}
                    Err(SyncError::WorkspaceTerminated(_)) => break,
                    Err(e) => error!("Failed to relay message in workspace {}: {}", reader_workspace, e),
                },
                Ok(Message::Binary(_)) => {
                    warn!("Dropping binary frame from {} in workspace {}", id, reader_workspace);
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!("WebSocket error for {} in workspace {}: {}", id, reader_workspace, e);
                    break;
                }
            }
        }
    });

    let mut send_done = false;
    tokio::select! {
        _ = &mut recv_task => {}
        _ = &mut send_task => {
            send_done = true;
            recv_task.abort();
        }
    }

    match server.disconnect(id).await {
        DisconnectOutcome::Remaining(n) => debug!("Workspace {} still has {} clients", workspace_id, n),
        DisconnectOutcome::Drained(_) => info!("Workspace {} drained", workspace_id),
        DisconnectOutcome::Unknown => {}
    }

    // The outbound queue is closed now, so the writer finishes on its own
    if !send_done && timeout(CLOSE_GRACE, &mut send_task).await.is_err() {
        send_task.abort();
    }
    info!("WebSocket connection terminated");
}
