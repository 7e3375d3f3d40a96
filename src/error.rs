use std::time::Duration;
use thiserror::Error;

/// Failures inside the block synchronization core.
///
/// None of these reach an end user directly: the socket layer logs them and
/// keeps serving, the control API maps the few it can see onto HTTP codes.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("workspace id must not be empty")]
    EmptyWorkspaceId,

    #[error("no socket server registered for workspace '{0}'")]
    UnknownWorkspace(String),

    #[error("socket server for workspace '{0}' has terminated")]
    WorkspaceTerminated(String),

    #[error("invalid upgrade request: {0}")]
    InvalidUpgrade(String),

    #[error("malformed message: {0}")]
    MalformedMessage(#[from] serde_json::Error),

    #[error("cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("cache operation timed out after {0:?}")]
    CacheTimeout(Duration),

    #[error("persistence timed out after {0:?}")]
    PersistenceTimeout(Duration),

    #[error("block '{0}' not found")]
    BlockNotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("websocket handshake failed: {0}")]
    Handshake(#[from] tokio_tungstenite::tungstenite::Error),
}
