use crate::{auth::auth, error::SyncError, models::{ErrorResponse, InitBlockSocketRequest, InitBlockSocketResponse}, AppState};
use axum::{extract::{Extension, State}, http::StatusCode, Json};
use std::sync::Arc;
use tracing::{error, info};

/// Initialize the real-time socket of a block
///
/// The block id becomes the workspace id clients pass on the upgrade URL.
pub async fn init_block_socket(
    State(state): State<Arc<AppState>>,
    Extension(prpls): Extension<Vec<String>>,
    Json(payload): Json<InitBlockSocketRequest>,
) -> Result<(StatusCode, Json<InitBlockSocketResponse>), (StatusCode, Json<ErrorResponse>)> {

    let user = auth::ensure_user(&prpls)?;
    let block_id = payload.block_id.trim().to_string();

    // Only open sockets for blocks that exist, when we can check
    if let Some(store) = &state.block_store {
        match store.find_block(&block_id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                return Err(ErrorResponse::reply(StatusCode::NOT_FOUND, format!("Block '{}' not found", block_id)));
            }
            Err(e) => {
                error!("Error loading block '{}' from database: {}", block_id, e);
                return Err(ErrorResponse::reply(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Error initializing WebSocket for block",
                ));
            }
        }
    }

    let ensured = match state.registry.ensure_server(&block_id).await {
        Ok(ensured) => ensured,
        Err(SyncError::EmptyWorkspaceId) => {
            return Err(ErrorResponse::reply(StatusCode::BAD_REQUEST, "blockId must not be empty"));
        }
        Err(e) => {
            error!("Failed to initialize WebSocket for block '{}': {}", block_id, e);
            return Err(ErrorResponse::reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error initializing WebSocket for block",
            ));
        }
    };

    info!("Socket for block {} requested by {} (created: {})", block_id, user, ensured.created);

    Ok((
        StatusCode::OK,
        Json(InitBlockSocketResponse {
            message: format!("WebSocket initialized for block: {}", block_id),
            workspace_id: ensured.server.workspace_id().to_string(),
            created: ensured.created,
        }),
    ))
}
