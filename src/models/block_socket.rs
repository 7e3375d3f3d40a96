use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Request body for initializing the socket of a block
#[derive(Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InitBlockSocketRequest {
    pub block_id: String,
}

/// Response for initializing the socket of a block
#[derive(Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InitBlockSocketResponse {
    pub message: String,
    pub workspace_id: String,
    pub created: bool,
}
