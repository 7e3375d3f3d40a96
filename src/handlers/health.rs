use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};
use crate::AppState;
use crate::models::{HealthResponse, ReadyResponse};

/// Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    debug!("Health check requested");
    let stats = state.registry.stats().await;
    Json(HealthResponse {
        status: "ok".to_string(),
        message: "Server is running".to_string(),
        timestamp: Utc::now(),
        live_workspaces: stats.workspaces as u32,
    })
}

/// Readiness check endpoint
///
/// Not ready while a configured database does not answer; drained workspaces
/// could not be persisted.
pub async fn ready_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<ReadyResponse>) {
    debug!("Readiness check requested");
    let Some(store) = &state.block_store else {
        return (StatusCode::OK, Json(ReadyResponse {
            status: "ok".to_string(),
            message: "Service is ready (no database configured)".to_string(),
            database: false,
        }));
    };

    match store.ping().await {
        Ok(()) => (StatusCode::OK, Json(ReadyResponse {
            status: "ok".to_string(),
            message: "Service is ready".to_string(),
            database: true,
        })),
        Err(e) => {
            warn!("Readiness check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, Json(ReadyResponse {
                status: "unavailable".to_string(),
                message: "Database is not reachable".to_string(),
                database: false,
            }))
        }
    }
}
