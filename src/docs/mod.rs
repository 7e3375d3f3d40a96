use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use crate::models::*;

/// Bearer JWT scheme referenced by the authenticated endpoints
pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn health_check_doc() {}

/// Readiness check endpoint
#[utoipa::path(
    get,
    path = "/ready",
    responses(
        (status = 200, description = "Service is ready", body = ReadyResponse),
        (status = 503, description = "Database is not reachable", body = ReadyResponse)
    )
)]
#[allow(dead_code)]
pub async fn ready_check_doc() {}

/// Initialize the real-time socket of a block
///
/// Clients then connect to `ws://<host>:<ws_port>/?workspaceId=<blockId>`.
#[utoipa::path(
    post,
    path = "/api/block/initializeBlockSocket",
    request_body = InitBlockSocketRequest,
    responses(
        (status = 200, description = "Socket is live for the block", body = InitBlockSocketResponse),
        (status = 400, description = "Empty block id", body = ErrorResponse),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Block not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
#[allow(dead_code)]
pub async fn init_block_socket_doc() {}

/// Live workspace and host diagnostics
#[utoipa::path(
    get,
    path = "/api/diagnostics",
    responses(
        (status = 200, description = "Diagnostics", body = DiagnosticsResponse),
        (status = 403, description = "Admin access required", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
#[allow(dead_code)]
pub async fn diagnostics_doc() {}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check_doc,
        ready_check_doc,
        init_block_socket_doc,
        diagnostics_doc,
    ),
    components(
        schemas(
            HealthResponse,
            ReadyResponse,
            InitBlockSocketRequest,
            InitBlockSocketResponse,
            DiagnosticsResponse,
            ErrorResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "api", description = "Block synchronization endpoints")
    )
)]
pub struct ApiDoc;
