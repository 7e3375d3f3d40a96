use crate::{docs::ApiDoc, handlers::{diagnostics, health_check, init_block_socket, ready_check}, routes::auth_middleware::auth_middleware, AppState};
use axum::{routing::{get, post}, Router, middleware};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Create API routes
pub fn create_api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/block/initializeBlockSocket", post(init_block_socket))
        .route("/diagnostics", get(diagnostics))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware)) // Applies to all routes added above
        .with_state(state)
}

/// Create the full HTTP application
pub fn create_app(state: Arc<AppState>) -> Router {
    let development = state.config.is_development();
    let health_routes = Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(ready_check))
        .with_state(state.clone());

    let app = Router::new()
        .nest("/api", create_api_routes(state))
        .merge(health_routes)
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http());

    // Browser clients served from another origin during local development
    if development {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}
