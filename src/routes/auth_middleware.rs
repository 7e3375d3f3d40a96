use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::{error, info};
use crate::AppState;
use crate::services::auth_service::{get_auth_token, get_user_prpls, validate_jwt};

pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {

    // 1. Get the auth token from the request
    let token = match get_auth_token(&req) {
        Ok(token) => token,
        Err(e) => {
            info!("Rejecting request: {}", e);
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    // 2. Validate Token
    let secret = match &state.config.cloud_auth_jwt_secret {
        Some(secret) => secret,
        None => {
            error!("Cloud auth JWT secret not configured");
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };
    let token_data = match validate_jwt(&token, secret) {
        Ok(token_data) => token_data,
        Err(e) => {
            error!("JWT validation failed: {}", e);
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    // 3. Extract the UID and principals
    let (user_uid, prpls) = match get_user_prpls(&token_data.claims) {
        Ok(res) => res,
        Err(e) => {
            error!("{}", e);
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    // 4. Set these principals into request extensions for downstream handlers
    {
        let extensions = req.extensions_mut();
        extensions.insert(prpls);
        extensions.insert(user_uid);
    }

    Ok(next.run(req).await)
}
