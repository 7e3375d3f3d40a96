use axum::{http::StatusCode, Json};
use crate::models::ErrorResponse;

const ADMIN_PRPL: &str = "r/admin";
const USER_PRPL_PREFIX: &str = "u/";

/// Principal naming a user.
pub fn user_prpl(uid: &str) -> String {
    format!("{}{}", USER_PRPL_PREFIX, uid)
}

/// Principal naming a role.
pub fn role_prpl(role: &str) -> String {
    format!("r/{}", role)
}

pub fn is_admin(prpls: &[String]) -> bool {
    prpls.iter().any(|p| p == ADMIN_PRPL)
}

pub fn ensure_user(prpls: &[String]) -> Result<String, (StatusCode, Json<ErrorResponse>)> {
    if let Some(p) = prpls.iter().find(|p| p.starts_with(USER_PRPL_PREFIX)) {
        return Ok(p.to_string());
    }

    Err(ErrorResponse::reply(StatusCode::UNAUTHORIZED, "User not authorized"))
}

pub fn ensure_admin(prpls: &[String]) -> Result<String, (StatusCode, Json<ErrorResponse>)> {
    if is_admin(prpls) {
        return Ok(ADMIN_PRPL.to_string());
    }

    Err(ErrorResponse::reply(StatusCode::FORBIDDEN, "Admin access required"))
}
