use axum::http;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation, TokenData};

use crate::auth::auth::{role_prpl, user_prpl};

// Get the auth token from a request
pub fn get_auth_token<B>(req: &http::Request<B>) -> Result<String, String> {
    // 1. Try to get token from Authorization header
    if let Some(auth_header) = req.headers().get(http::header::AUTHORIZATION) {
        let auth_str = auth_header.to_str().map_err(|_| "Invalid Authorization header".to_string())?;
        auth_str
            .strip_prefix("Bearer ")
            .map(|token| token.to_string())
            .ok_or_else(|| "Unprovided or malformed authorization header".to_string())
    }
    // 2. Try to get token from cookies
    else {
        let cookie_header = req.headers().get(http::header::COOKIE)
            .ok_or_else(|| "Authorization header not provided".to_string())?
            .to_str()
            .map_err(|_| "Invalid Cookie header".to_string())?;

        for cookie in cookie::Cookie::split_parse(cookie_header) {
            if let Ok(c) = cookie {
                if c.name() == "auth_token" {
                    return Ok(c.value().to_string());
                }
            }
        }
        Err("auth_token cookie not found".to_string())
    }
}

// Validate a JWT token and return the token data
pub fn validate_jwt(token: &str, secret: &str) -> Result<TokenData<serde_json::Value>, jsonwebtoken::errors::Error> {
    let validation = Validation::new(Algorithm::HS256);
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    decode::<serde_json::Value>(token, &decoding_key, &validation)
}

// Get the user id and principals carried by validated claims
pub fn get_user_prpls(claims: &serde_json::Value) -> Result<(String, Vec<String>), String> {
    let uid = claims
        .get("sub")
        .or_else(|| claims.get("userId"))
        .and_then(|v| v.as_str())
        .ok_or_else(|| "Can't extract a UID from the JWT token".to_string())?;

    let mut prpls = vec![user_prpl(uid)];
    if let Some(roles) = claims.get("roles").and_then(|v| v.as_array()) {
        for role in roles.iter().filter_map(|r| r.as_str()) {
            let prpl = role_prpl(role);
            if !prpls.contains(&prpl) {
                prpls.push(prpl);
            }
        }
    }

    Ok((uid.to_string(), prpls))
}
