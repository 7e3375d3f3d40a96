//! Tests for the HTTP control surface: health checks, auth and socket initialization

mod common;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use block_sync::{config::Config, routes::create_app, AppState};
use common::*;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const SECRET: &str = "integration-secret";

fn app() -> (Router, Arc<AppState>) {
    let config = Config {
        cloud_auth_jwt_secret: Some(SECRET.to_string()),
        ..Config::default()
    };
    let registry = registry(moka_cache(), RecordingPersister::default());
    let state = Arc::new(AppState::new(config, registry, None));
    (create_app(state.clone()), state)
}

fn token(sub: &str, roles: &[&str]) -> String {
    let claims = json!({ "sub": sub, "roles": roles, "exp": 4_102_444_800u64 });
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

fn init_request(block_id: &str, jwt: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/block/initializeBlockSocket")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(jwt) = jwt {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", jwt));
    }
    builder
        .body(Body::from(json!({ "blockId": block_id }).to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_live_workspaces() {
    let (app, state) = app();
    state.registry.ensure_server("block-1").await.unwrap();

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["live_workspaces"], 1);
}

#[tokio::test]
async fn ready_without_database_is_ok() {
    let (app, _) = app();
    let response = app
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["database"], false);
}

#[tokio::test]
async fn init_socket_requires_a_token() {
    let (app, state) = app();
    let response = app.oneshot(init_request("block-1", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(!state.registry.contains("block-1").await);
}

#[tokio::test]
async fn init_socket_rejects_a_forged_token() {
    let (app, _) = app();
    let forged = encode(
        &Header::default(),
        &json!({ "sub": "42", "exp": 4_102_444_800u64 }),
        &EncodingKey::from_secret(b"someone-else"),
    )
    .unwrap();

    let response = app.oneshot(init_request("block-1", Some(&forged))).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn init_socket_creates_the_server_once() {
    let (app, state) = app();
    let jwt = token("42", &[]);

    let first = app.clone().oneshot(init_request("block-9", Some(&jwt))).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let body = json_body(first).await;
    assert_eq!(body["workspaceId"], "block-9");
    assert_eq!(body["created"], true);
    assert_eq!(body["message"], "WebSocket initialized for block: block-9");
    assert!(state.registry.contains("block-9").await);

    let second = app.oneshot(init_request("block-9", Some(&jwt))).await.unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(json_body(second).await["created"], false);
    assert_eq!(state.registry.stats().await.workspaces, 1);
}

#[tokio::test]
async fn init_socket_rejects_an_empty_block_id() {
    let (app, state) = app();
    let response = app.oneshot(init_request("  ", Some(&token("42", &[])))).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(state.registry.stats().await.workspaces, 0);
}

#[tokio::test]
async fn init_socket_accepts_the_cookie_token() {
    let (app, _) = app();
    let request = Request::builder()
        .method("POST")
        .uri("/api/block/initializeBlockSocket")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::COOKIE, format!("auth_token={}", token("7", &[])))
        .body(Body::from(json!({ "blockId": "block-c" }).to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn diagnostics_is_admin_only() {
    let (app, state) = app();
    state.registry.ensure_server("block-1").await.unwrap();
    state.registry.ensure_server("block-2").await.unwrap();

    let user = Request::builder()
        .uri("/api/diagnostics")
        .header(header::AUTHORIZATION, format!("Bearer {}", token("42", &[])))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(user).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let admin = Request::builder()
        .uri("/api/diagnostics")
        .header(header::AUTHORIZATION, format!("Bearer {}", token("1", &["admin"])))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(admin).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["n_workspaces"], 2);
    assert_eq!(body["n_conn"], 0);
}
