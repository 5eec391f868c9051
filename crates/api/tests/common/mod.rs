#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request};
use axum::response::Response;
use axum::Router;
use editlock_api::auth::jwt::{issue_token, JwtConfig};
use editlock_api::config::ServerConfig;
use editlock_api::router::build_app_router;
use editlock_api::state::AppState;
use editlock_core::clock::ManualClock;
use editlock_core::coordinator::LockCoordinator;
use editlock_core::memory::{InMemoryLockStore, InMemoryVersionStore};
use editlock_core::roles::{ROLE_ADMIN, ROLE_EDITOR};
use editlock_core::settings::LockSettings;
use editlock_core::types::UserId;
use http_body_util::BodyExt;
use tower::ServiceExt;

pub const ALICE: UserId = 1;
pub const BOB: UserId = 2;
pub const ADMIN: UserId = 99;

/// Build a test `ServerConfig` with safe defaults and a 120 s lease.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        lock_sweep_interval_secs: 60,
        lock: LockSettings::new(
            std::time::Duration::from_secs(120),
            std::time::Duration::from_secs(60),
        )
        .unwrap(),
        jwt: JwtConfig {
            secret: "test-secret-that-is-long-enough-for-hmac".to_string(),
            token_ttl_mins: 15,
            leeway_secs: 0,
        },
    }
}

/// The router plus handles on the in-memory collaborators it runs on.
pub struct TestApp {
    pub router: Router,
    pub clock: Arc<ManualClock>,
    pub versions: Arc<InMemoryVersionStore>,
    pub config: ServerConfig,
}

impl TestApp {
    pub fn token(&self, user_id: UserId) -> String {
        issue_token(user_id, ROLE_EDITOR, &self.config.jwt).unwrap()
    }

    pub fn admin_token(&self) -> String {
        issue_token(ADMIN, ROLE_ADMIN, &self.config.jwt).unwrap()
    }
}

/// Build the full application router on in-memory stores and a manual clock.
pub fn build_test_app() -> TestApp {
    let config = test_config();
    let clock = Arc::new(ManualClock::starting_now());
    let versions = Arc::new(InMemoryVersionStore::new());
    let coordinator = Arc::new(LockCoordinator::new(
        Arc::new(InMemoryLockStore::new()),
        versions.clone(),
        clock.clone(),
        config.lock,
    ));

    let state = AppState {
        coordinator,
        pool: None,
        config: Arc::new(config.clone()),
    };

    TestApp {
        router: build_app_router(state, &config).unwrap(),
        clock,
        versions,
        config,
    }
}

pub async fn get(app: Router, uri: &str) -> Response {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn get_auth(app: Router, uri: &str, token: &str) -> Response {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .header("Authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_auth(app: Router, uri: &str, token: &str) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("Authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json_auth(
    app: Router,
    uri: &str,
    body: serde_json::Value,
    token: &str,
) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("Content-Type", "application/json")
        .header("Authorization", format!("Bearer {token}"))
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
