//! Common test utilities for API integration tests
//!
//! - In-memory store behind the full router
//! - Account signup/signin helpers
//! - Request and JSON body helpers

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use pmsgo_api::app::{build_router, AppState};
use pmsgo_api::config::Config;
use pmsgo_api::middleware::rate_limit::RateLimiter;
use pmsgo_shared::realtime::RealtimeGateway;
use pmsgo_shared::store::MemoryStore;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

pub const JWT_SECRET: &str = "integration-test-secret-at-least-32-bytes";
pub const PASSWORD: &str = "secret1";

/// Router plus direct handles on what it runs against
pub struct TestContext {
    pub app: axum::Router,
    pub store: Arc<MemoryStore>,
    pub realtime: RealtimeGateway,
    pub rate_limiter: Arc<RateLimiter>,
    pub config: Config,
    pub state: AppState,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_vars(Vec::new())
    }

    /// Context with extra environment overrides
    pub fn with_vars(extra: Vec<(&str, &str)>) -> Self {
        let mut vars = vec![
            ("DATABASE_URL", "postgresql://unused/pmsgo"),
            ("JWT_SECRET", JWT_SECRET),
        ];
        vars.extend(extra);

        let config = Config::from_vars(vars).unwrap();
        let store = Arc::new(MemoryStore::new());
        let state = AppState::new(store.clone(), config.clone());
        let realtime = state.realtime.clone();
        let rate_limiter = state.rate_limiter.clone();

        TestContext {
            app: build_router(state.clone()),
            store,
            realtime,
            rate_limiter,
            config,
            state,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.app.clone().oneshot(request).await.unwrap()
    }

    /// Sends a JSON request and returns status and parsed body
    ///
    /// Empty bodies parse as `Value::Null`.
    pub async fn json(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }

        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.send(request).await;
        let status = response.status();
        (status, body_json(response).await)
    }

    /// Signs up a company account, returning its profile
    pub async fn signup(&self, name: &str, email: &str) -> Value {
        let (status, body) = self
            .json(
                "POST",
                "/api/v1/auth/signup",
                None,
                Some(json!({
                    "name": name,
                    "email": email,
                    "workspace_name": format!("{} HQ", name),
                    "password": PASSWORD,
                })),
            )
            .await;

        assert_eq!(status, StatusCode::CREATED, "signup failed: {}", body);
        body["data"].clone()
    }

    /// Signs in and returns the bearer token
    pub async fn signin(&self, email: &str) -> String {
        let (status, body) = self
            .json(
                "POST",
                "/api/v1/auth/signin",
                None,
                Some(json!({ "email": email, "password": PASSWORD, "type": "company" })),
            )
            .await;

        assert_eq!(status, StatusCode::OK, "signin failed: {}", body);
        body["token"].as_str().unwrap().to_string()
    }

    /// Fresh account with a token
    pub async fn account(&self) -> (String, String) {
        let email = unique_email();
        self.signup("Acme", &email).await;
        let token = self.signin(&email).await;
        (email, token)
    }
}

pub fn unique_email() -> String {
    format!("test-{}@example.com", Uuid::new_v4())
}

pub async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    }
}
