//! Shared test utilities for handler unit tests.
//!
//! Provides a [`TestHarness`] wrapping a fresh in-memory graph and the full
//! router, plus helpers for carrying the session cookie between requests
//! and reading JSON response bodies.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use tower::ServiceExt; // for oneshot()

use super::router::build_router;
use super::state::ServiceState;
use crate::config::{GraphBackend, ServerConfig};
use crate::graph::{Graph, GraphFlavor};

/// A self-contained test environment. The router (and its session store)
/// lives as long as the harness.
pub struct TestHarness {
    pub state: Arc<ServiceState>,
    app: Router,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_flavor(GraphFlavor::Site)
    }

    pub fn with_flavor(flavor: GraphFlavor) -> Self {
        let config = ServerConfig {
            backend: GraphBackend::Memory,
            flavor,
            ..ServerConfig::default()
        };
        let state = Arc::new(
            ServiceState::with_graph(Graph::in_memory(flavor), config)
                .expect("failed to create test state"),
        );
        let app = build_router(state.clone());
        Self { state, app }
    }

    /// Send a GET request, optionally with a session cookie.
    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> Response {
        self.send(Method::GET, uri, cookie).await
    }

    pub async fn send(&self, method: Method, uri: &str, cookie: Option<&str>) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let req = builder.body(Body::empty()).unwrap();

        let resp = self.app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let cookie = resp
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(str::to_string);
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);

        Response {
            status,
            body,
            cookie,
        }
    }

    /// Sign up `username` and return (session cookie, user id).
    pub async fn signup(&self, username: &str) -> (String, String) {
        let uri = format!("/signup?username={username}&email={username}%40example.com&password=pass_word1");
        let resp = self.get(&uri, None).await;
        assert_eq!(resp.status, StatusCode::OK, "signup failed: {}", resp.body);
        let cookie = resp.cookie.expect("signup sets a session cookie");
        let id = resp.body["id"].as_str().unwrap().to_string();
        (cookie, id)
    }
}

/// Status, parsed body and the `name=value` part of any Set-Cookie header
pub struct Response {
    pub status: StatusCode,
    pub body: serde_json::Value,
    pub cookie: Option<String>,
}

impl Response {
    pub fn message(&self) -> &str {
        self.body["message"].as_str().unwrap_or_default()
    }
}
