//! Integration tests for Greengrocer.
//!
//! # Test Categories
//!
//! - `cart_reload` - Durable cart persistence across process restarts
//! - `gateway_refresh` - The single-flight refresh-on-401 protocol
//!
//! This crate hosts [`StubApi`], a minimal in-process commerce API the
//! gateway tests run against. It models the only behavior the protocol
//! cares about: data endpoints answer 401 until the session cookie is
//! present, and the refresh endpoint mints that cookie (or refuses to,
//! in failing mode) while counting how often it is called.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;

/// Cookie value the stub treats as a live session.
const SESSION_COOKIE: &str = "session=fresh";

/// How long the stub's refresh endpoint dawdles before answering. Gives
/// concurrent 401s a wide window to queue behind the in-flight refresh.
const REFRESH_DELAY: Duration = Duration::from_millis(100);

struct StubState {
    refresh_calls: AtomicUsize,
    fail_refresh: bool,
}

/// A minimal in-process commerce API for gateway tests.
pub struct StubApi {
    addr: SocketAddr,
    state: Arc<StubState>,
}

impl StubApi {
    /// Spawn a stub whose refresh endpoint succeeds.
    pub async fn spawn() -> Self {
        Self::spawn_with(false).await
    }

    /// Spawn a stub whose refresh endpoint always refuses.
    pub async fn spawn_failing_refresh() -> Self {
        Self::spawn_with(true).await
    }

    async fn spawn_with(fail_refresh: bool) -> Self {
        let state = Arc::new(StubState {
            refresh_calls: AtomicUsize::new(0),
            fail_refresh,
        });

        let app = Router::new()
            .route("/products", get(products))
            .route("/orders", post(orders))
            .route("/auth/login", post(login))
            .route("/auth/refresh", post(refresh))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind stub API listener");
        let addr = listener.local_addr().expect("Failed to read stub address");

        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("Stub API error");
        });

        Self { addr, state }
    }

    /// Base URL for a gateway pointed at this stub.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    /// How many times the refresh endpoint has been called.
    #[must_use]
    pub fn refresh_calls(&self) -> usize {
        self.state.refresh_calls.load(Ordering::SeqCst)
    }
}

fn has_session(headers: &HeaderMap) -> bool {
    headers
        .get(header::COOKIE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|cookies| cookies.contains(SESSION_COOKIE))
}

async fn products(headers: HeaderMap) -> Response {
    if !has_session(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    Json(json!({
        "products": [
            {"id": 1, "name": "Apples", "price": "2.50", "category": "fruit"},
            {"id": 2, "name": "Oat Milk", "price": "1.99", "category": "dairy"},
        ]
    }))
    .into_response()
}

async fn orders(headers: HeaderMap, Json(order): Json<serde_json::Value>) -> Response {
    if !has_session(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let line_count = order
        .get("items")
        .and_then(|items| items.as_array())
        .map_or(0, Vec::len);
    if line_count == 0 {
        return StatusCode::UNPROCESSABLE_ENTITY.into_response();
    }

    Json(json!({
        "data": {"id": 501, "status": "processing", "total": "12.00"}
    }))
    .into_response()
}

/// Always refuses, so a 401 here must reach the caller untouched - login
/// failures are for the user to fix, not the refresh protocol.
async fn login() -> StatusCode {
    StatusCode::UNAUTHORIZED
}

async fn refresh(State(state): State<Arc<StubState>>) -> Response {
    state.refresh_calls.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(REFRESH_DELAY).await;

    if state.fail_refresh {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    (
        [(header::SET_COOKIE, "session=fresh; Path=/")],
        Json(json!({"ok": true})),
    )
        .into_response()
}
