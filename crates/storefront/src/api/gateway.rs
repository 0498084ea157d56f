//! Authenticated HTTP dispatch for the commerce API.
//!
//! Credentials are cookie-carried: the gateway's `reqwest` client keeps a
//! cookie jar and never reads token contents. Whether the session is live
//! is derived solely from response status.
//!
//! # Refresh protocol
//!
//! A 401 on any non-auth endpoint suspends the failing call, issues exactly
//! one `POST /auth/refresh`, and replays the call once. Calls that hit a 401
//! while a refresh is already in flight queue behind it and share its
//! outcome - the single-flight invariant is that at most one refresh call is
//! ever in flight. On success a [`SessionEvent::Refreshed`] is broadcast so
//! UI state can re-sync; on failure every queued call receives the refresh
//! error and the gateway redirects to the login surface via the injected
//! [`Navigator`] (unless already there). The refresh itself is never
//! retried.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use reqwest::{Method, StatusCode};
use serde::Serialize;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, error, instrument};
use url::Url;

use crate::config::StorefrontConfig;

use super::{ApiError, RefreshError, truncate_body};

/// Endpoints whose 401s must never trigger a refresh.
const AUTH_ENDPOINTS: &[&str] = &["/auth/login", "/auth/refresh", "/auth/logout"];

/// Path of the token-refresh endpoint, relative to the API base.
const REFRESH_PATH: &str = "auth/refresh";

/// Capacity of the session-event broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Session lifecycle notifications broadcast by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Credentials were renewed after an authorization failure; UI state
    /// (e.g. the current customer) should re-sync.
    Refreshed,
    /// The refresh failed; the session is over until the user logs in again.
    Expired,
}

/// Navigation primitive the gateway uses on terminal refresh failure.
///
/// The storefront shell decides what "the login surface" means; the gateway
/// only asks whether it is already there and, if not, to go there.
pub trait Navigator: Send + Sync {
    /// Whether the login surface is currently being shown.
    fn at_login(&self) -> bool;

    /// Send the user to the login surface.
    fn to_login(&self);
}

/// Navigator for embeddings without a navigation surface (tests, tooling).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNavigator;

impl Navigator for NoopNavigator {
    fn at_login(&self) -> bool {
        false
    }

    fn to_login(&self) {}
}

/// Authenticated gateway to the commerce API.
///
/// Cheaply cloneable; all clones share one cookie jar, one refresh state
/// machine, and one event channel.
#[derive(Clone)]
pub struct ApiGateway {
    inner: Arc<GatewayInner>,
}

struct GatewayInner {
    http: reqwest::Client,
    base_url: Url,
    /// Guards the refresh call and stores the most recent outcome. Waiters
    /// queue on this mutex while a refresh is in flight.
    refresh: Mutex<Result<(), RefreshError>>,
    /// Bumped after every completed refresh. A caller snapshots this at
    /// 401-arrival time; a changed value after acquiring the mutex means a
    /// refresh finished while the caller queued, and its outcome is shared.
    generation: AtomicU64,
    events: broadcast::Sender<SessionEvent>,
    navigator: Box<dyn Navigator>,
}

impl ApiGateway {
    /// Create a gateway from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(
        config: &StorefrontConfig,
        navigator: Box<dyn Navigator>,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(config.http_timeout)
            .build()?;

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            inner: Arc::new(GatewayInner {
                http,
                base_url: config.api_base_url.clone(),
                refresh: Mutex::new(Ok(())),
                generation: AtomicU64::new(0),
                events,
                navigator,
            }),
        })
    }

    /// Subscribe to session lifecycle events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Resolve a path relative to the configured API base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the joined URL is invalid.
    pub fn url(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.inner.base_url.join(path)?)
    }

    // =========================================================================
    // Request helpers
    // =========================================================================

    /// Issue a GET request.
    ///
    /// # Errors
    ///
    /// Returns an error on connection failure or terminal refresh failure.
    pub async fn get(&self, path: &str) -> Result<reqwest::Response, ApiError> {
        let request = self.inner.http.get(self.url(path)?).build()?;
        self.dispatch(request).await
    }

    /// Issue a GET request with query parameters.
    ///
    /// # Errors
    ///
    /// Returns an error on connection failure or terminal refresh failure.
    pub async fn get_query<Q: Serialize + ?Sized>(
        &self,
        path: &str,
        query: &Q,
    ) -> Result<reqwest::Response, ApiError> {
        let request = self.inner.http.get(self.url(path)?).query(query).build()?;
        self.dispatch(request).await
    }

    /// Issue a POST request with a JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error on connection failure or terminal refresh failure.
    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response, ApiError> {
        let request = self.inner.http.post(self.url(path)?).json(body).build()?;
        self.dispatch(request).await
    }

    /// Issue a bodyless POST request.
    ///
    /// # Errors
    ///
    /// Returns an error on connection failure or terminal refresh failure.
    pub async fn post_empty(&self, path: &str) -> Result<reqwest::Response, ApiError> {
        let request = self.inner.http.post(self.url(path)?).build()?;
        self.dispatch(request).await
    }

    /// Issue a PUT request with a JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error on connection failure or terminal refresh failure.
    pub async fn put_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response, ApiError> {
        let request = self.inner.http.put(self.url(path)?).json(body).build()?;
        self.dispatch(request).await
    }

    /// Issue a DELETE request.
    ///
    /// # Errors
    ///
    /// Returns an error on connection failure or terminal refresh failure.
    pub async fn delete(&self, path: &str) -> Result<reqwest::Response, ApiError> {
        let request = self
            .inner
            .http
            .request(Method::DELETE, self.url(path)?)
            .build()?;
        self.dispatch(request).await
    }

    // =========================================================================
    // Dispatch and refresh
    // =========================================================================

    /// Send a request, applying the refresh-on-401 protocol.
    async fn dispatch(&self, request: reqwest::Request) -> Result<reqwest::Response, ApiError> {
        let path = request.url().path().to_owned();
        let replay = request.try_clone();

        let response = self.inner.http.execute(request).await?;

        if response.status() != StatusCode::UNAUTHORIZED || is_auth_endpoint(&path) {
            return Ok(response);
        }

        // A request with a non-cloneable (streaming) body cannot be
        // replayed; surface its 401 unmodified.
        let Some(replay) = replay else {
            return Ok(response);
        };

        self.refresh_session().await?;

        // The replay is issued exactly once and bypasses the 401 check, so
        // a single request can never trigger two refreshes.
        Ok(self.inner.http.execute(replay).await?)
    }

    /// Refresh the session, sharing one in-flight refresh across callers.
    async fn refresh_session(&self) -> Result<(), RefreshError> {
        let observed = self.inner.generation.load(Ordering::Acquire);

        let mut last_outcome = self.inner.refresh.lock().await;
        if self.inner.generation.load(Ordering::Acquire) != observed {
            // A refresh completed while we queued; share its outcome
            // instead of issuing another call.
            debug!("joining completed refresh");
            return last_outcome.clone();
        }

        debug!("authorization failed, refreshing session");
        let outcome = self.request_refresh().await;
        *last_outcome = outcome.clone();
        self.inner.generation.fetch_add(1, Ordering::Release);

        match &outcome {
            Ok(()) => {
                debug!("session refreshed");
                let _ = self.inner.events.send(SessionEvent::Refreshed);
            }
            Err(err) => {
                error!(error = %err, "session refresh failed");
                let _ = self.inner.events.send(SessionEvent::Expired);
                if !self.inner.navigator.at_login() {
                    self.inner.navigator.to_login();
                }
            }
        }

        outcome
    }

    /// The actual refresh call. Never retried; its failure ends the session.
    #[instrument(skip(self))]
    async fn request_refresh(&self) -> Result<(), RefreshError> {
        let url = self
            .inner
            .base_url
            .join(REFRESH_PATH)
            .map_err(|e| RefreshError::new(e.to_string()))?;

        let response = self
            .inner
            .http
            .post(url)
            .send()
            .await
            .map_err(|e| RefreshError::new(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(RefreshError::new(format!(
            "refresh endpoint returned {status}: {}",
            truncate_body(&body)
        )))
    }
}

/// Whether a 401 from this path is excluded from the refresh protocol.
fn is_auth_endpoint(path: &str) -> bool {
    AUTH_ENDPOINTS.iter().any(|suffix| path.ends_with(suffix))
}
