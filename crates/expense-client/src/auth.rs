//! Request authentication and token refresh.
//!
//! Every call runs through [`AuthPipeline::execute`]:
//!
//! 1. [`Authenticator`] attaches the stored access token as a bearer credential.
//! 2. The [`Transport`] sends the request.
//! 3. [`RefreshHandler`] inspects the outcome. A 401 on a refreshable request
//!    that has not been retried yet triggers one refresh call and one replay;
//!    anything else is passed through. When recovery is impossible the session
//!    is cleared and [`AuthEvent::LoggedOut`] is published.

use reqwest::StatusCode;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

use crate::error::Result;
use crate::models::{RefreshRequest, RefreshResponse};
use crate::token_store::TokenStore;
use crate::transport::{ApiRequest, ApiResponse, Transport};

/// Token refresh endpoint.
pub const REFRESH_PATH: &str = "/api/auth/token/refresh/";

/// Authentication state changes published to front ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    /// A session was established or its access token renewed.
    Authenticated,
    /// The session was cleared; the user has to log in again.
    LoggedOut,
}

/// First 8 characters of a token, for logs.
pub(crate) fn token_prefix(token: &str) -> &str {
    token.get(..8).unwrap_or(token)
}

/// Attaches the current access token to outgoing requests.
pub struct Authenticator {
    store: Arc<dyn TokenStore>,
}

impl Authenticator {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self { store }
    }

    /// Set the bearer credential from the store. A missing token, or a store
    /// that cannot be read, leaves the request unauthenticated.
    pub fn authenticate(&self, request: &mut ApiRequest) {
        request.bearer = match self.store.get() {
            Ok(session) => session.access_token,
            Err(e) => {
                tracing::warn!(error = %e, "Could not read session, sending request unauthenticated");
                None
            }
        };
    }
}

/// Recovers expired access tokens with a single refresh-and-retry cycle.
pub struct RefreshHandler {
    store: Arc<dyn TokenStore>,
    transport: Arc<dyn Transport>,
    events: Arc<watch::Sender<AuthEvent>>,
    // Serializes refresh calls so concurrent 401s share one refresh.
    gate: Mutex<()>,
}

impl RefreshHandler {
    pub fn new(
        store: Arc<dyn TokenStore>,
        transport: Arc<dyn Transport>,
        events: Arc<watch::Sender<AuthEvent>>,
    ) -> Self {
        Self {
            store,
            transport,
            events,
            gate: Mutex::new(()),
        }
    }

    /// Inspect the outcome of `request`.
    ///
    /// Network errors and non-401 responses pass through unchanged. An
    /// unrecoverable 401 is returned as the response itself after the session
    /// has been cleared.
    pub async fn handle(
        &self,
        mut request: ApiRequest,
        mut outcome: Result<ApiResponse>,
    ) -> Result<ApiResponse> {
        loop {
            let response = outcome?;

            if response.status != StatusCode::UNAUTHORIZED || !request.refreshable {
                return Ok(response);
            }

            if request.retried {
                tracing::warn!(path = %request.path, "Request rejected again after token refresh");
                self.force_logout();
                return Ok(response);
            }

            request.retried = true;

            let Some(access_token) = self.renew_access_token(request.bearer.as_deref()).await
            else {
                self.force_logout();
                return Ok(response);
            };

            request.bearer = Some(access_token);
            tracing::debug!(method = %request.method, path = %request.path, "Replaying request with renewed token");

            outcome = self.transport.send(&request).await;
        }
    }

    /// Obtain a fresh access token, or `None` if the session cannot be renewed.
    ///
    /// `stale` is the token the failed request carried. If another request
    /// already replaced it while we waited on the gate, that token is reused.
    async fn renew_access_token(&self, stale: Option<&str>) -> Option<String> {
        let _gate = self.gate.lock().await;

        let session = match self.store.get() {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(error = %e, "Could not read session for token refresh");
                return None;
            }
        };

        if let Some(current) = session.access_token {
            if stale != Some(current.as_str()) {
                tracing::debug!(
                    token = token_prefix(&current),
                    "Access token already renewed by a concurrent request"
                );
                return Some(current);
            }
        }

        let Some(refresh_token) = session.refresh_token else {
            tracing::info!("No refresh token stored, cannot renew session");
            return None;
        };

        let request = ApiRequest::post(REFRESH_PATH)
            .without_refresh()
            .json(&RefreshRequest {
                refresh: &refresh_token,
            })
            .ok()?;

        let response = match self.transport.send(&request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "Token refresh request failed");
                return None;
            }
        };

        if !response.is_success() {
            tracing::warn!(status = response.status.as_u16(), "Token refresh rejected");
            return None;
        }

        let renewed: RefreshResponse = match response.json() {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(error = %e, "Token refresh returned an unexpected body");
                return None;
            }
        };

        if let Err(e) = self.store.set(&renewed.access, None, None) {
            tracing::warn!(error = %e, "Could not persist renewed access token");
            return None;
        }

        tracing::info!(token = token_prefix(&renewed.access), "Access token renewed");
        self.events.send_replace(AuthEvent::Authenticated);
        Some(renewed.access)
    }

    /// Clear the session and signal that the user must log in again.
    pub fn force_logout(&self) {
        if let Err(e) = self.store.clear() {
            tracing::error!(error = %e, "Failed to clear session");
        }
        tracing::warn!("Session expired, logged out");
        self.events.send_replace(AuthEvent::LoggedOut);
    }
}

/// Authenticate → send → inspect, composed around a transport.
pub struct AuthPipeline {
    authenticator: Authenticator,
    transport: Arc<dyn Transport>,
    refresh: RefreshHandler,
    events: Arc<watch::Sender<AuthEvent>>,
}

impl AuthPipeline {
    pub fn new(store: Arc<dyn TokenStore>, transport: Arc<dyn Transport>) -> Self {
        let initial = match store.get() {
            Ok(session) if session.access_token.is_some() => AuthEvent::Authenticated,
            _ => AuthEvent::LoggedOut,
        };
        let (sender, _) = watch::channel(initial);
        let events = Arc::new(sender);

        Self {
            authenticator: Authenticator::new(store.clone()),
            refresh: RefreshHandler::new(store, transport.clone(), events.clone()),
            transport,
            events,
        }
    }

    pub async fn execute(&self, mut request: ApiRequest) -> Result<ApiResponse> {
        self.authenticator.authenticate(&mut request);
        let outcome = self.transport.send(&request).await;
        self.refresh.handle(request, outcome).await
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    pub(crate) fn publish(&self, event: AuthEvent) {
        self.events.send_replace(event);
    }
}
