//! HTTP transport.
//!
//! The pipeline in [`crate::auth`] talks to a [`Transport`]; HTTP statuses
//! come back as `Ok(ApiResponse)` and only network-level failures are errors.

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

/// An outbound API call.
///
/// Carries its own retry state so concurrent requests never share a counter.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,

    /// Path below the base URL, e.g. `/api/expenses/`.
    pub path: String,

    pub body: Option<Value>,

    /// Access token sent as `Authorization: Bearer <token>`.
    pub bearer: Option<String>,

    /// Whether a 401 may trigger the refresh-and-retry cycle.
    pub refreshable: bool,

    /// Set once the request has been replayed after a refresh.
    pub retried: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            bearer: None,
            refreshable: true,
            retried: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self> {
        let value = serde_json::to_value(body)
            .map_err(|e| ClientError::Decode(format!("failed to encode request body: {}", e)))?;
        self.body = Some(value);
        Ok(self)
    }

    /// Exclude this request from refresh-and-retry.
    pub fn without_refresh(mut self) -> Self {
        self.refreshable = false;
        self
    }
}

/// A received HTTP response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Turn a non-success status into the matching [`ClientError`].
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ClientError::from_status(self.status, &self.body))
        }
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body).map_err(|e| {
            ClientError::Decode(format!(
                "{} (status {}, body: {})",
                e,
                self.status,
                truncate(&self.body, 200)
            ))
        })
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Sends requests to the API.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse>;
}

/// [`Transport`] over reqwest.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    config: ClientConfig,
}

impl HttpTransport {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn map_error(&self, e: reqwest::Error) -> ClientError {
        if e.is_timeout() {
            ClientError::Timeout(self.config.timeout)
        } else {
            ClientError::Unreachable(e.to_string())
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let url = self.config.url(&request.path);
        tracing::debug!(method = %request.method, %url, authenticated = request.bearer.is_some(), "Sending request");

        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .header(reqwest::header::ACCEPT, "application/json");

        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let started = std::time::Instant::now();
        let response = builder.send().await.map_err(|e| self.map_error(e))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| self.map_error(e))?;

        tracing::debug!(
            method = %request.method,
            path = %request.path,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Received response"
        );

        Ok(ApiResponse { status, body })
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.config.base_url)
            .field("timeout", &self.config.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use std::time::Duration;

    async fn spawn_server() -> String {
        async fn whoami(headers: HeaderMap) -> String {
            headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("none")
                .to_string()
        }

        async fn echo(Json(body): Json<Value>) -> Json<Value> {
            Json(body)
        }

        async fn slow() -> &'static str {
            tokio::time::sleep(Duration::from_secs(2)).await;
            "late"
        }

        let app = Router::new()
            .route("/api/whoami/", get(whoami))
            .route("/api/echo/", post(echo))
            .route("/api/slow/", get(slow));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn transport(base_url: &str, timeout: Duration) -> HttpTransport {
        let config = ClientConfig::new(base_url).unwrap().with_timeout(timeout);
        HttpTransport::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_bearer_header_on_the_wire() {
        let base = spawn_server().await;
        let transport = transport(&base, Duration::from_secs(5));

        let mut request = ApiRequest::get("/api/whoami/");
        let response = transport.send(&request).await.unwrap();
        assert_eq!(response.body, "none");

        request.bearer = Some("t1".to_string());
        let response = transport.send(&request).await.unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body, "Bearer t1");
    }

    #[tokio::test]
    async fn test_json_body_round_trip() {
        let base = spawn_server().await;
        let transport = transport(&base, Duration::from_secs(5));

        let request = ApiRequest::post("/api/echo/")
            .json(&serde_json::json!({"name": "Travel"}))
            .unwrap();
        let response = transport.send(&request).await.unwrap();
        let value: Value = response.json().unwrap();
        assert_eq!(value["name"], "Travel");
    }

    #[tokio::test]
    async fn test_http_errors_are_responses() {
        let base = spawn_server().await;
        let transport = transport(&base, Duration::from_secs(5));

        let response = transport.send(&ApiRequest::get("/api/missing/")).await.unwrap();
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert!(matches!(
            response.error_for_status(),
            Err(ClientError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_timeout_is_reported() {
        let base = spawn_server().await;
        let transport = transport(&base, Duration::from_millis(200));

        let err = transport.send(&ApiRequest::get("/api/slow/")).await.unwrap_err();
        assert!(matches!(err, ClientError::Timeout(d) if d == Duration::from_millis(200)));
    }

    #[tokio::test]
    async fn test_unreachable_is_reported() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = transport(&format!("http://{}", addr), Duration::from_secs(2));
        let err = transport.send(&ApiRequest::get("/api/expenses/")).await.unwrap_err();
        assert!(matches!(err, ClientError::Unreachable(_)), "got {:?}", err);
    }

    #[test]
    fn test_decode_error_mentions_status() {
        let response = ApiResponse::new(StatusCode::OK, "<html>");
        let err = response.json::<Value>().unwrap_err();
        assert!(err.to_string().contains("200"));
    }
}
