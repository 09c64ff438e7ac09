//! Test double for [`Transport`].

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::Value;
use std::sync::Mutex;

use crate::error::Result;
use crate::transport::{ApiRequest, ApiResponse, Transport};

/// A request as the transport saw it.
#[derive(Debug, Clone)]
pub(crate) struct Recorded {
    pub method: Method,
    pub path: String,
    pub bearer: Option<String>,
    pub body: Option<Value>,
}

type Handler = Box<dyn Fn(&ApiRequest) -> Result<ApiResponse> + Send + Sync>;

/// Answers every request through a handler closure and records it.
///
/// Each send yields to the scheduler first so that concurrent requests
/// interleave the way they would over a real socket.
pub(crate) struct ScriptedTransport {
    handler: Handler,
    log: Mutex<Vec<Recorded>>,
}

impl ScriptedTransport {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&ApiRequest) -> Result<ApiResponse> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.log.lock().unwrap().clone()
    }

    pub fn count(&self, path: &str) -> usize {
        self.requests().iter().filter(|r| r.path == path).count()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
        self.log.lock().unwrap().push(Recorded {
            method: request.method.clone(),
            path: request.path.clone(),
            bearer: request.bearer.clone(),
            body: request.body.clone(),
        });
        tokio::task::yield_now().await;
        (self.handler)(request)
    }
}

pub(crate) fn json_response(status: StatusCode, body: Value) -> Result<ApiResponse> {
    Ok(ApiResponse::new(status, body.to_string()))
}

pub(crate) fn unauthorized() -> Result<ApiResponse> {
    json_response(
        StatusCode::UNAUTHORIZED,
        serde_json::json!({"detail": "Given token not valid for any token type"}),
    )
}
