//! Client error types.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

/// Errors surfaced by the expense API client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// 401 that the refresh handler could not recover, or a rejected login.
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    /// 403 from the server.
    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    /// 404 from the server.
    #[error("Not found: {message}")]
    NotFound { message: String },

    /// 409 from the server.
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// 400/422 with optional field-level detail.
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        fields: BTreeMap<String, Vec<String>>,
    },

    /// 5xx or any other unexpected status.
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// No response was received.
    #[error("Server unreachable: {0}")]
    Unreachable(String),

    /// Request exceeded the configured timeout.
    #[error("Request timed out after {} seconds", .0.as_secs())]
    Timeout(Duration),

    /// Response body did not have the expected shape.
    #[error("Invalid response body: {0}")]
    Decode(String),

    /// Token store I/O or serialization failure.
    #[error("Session storage error: {0}")]
    Storage(String),

    /// Invalid client configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// Whether a user may reasonably retry the same action later.
    pub fn is_retryable_by_user(&self) -> bool {
        matches!(self, ClientError::Timeout(_) | ClientError::Unreachable(_))
    }

    /// Build an error from a non-success HTTP status and its raw body.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let detail = ErrorBody::parse(body);
        let message = detail.message.unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_string()
        });

        match status {
            StatusCode::UNAUTHORIZED => ClientError::Unauthorized { message },
            StatusCode::FORBIDDEN => ClientError::Forbidden { message },
            StatusCode::NOT_FOUND => ClientError::NotFound { message },
            StatusCode::CONFLICT => ClientError::Conflict { message },
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => ClientError::Validation {
                message,
                fields: detail.fields,
            },
            status => ClientError::Server {
                status: status.as_u16(),
                message,
            },
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(e: std::io::Error) -> Self {
        ClientError::Storage(e.to_string())
    }
}

/// Error payload in the server's format.
///
/// The server answers with `{"error": "..."}`, `{"detail": "..."}` or a map of
/// field name to a list of messages (`{"name": ["already exists"]}`).
#[derive(Debug, Default)]
struct ErrorBody {
    message: Option<String>,
    fields: BTreeMap<String, Vec<String>>,
}

impl ErrorBody {
    fn parse(body: &str) -> Self {
        let value: Value = match serde_json::from_str(body) {
            Ok(value) => value,
            Err(_) => {
                let trimmed = body.trim();
                return Self {
                    message: (!trimmed.is_empty()).then(|| trimmed.to_string()),
                    fields: BTreeMap::new(),
                };
            }
        };

        let Value::Object(map) = value else {
            return Self::default();
        };

        let mut parsed = Self::default();
        for (key, value) in map {
            match key.as_str() {
                "error" | "detail" | "message" => {
                    if parsed.message.is_none() {
                        parsed.message = value.as_str().map(str::to_string);
                    }
                }
                "non_field_errors" => {
                    if parsed.message.is_none() {
                        parsed.message = messages(&value).into_iter().next();
                    }
                }
                _ => {
                    let list = messages(&value);
                    if !list.is_empty() {
                        parsed.fields.insert(key, list);
                    }
                }
            }
        }

        if parsed.message.is_none() {
            parsed.message = parsed
                .fields
                .iter()
                .next()
                .and_then(|(field, list)| list.first().map(|m| format!("{}: {}", field, m)));
        }

        parsed
    }
}

fn messages(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ClientError::Timeout(Duration::from_secs(10));
        assert_eq!(err.to_string(), "Request timed out after 10 seconds");

        let err = ClientError::Unreachable("connection refused".to_string());
        assert_eq!(err.to_string(), "Server unreachable: connection refused");
    }

    #[test]
    fn test_from_status_unauthorized() {
        let err = ClientError::from_status(
            StatusCode::UNAUTHORIZED,
            r#"{"error": "Invalid credentials"}"#,
        );
        match err {
            ClientError::Unauthorized { message } => assert_eq!(message, "Invalid credentials"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_from_status_field_errors() {
        let err = ClientError::from_status(
            StatusCode::BAD_REQUEST,
            r#"{"name": ["A category with this name already exists for your account."]}"#,
        );
        match err {
            ClientError::Validation { message, fields } => {
                assert_eq!(
                    fields["name"],
                    vec!["A category with this name already exists for your account.".to_string()]
                );
                assert!(message.starts_with("name: "));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_from_status_category_in_use_is_verbatim() {
        let body = r#"{"error": "Cannot delete category with associated expenses. Please delete or reassign expenses first."}"#;
        let err = ClientError::from_status(StatusCode::BAD_REQUEST, body);
        match err {
            ClientError::Validation { message, fields } => {
                assert!(message.starts_with("Cannot delete category"));
                assert!(fields.is_empty());
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_from_status_plain_text_and_empty() {
        let err = ClientError::from_status(StatusCode::BAD_GATEWAY, "upstream down");
        assert!(matches!(err, ClientError::Server { status: 502, ref message } if message == "upstream down"));

        let err = ClientError::from_status(StatusCode::FORBIDDEN, "");
        assert!(matches!(err, ClientError::Forbidden { ref message } if message == "Forbidden"));
    }

    #[test]
    fn test_retryable_by_user() {
        assert!(ClientError::Timeout(Duration::from_secs(1)).is_retryable_by_user());
        assert!(ClientError::Unreachable("x".into()).is_retryable_by_user());
        assert!(!ClientError::Unauthorized { message: "x".into() }.is_retryable_by_user());
    }
}
