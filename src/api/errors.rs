//! Drive API error types
//!
//! Structured error handling for remote drive operations. Maps HTTP status
//! codes to specific variants so the gateway and cache can decide what is
//! recoverable (401 refresh) and what must surface to the caller.

use serde_json::Value;

/// Errors surfaced by the client core.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Access denied: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error ({0}): {1}")]
    Server(u16, String),

    #[error("Request timeout")]
    Timeout,

    #[error("Request error: {0}")]
    Request(String),
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::Request(format!("serialization error: {}", e))
    }
}

impl ApiError {
    /// Create an ApiError from an HTTP status code and response body text
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = extract_message(body);
        match status {
            400 => ApiError::Request(message),
            401 => ApiError::Auth(message),
            403 => ApiError::Forbidden(message),
            404 => ApiError::NotFound(message),
            408 => ApiError::Timeout,
            500..=599 => ApiError::Server(status, message),
            _ => ApiError::Request(format!("HTTP {}: {}", status, message)),
        }
    }
}

/// Pull a human-readable message out of an error response body.
///
/// The service reports errors as `{"detail": ...}`, `{"message": ...}` or
/// `{"error": ...}` depending on the endpoint; fall back to the raw text.
fn extract_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        for key in ["detail", "message", "error"] {
            if let Some(text) = value.get(key).and_then(Value::as_str) {
                return text.to_string();
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "no details provided".to_string()
    } else {
        trimmed.to_string()
    }
}
