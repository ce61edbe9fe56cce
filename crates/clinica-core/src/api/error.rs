use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Network error: {0}")]
    Network(String),

    #[error("{message}")]
    Http { status: u16, message: String },

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Build the error for a non-2xx response.
    ///
    /// The server's JSON `message` (or `error`) field wins; anything else
    /// falls back to `HTTP <status>: <reason>`.
    pub fn from_status(status: u16, reason: &str, body: &str) -> Self {
        let message = serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|v| {
                v.get("message")
                    .or_else(|| v.get("error"))
                    .and_then(Value::as_str)
                    .map(Self::truncate_body)
            })
            .unwrap_or_else(|| format!("HTTP {}: {}", status, reason));

        ApiError::Http { status, message }
    }

    /// Whether the client's retry loop may try the request again.
    /// Timeouts fail immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::Network(_) | ApiError::Http { .. })
    }

    /// True for failures that say nothing about the request itself, only
    /// that the server could not be reached.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, ApiError::Timeout(_) | ApiError::Network(_))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_uses_json_message() {
        let err = ApiError::from_status(400, "Bad Request", r#"{"message":"RUT duplicado"}"#);
        assert_eq!(err.to_string(), "RUT duplicado");
        assert_eq!(err.status(), Some(400));
    }

    #[test]
    fn test_from_status_uses_error_field() {
        let err = ApiError::from_status(422, "Unprocessable Entity", r#"{"success":false,"error":"Falta nombre"}"#);
        assert_eq!(err.to_string(), "Falta nombre");
    }

    #[test]
    fn test_from_status_falls_back_to_status_text() {
        let err = ApiError::from_status(500, "Internal Server Error", "<html>oops</html>");
        assert_eq!(err.to_string(), "HTTP 500: Internal Server Error");

        let err = ApiError::from_status(503, "Service Unavailable", "");
        assert_eq!(err.to_string(), "HTTP 503: Service Unavailable");
    }

    #[test]
    fn test_retry_classification() {
        assert!(!ApiError::Timeout(Duration::from_secs(10)).is_retryable());
        assert!(ApiError::Network("connection refused".into()).is_retryable());
        assert!(ApiError::from_status(502, "Bad Gateway", "").is_retryable());
        assert!(!ApiError::Rejected("no".into()).is_retryable());
        assert!(!ApiError::InvalidResponse("not json".into()).is_retryable());
    }

    #[test]
    fn test_truncate_long_message() {
        let long = "x".repeat(600);
        let body = format!(r#"{{"message":"{}"}}"#, long);
        let err = ApiError::from_status(400, "Bad Request", &body);
        assert!(err.to_string().contains("truncated, 600 total bytes"));
    }
}
