//! Error types for the verification client

use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when talking to the verification endpoints
#[derive(Debug, Error)]
pub enum ClientError {
    /// The server could not be reached
    #[error("Network error: {0}")]
    Network(String),

    /// The request did not complete in time
    #[error("Request timed out")]
    Timeout,

    /// API returned an error status code
    #[error("API error (status {status}): {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error message from the API
        message: String,
    },

    /// The server refused to dispatch the probe job
    #[error("Dispatch failed: {0}")]
    Dispatch(String),

    /// Failed to parse response
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// Any other HTTP client failure
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[source] reqwest::Error),
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        // The URL would leak the host and endpoint path into classified text.
        let err = err.without_url();
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() || err.is_request() {
            Self::Network(err.to_string())
        } else if err.is_decode() {
            Self::ParseError(err.to_string())
        } else {
            Self::RequestFailed(err)
        }
    }
}

impl ClientError {
    /// Create an API error from status code and message
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            status,
            message: message.into(),
        }
    }

    /// Check if this error is a request timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    /// Check if this error is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ApiError { status: 404, .. })
    }

    /// Check if this error is a server error (5xx status)
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::ApiError { status, .. } if *status >= 500)
    }

    /// Text handed to the error classifier
    ///
    /// A refused dispatch is classified on the server's own message. An API
    /// error is classified on its status line plus the `message` field of a
    /// JSON body; raw bodies such as HTML error pages are never classified.
    pub fn classification_text(&self) -> String {
        match self {
            Self::Dispatch(message) => message.clone(),
            Self::ApiError { status, message } => {
                let status_line = status_line(*status);
                match json_message(message) {
                    Some(detail) => format!("{}: {}", status_line, detail),
                    None => status_line,
                }
            }
            other => other.to_string(),
        }
    }
}

fn status_line(status: u16) -> String {
    let reason = reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason());
    match reason {
        Some(reason) => format!("HTTP {} {}", status, reason),
        None => format!("HTTP {}", status),
    }
}

fn json_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("message")
        .and_then(|m| m.as_str())
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_predicates() {
        assert!(ClientError::api_error(503, "down").is_server_error());
        assert!(!ClientError::api_error(404, "missing").is_server_error());
        assert!(ClientError::api_error(404, "missing").is_not_found());
        assert!(ClientError::Timeout.is_timeout());
    }

    #[test]
    fn test_classification_text() {
        let dispatch = ClientError::Dispatch("Queue connection refused".to_string());
        assert_eq!(dispatch.classification_text(), "Queue connection refused");

        let timeout = ClientError::Timeout;
        assert_eq!(timeout.classification_text(), "Request timed out");

        let network = ClientError::Network("dns failure".to_string());
        assert_eq!(network.classification_text(), "Network error: dns failure");
    }

    #[test]
    fn test_api_error_never_classifies_raw_markup() {
        let html = ClientError::api_error(
            500,
            "<html><body><table><tr><td>Whoops, dispatch config</td></tr></table></body></html>",
        );
        assert_eq!(html.classification_text(), "HTTP 500 Internal Server Error");

        let json = ClientError::api_error(503, r#"{"message": "Service in maintenance"}"#);
        assert_eq!(
            json.classification_text(),
            "HTTP 503 Service Unavailable: Service in maintenance"
        );

        let unknown = ClientError::api_error(599, "");
        assert_eq!(unknown.classification_text(), "HTTP 599");
    }
}
