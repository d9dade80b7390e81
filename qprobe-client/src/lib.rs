//! Queue Probe HTTP Client
//!
//! A small, type-safe HTTP client for the queue worker verification endpoints
//! exposed by the hosting dashboard.
//!
//! The client is consumed by the monitor through the [`VerificationApi`] and
//! [`StatusRefresher`] traits, which keeps the polling logic independent of
//! the transport.
//!
//! # Example
//!
//! ```no_run
//! use qprobe_client::VerifyClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), qprobe_client::ClientError> {
//!     let client = VerifyClient::new("http://localhost:8000")
//!         .with_csrf_token(Some("token-from-page".to_string()));
//!
//!     let job_id = client.dispatch().await?;
//!     let status = client.fetch_status(&job_id).await?;
//!     println!("{} is {}", job_id, status.status);
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod error;
mod verify;

// Re-export commonly used types
pub use api::{StatusRefresher, VerificationApi};
pub use error::{ClientError, Result};

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::warn;

/// Header carrying the anti-forgery token supplied by the hosting page
pub const CSRF_HEADER: &str = "X-CSRF-TOKEN";

/// HTTP client for the verification endpoints
///
/// Endpoints:
/// - `POST /verify/dispatch` - dispatch a probe job
/// - `GET /verify/status` - status of a dispatched job
/// - `GET /verify/cached-status` - last snapshot kept by the server
/// - `GET /setup/status` - general dashboard status refresh
#[derive(Debug, Clone)]
pub struct VerifyClient {
    /// Base URL of the hosting application (e.g., "http://localhost:8000")
    base_url: String,
    /// HTTP client instance
    client: Client,
    /// Anti-forgery token sent with every request
    csrf_token: Option<String>,
    /// Set once the missing-token warning has been logged
    token_warned: Arc<AtomicBool>,
}

impl VerifyClient {
    /// Create a new verification client
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the hosting application
    ///
    /// # Example
    /// ```
    /// use qprobe_client::VerifyClient;
    ///
    /// let client = VerifyClient::new("http://localhost:8000");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new verification client with a custom HTTP client
    ///
    /// This allows you to configure proxies, TLS settings, etc.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            csrf_token: None,
            token_warned: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create a verification client whose requests are bounded by `timeout`
    ///
    /// # Example
    /// ```
    /// use qprobe_client::VerifyClient;
    /// use std::time::Duration;
    ///
    /// let client = VerifyClient::with_timeout("http://localhost:8000", Duration::from_secs(5))
    ///     .expect("valid client");
    /// ```
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(base_url, client))
    }

    /// Set the anti-forgery token sent with every request
    pub fn with_csrf_token(mut self, token: Option<String>) -> Self {
        self.csrf_token = token.filter(|t| !t.trim().is_empty());
        self
    }

    /// Get the base URL of the hosting application
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Attach the anti-forgery header, warning once if none is configured
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.csrf_token {
            Some(token) => request.header(CSRF_HEADER, token),
            None => {
                if !self.token_warned.swap(true, Ordering::Relaxed) {
                    warn!("No anti-forgery token configured; sending requests without it");
                }
                request
            }
        }
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Handle an API response and deserialize JSON
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }

    /// Handle an API response whose body is not needed
    async fn handle_empty_response(&self, response: reqwest::Response) -> Result<()> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = VerifyClient::new("http://localhost:8000");
        assert_eq!(client.base_url(), "http://localhost:8000");
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = VerifyClient::new("http://localhost:8000/");
        assert_eq!(client.base_url(), "http://localhost:8000");
    }

    #[test]
    fn test_client_with_timeout() {
        let client = VerifyClient::with_timeout("http://localhost:8000/", Duration::from_secs(5))
            .unwrap();
        assert_eq!(client.base_url(), "http://localhost:8000");
    }

    #[test]
    fn test_blank_token_is_ignored() {
        let client = VerifyClient::new("http://localhost:8000").with_csrf_token(Some("  ".into()));
        assert!(client.csrf_token.is_none());
    }
}
