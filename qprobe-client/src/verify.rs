//! Verification endpoints

use async_trait::async_trait;
use qprobe_core::domain::cache::CachedStatus;
use qprobe_core::dto::verify::{DispatchResponse, StatusResponse};
use tracing::debug;

use crate::VerifyClient;
use crate::api::{StatusRefresher, VerificationApi};
use crate::error::{ClientError, Result};

const DEFAULT_DISPATCH_FAILURE: &str = "Failed to dispatch verification job";

impl VerifyClient {
    // =============================================================================
    // Probe Jobs
    // =============================================================================

    /// Dispatch a new probe job
    ///
    /// # Returns
    /// The id of the dispatched job
    ///
    /// A `success: false` answer is turned into [`ClientError::Dispatch`]
    /// carrying the server's message, whatever the HTTP status code was.
    pub async fn dispatch(&self) -> Result<String> {
        let url = format!("{}/verify/dispatch", self.base_url);
        let response = self.authorize(self.client.post(&url)).send().await?;
        let status = response.status();
        let body = response.text().await?;

        let parsed = serde_json::from_str::<DispatchResponse>(&body);

        match parsed {
            Ok(DispatchResponse {
                success: true,
                job_id: Some(job_id),
                ..
            }) if status.is_success() && !job_id.is_empty() => {
                debug!("Dispatched probe job {}", job_id);
                Ok(job_id)
            }
            Ok(DispatchResponse {
                success: true,
                ..
            }) if status.is_success() => Err(ClientError::Dispatch(
                "Dispatch response did not include a job id".to_string(),
            )),
            Ok(DispatchResponse { message, .. }) => Err(ClientError::Dispatch(
                message.unwrap_or_else(|| DEFAULT_DISPATCH_FAILURE.to_string()),
            )),
            Err(_) if !status.is_success() => Err(ClientError::api_error(status.as_u16(), body)),
            Err(e) => Err(ClientError::ParseError(format!(
                "Failed to parse dispatch response: {}",
                e
            ))),
        }
    }

    /// Get the status of a probe job
    ///
    /// # Arguments
    /// * `job_id` - The job id returned by [`VerifyClient::dispatch`]
    pub async fn fetch_status(&self, job_id: &str) -> Result<StatusResponse> {
        let url = format!("{}/verify/status", self.base_url);
        let request = self.client.get(&url).query(&[("job_id", job_id)]);
        let response = self.authorize(request).send().await?;

        self.handle_response(response).await
    }

    /// Get the snapshot of the last probe job kept by the server
    ///
    /// A 404, an empty body, `null`, or an object without a `status` field
    /// all mean that nothing is cached.
    pub async fn fetch_cached_status(&self) -> Result<Option<CachedStatus>> {
        let url = format!("{}/verify/cached-status", self.base_url);
        let response = self.authorize(self.client.get(&url)).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(ClientError::api_error(status.as_u16(), body));
        }

        parse_cached_status(&body)
    }

    // =============================================================================
    // Dashboard
    // =============================================================================

    /// Refresh the general setup status of the dashboard
    pub async fn refresh_setup_status(&self) -> Result<()> {
        let url = format!("{}/setup/status", self.base_url);
        let response = self.authorize(self.client.get(&url)).send().await?;

        self.handle_empty_response(response).await
    }
}

fn parse_cached_status(body: &str) -> Result<Option<CachedStatus>> {
    if body.trim().is_empty() {
        return Ok(None);
    }

    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| ClientError::ParseError(format!("Failed to parse cached status: {}", e)))?;

    match value.get("status") {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(_) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| ClientError::ParseError(format!("Failed to parse cached status: {}", e))),
    }
}

#[async_trait]
impl VerificationApi for VerifyClient {
    async fn dispatch(&self) -> Result<String> {
        VerifyClient::dispatch(self).await
    }

    async fn fetch_status(&self, job_id: &str) -> Result<StatusResponse> {
        VerifyClient::fetch_status(self, job_id).await
    }

    async fn fetch_cached_status(&self) -> Result<Option<CachedStatus>> {
        VerifyClient::fetch_cached_status(self).await
    }
}

#[async_trait]
impl StatusRefresher for VerifyClient {
    async fn refresh(&self) -> Result<()> {
        self.refresh_setup_status().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qprobe_core::domain::job::JobStatus;

    #[test]
    fn test_parse_cached_status_absent() {
        assert!(parse_cached_status("").unwrap().is_none());
        assert!(parse_cached_status("null").unwrap().is_none());
        assert!(parse_cached_status("{}").unwrap().is_none());
        assert!(parse_cached_status(r#"{"status": null}"#).unwrap().is_none());
    }

    #[test]
    fn test_parse_cached_status_present() {
        let cached = parse_cached_status(r#"{"status": "completed", "processing_time": 2.5}"#)
            .unwrap()
            .unwrap();
        assert_eq!(cached.status, JobStatus::Completed);
        assert_eq!(cached.processing_time, Some(2.5));
    }

    #[test]
    fn test_parse_cached_status_garbage() {
        assert!(matches!(
            parse_cached_status("<html>"),
            Err(ClientError::ParseError(_))
        ));
    }
}
