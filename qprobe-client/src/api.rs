//! Seams between the HTTP client and its consumers
//!
//! The monitor only depends on these traits so that the polling engine and
//! the coordinator can be driven by scripted fakes in tests.

use async_trait::async_trait;
use qprobe_core::domain::cache::CachedStatus;
use qprobe_core::dto::verify::StatusResponse;

use crate::error::Result;

/// Verification endpoints of the hosting application
#[async_trait]
pub trait VerificationApi: Send + Sync {
    /// Dispatches a new probe job
    ///
    /// # Returns
    /// The id of the dispatched job. A refusal from the server is reported as
    /// [`ClientError::Dispatch`](crate::ClientError::Dispatch).
    async fn dispatch(&self) -> Result<String>;

    /// Fetches the current status of a probe job
    ///
    /// # Arguments
    /// * `job_id` - The id returned by [`VerificationApi::dispatch`]
    async fn fetch_status(&self, job_id: &str) -> Result<StatusResponse>;

    /// Fetches the server-held snapshot of the last probe job
    ///
    /// Returns `None` when the server has nothing cached.
    async fn fetch_cached_status(&self) -> Result<Option<CachedStatus>>;
}

/// General setup-status refresh of the hosting dashboard
#[async_trait]
pub trait StatusRefresher: Send + Sync {
    async fn refresh(&self) -> Result<()>;
}
