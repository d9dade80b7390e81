//! Cached status snapshot
//!
//! The hosting application keeps the last known probe job snapshot so that a
//! reloaded client can render the previous result without dispatching again.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::job::JobStatus;

/// Default validity window of a cached snapshot, in seconds
pub const DEFAULT_CACHE_TTL_SECS: i64 = 3600;

/// Default validity window of a cached snapshot
pub fn default_cache_ttl() -> Duration {
    Duration::seconds(DEFAULT_CACHE_TTL_SECS)
}

/// Last known probe job snapshot, as persisted by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedStatus {
    #[serde(default, alias = "jobId")]
    pub job_id: Option<String>,
    pub status: JobStatus,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub dispatched_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub processing_time: Option<f64>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub troubleshooting: Vec<String>,
}

impl CachedStatus {
    /// Timestamp the validity window is measured from
    ///
    /// Terminal snapshots use their completion time, falling back to the
    /// dispatch time when the server did not record one.
    pub fn reference_time(&self) -> Option<DateTime<Utc>> {
        if self.status.is_terminal() {
            self.completed_at.or(self.dispatched_at)
        } else {
            self.dispatched_at
        }
    }

    /// Returns true when the snapshot must not be shown as current
    ///
    /// A snapshot without any timestamp cannot prove freshness and is
    /// considered expired.
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        match self.reference_time() {
            Some(at) => now.signed_duration_since(at) > ttl,
            None => true,
        }
    }
}
