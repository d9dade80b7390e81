//! Probe job domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::dto::verify::StatusResponse;

/// Status of a probe job as reported by the hosting application
///
/// `NotTested` is the pseudo-status returned when nothing has been run yet.
/// Strings the client does not know decode to `Unrecognized`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Queued,
    Processing,
    Completed,
    Failed,
    #[serde(alias = "timeout")]
    TimedOut,
    #[serde(alias = "canceled")]
    Cancelled,
    #[serde(alias = "unknown")]
    NotTested,
    #[serde(other)]
    Unrecognized,
}

impl JobStatus {
    /// Returns true once no further transition can happen
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::TimedOut | JobStatus::Cancelled
        )
    }

    /// Returns true while the job is waiting for or held by a worker
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            JobStatus::Pending | JobStatus::Queued | JobStatus::Processing
        )
    }

    /// Returns true for terminal outcomes that should offer a retry
    pub fn is_failure(&self) -> bool {
        matches!(self, JobStatus::Failed | JobStatus::TimedOut)
    }

    /// Wire representation of the status
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::TimedOut => "timed_out",
            JobStatus::Cancelled => "cancelled",
            JobStatus::NotTested => "not_tested",
            JobStatus::Unrecognized => "unrecognized",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One dispatched verification attempt
///
/// Created when a dispatch succeeds and updated only through observed status
/// responses. Once terminal it no longer changes; a retry creates a new job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeJob {
    pub job_id: String,
    pub status: JobStatus,
    pub dispatched_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub processing_time_seconds: Option<f64>,
    pub error_message: Option<String>,
    #[serde(default)]
    pub troubleshooting_steps: Vec<String>,
}

impl ProbeJob {
    /// Creates a freshly dispatched job
    pub fn dispatched(job_id: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobStatus::Queued,
            dispatched_at: at,
            completed_at: None,
            processing_time_seconds: None,
            error_message: None,
            troubleshooting_steps: Vec::new(),
        }
    }

    /// Applies an observed status response
    ///
    /// Returns `false` and leaves the job untouched when it is already terminal.
    pub fn observe(&mut self, response: &StatusResponse, at: DateTime<Utc>) -> bool {
        if self.status.is_terminal() {
            return false;
        }

        self.status = response.status;

        if !response.status.is_terminal() {
            return true;
        }

        self.completed_at = Some(at);
        match response.status {
            JobStatus::Completed => {
                self.processing_time_seconds = response.processing_time;
            }
            JobStatus::Failed | JobStatus::TimedOut => {
                self.error_message = response
                    .error_message
                    .clone()
                    .or_else(|| response.message.clone());
                self.troubleshooting_steps = response.troubleshooting.clone();
            }
            _ => {}
        }

        true
    }
}
