//! Rendered verification state
//!
//! The value handed to the presentation layer. Transitions:
//! `NotTested -> Testing -> Processing* -> Completed | Failed | TimedOut`,
//! with `Failed` and `TimedOut` leading back to `Testing` on retry.

use chrono::{DateTime, Utc};
use qprobe_core::domain::cache::CachedStatus;
use qprobe_core::domain::job::JobStatus;
use serde::{Deserialize, Serialize};

use crate::classify::{Classification, StatusClass, classify};
use crate::service::history::HistoryEntry;

const WORKER_OK: &str = "Queue worker is functioning properly";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum VerificationState {
    NotTested,
    Testing,
    Processing {
        job_id: String,
        message: String,
    },
    Completed {
        job_id: Option<String>,
        message: String,
        processing_time: Option<f64>,
        completed_at: DateTime<Utc>,
    },
    Failed {
        job_id: Option<String>,
        classification: Classification,
        completed_at: DateTime<Utc>,
    },
    TimedOut {
        job_id: Option<String>,
        classification: Classification,
        completed_at: DateTime<Utc>,
    },
}

impl VerificationState {
    /// Successful verification
    pub fn completed(
        job_id: Option<String>,
        processing_time: Option<f64>,
        completed_at: DateTime<Utc>,
    ) -> Self {
        VerificationState::Completed {
            job_id,
            message: completed_message(processing_time),
            processing_time,
            completed_at,
        }
    }

    /// Failure rendered according to its status class
    pub fn failure(
        job_id: Option<String>,
        classification: Classification,
        completed_at: DateTime<Utc>,
    ) -> Self {
        match classification.status_class {
            StatusClass::Timeout => VerificationState::TimedOut {
                job_id,
                classification,
                completed_at,
            },
            StatusClass::Error => VerificationState::Failed {
                job_id,
                classification,
                completed_at,
            },
        }
    }

    /// Terminal job status reported by the worker side
    ///
    /// A job-level `TimedOut` is always rendered as timed out, whatever the
    /// classifier makes of its message. A cancelled job renders as failed so
    /// that it can be retried.
    pub fn from_job_failure(
        job_id: Option<String>,
        status: JobStatus,
        error: Option<&str>,
        steps: &[String],
        completed_at: DateTime<Utc>,
    ) -> Self {
        let text = error
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| match status {
                JobStatus::TimedOut => "Verification job timed out".to_string(),
                JobStatus::Cancelled => "Verification job was cancelled".to_string(),
                _ => "Verification job failed".to_string(),
            });
        let classification = classify(&text).with_steps(steps);

        match status {
            JobStatus::TimedOut => VerificationState::TimedOut {
                job_id,
                classification,
                completed_at,
            },
            _ => VerificationState::Failed {
                job_id,
                classification,
                completed_at,
            },
        }
    }

    /// Renders a fresh terminal snapshot kept by the server
    ///
    /// Returns `None` for snapshots that are not terminal.
    pub fn from_cached(cached: &CachedStatus) -> Option<Self> {
        let completed_at = cached.reference_time().unwrap_or_else(Utc::now);
        match cached.status {
            JobStatus::Completed => Some(VerificationState::completed(
                cached.job_id.clone(),
                cached.processing_time,
                completed_at,
            )),
            JobStatus::Failed | JobStatus::TimedOut | JobStatus::Cancelled => {
                let error = cached.error_message.as_deref().or(cached.message.as_deref());
                Some(VerificationState::from_job_failure(
                    cached.job_id.clone(),
                    cached.status,
                    error,
                    &cached.troubleshooting,
                    completed_at,
                ))
            }
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            VerificationState::Completed { .. }
                | VerificationState::Failed { .. }
                | VerificationState::TimedOut { .. }
        )
    }

    /// Whether the retry affordance is offered
    pub fn can_retry(&self) -> bool {
        matches!(
            self,
            VerificationState::Failed { .. } | VerificationState::TimedOut { .. }
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            VerificationState::NotTested => "not_tested",
            VerificationState::Testing => "testing",
            VerificationState::Processing { .. } => "processing",
            VerificationState::Completed { .. } => "completed",
            VerificationState::Failed { .. } => "failed",
            VerificationState::TimedOut { .. } => "timed_out",
        }
    }

    pub fn message(&self) -> String {
        match self {
            VerificationState::NotTested => "Queue worker has not been tested yet".to_string(),
            VerificationState::Testing => "Testing queue worker...".to_string(),
            VerificationState::Processing { message, .. } => message.clone(),
            VerificationState::Completed { message, .. } => message.clone(),
            VerificationState::Failed { classification, .. }
            | VerificationState::TimedOut { classification, .. } => {
                classification.user_message.clone()
            }
        }
    }

    pub fn classification(&self) -> Option<&Classification> {
        match self {
            VerificationState::Failed { classification, .. }
            | VerificationState::TimedOut { classification, .. } => Some(classification),
            _ => None,
        }
    }

    /// History entry for a terminal state
    pub fn history_entry(&self) -> Option<HistoryEntry> {
        let timestamp = match self {
            VerificationState::Completed { completed_at, .. }
            | VerificationState::Failed { completed_at, .. }
            | VerificationState::TimedOut { completed_at, .. } => *completed_at,
            _ => return None,
        };

        Some(HistoryEntry {
            status: self.label().to_string(),
            message: self.message(),
            timestamp,
        })
    }
}

fn completed_message(processing_time: Option<f64>) -> String {
    match processing_time {
        Some(seconds) => format!("{} ({:.2}s)", WORKER_OK, seconds),
        None => WORKER_OK.to_string(),
    }
}
