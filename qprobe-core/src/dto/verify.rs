//! Verification endpoint DTOs

use serde::{Deserialize, Serialize};

use crate::domain::job::JobStatus;

/// Response of `POST /verify/dispatch`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchResponse {
    pub success: bool,
    #[serde(default, alias = "jobId")]
    pub job_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Response of `GET /verify/status?job_id=...`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: JobStatus,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub processing_time: Option<f64>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub troubleshooting: Vec<String>,
}

impl StatusResponse {
    /// Creates a bare response carrying only a status
    pub fn with_status(status: JobStatus) -> Self {
        Self {
            status,
            message: None,
            processing_time: None,
            error_message: None,
            troubleshooting: Vec::new(),
        }
    }
}
