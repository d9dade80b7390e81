//! Error classification
//!
//! Maps the text of a verification failure to a category, a user-facing
//! message and a list of troubleshooting steps. Matching is plain keyword
//! search on the lower-cased text, so classification never fails: anything
//! unrecognized lands in [`ErrorCategory::General`].

use serde::{Deserialize, Serialize};
use std::fmt;

const DISPATCH_KEYWORDS: &[&str] = &[
    "dispatch",
    "queue connection",
    "database connection",
    "table",
    "configuration",
];

const NETWORK_KEYWORDS: &[&str] = &["network", "connection refused", "unreachable", "fetch"];

const TIMEOUT_KEYWORDS: &[&str] = &["timeout", "timed out"];

const DISPATCH_STEPS: &[&str] = &[
    "Verify the queue connection setting of the application",
    "Confirm the jobs and failed jobs tables exist",
    "Confirm the queue driver configuration",
    "Inspect the application logs for configuration errors",
    "Verify the storage and cache directories are writable",
    "Test the database connection directly",
    "If you use Redis or another broker, confirm the broker process is reachable",
];

const NETWORK_STEPS: &[&str] = &[
    "Check your network connectivity",
    "Verify the server is reachable",
    "Check firewall and proxy settings",
    "Try the verification again",
];

const TIMEOUT_STEPS: &[&str] = &[
    "Confirm the queue worker process is running",
    "Check whether the worker process is stuck or has crashed",
    "Verify the queue driver configuration",
    "Check system resources (CPU, memory, disk)",
    "Check the worker logs for errors",
    "Restart the queue worker",
    "Look for long-running jobs blocking the queue",
];

const GENERAL_STEPS: &[&str] = &[
    "Confirm the queue worker is running",
    "Verify the queue configuration",
    "Check the failed job records",
    "Review the application logs",
    "Restart the queue worker if needed",
    "Check system resources and file permissions",
];

/// Category of a verification failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    DispatchFailed,
    NetworkError,
    Timeout,
    General,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::DispatchFailed => "dispatch_failed",
            ErrorCategory::NetworkError => "network_error",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::General => "general",
        }
    }

    /// Rendering style the presentation layer should use
    pub fn status_class(&self) -> StatusClass {
        match self {
            ErrorCategory::Timeout => StatusClass::Timeout,
            _ => StatusClass::Error,
        }
    }

    fn steps(&self) -> &'static [&'static str] {
        match self {
            ErrorCategory::DispatchFailed => DISPATCH_STEPS,
            ErrorCategory::NetworkError => NETWORK_STEPS,
            ErrorCategory::Timeout => TIMEOUT_STEPS,
            ErrorCategory::General => GENERAL_STEPS,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rendering style of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusClass {
    Error,
    Timeout,
}

/// Result of classifying a failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub category: ErrorCategory,
    pub user_message: String,
    pub troubleshooting_steps: Vec<String>,
    pub status_class: StatusClass,
}

impl Classification {
    /// Replaces the built-in steps with server-provided ones, if any
    pub fn with_steps(mut self, steps: &[String]) -> Self {
        if !steps.is_empty() {
            self.troubleshooting_steps = steps.to_vec();
        }
        self
    }
}

/// Classifies a failure message
pub fn classify(message: &str) -> Classification {
    let text = message.to_lowercase();
    let contains_any = |keywords: &[&str]| keywords.iter().any(|k| text.contains(k));

    let timeout_specific = contains_any(TIMEOUT_KEYWORDS);

    let category = if contains_any(DISPATCH_KEYWORDS) {
        ErrorCategory::DispatchFailed
    } else if contains_any(NETWORK_KEYWORDS) && !timeout_specific {
        ErrorCategory::NetworkError
    } else if timeout_specific {
        ErrorCategory::Timeout
    } else {
        ErrorCategory::General
    };

    Classification {
        category,
        user_message: user_message(category, message),
        troubleshooting_steps: category.steps().iter().map(|s| s.to_string()).collect(),
        status_class: category.status_class(),
    }
}

fn user_message(category: ErrorCategory, message: &str) -> String {
    let detail = message.trim();
    let prefix = match category {
        ErrorCategory::DispatchFailed => "Failed to dispatch the test job",
        ErrorCategory::NetworkError => "Network error while checking the queue worker",
        ErrorCategory::Timeout => "The queue worker did not process the test job in time",
        ErrorCategory::General => "Queue worker verification failed",
    };

    if detail.is_empty() {
        prefix.to_string()
    } else {
        format!("{}: {}", prefix, detail)
    }
}
