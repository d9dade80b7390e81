//! Queue Probe Monitor
//!
//! Verifies that the background queue worker of a hosting application is
//! alive by dispatching a probe job and polling its status until it settles.
//!
//! Architecture:
//! - Configuration: Load settings from environment or defaults
//! - Backoff: Poll interval per job status, exponential on transport errors
//! - Classification: Map failure messages to categories and troubleshooting
//! - Scheduler: Cancellable status polling of one probe job
//! - Services: Coordinator, operation guard and local history
//!
//! The coordinator is the entry point; presentation layers subscribe to its
//! [`VerificationState`].

pub mod backoff;
pub mod classify;
pub mod config;
pub mod scheduler;
pub mod service;
pub mod state;

pub use config::Config;
pub use service::{RefreshReport, TriggerOutcome, VerificationCoordinator};
pub use state::VerificationState;
