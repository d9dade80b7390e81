//! Poll interval policy
//!
//! Computes how long the polling engine waits before the next status check.
//! Healthy polls use a fixed interval per job status; polls recovering from a
//! transport error back off exponentially with a small random jitter so that
//! several open sessions do not hammer the server in lockstep.

use qprobe_core::domain::job::JobStatus;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

/// Interval for statuses whose job is actively moving
pub const ACTIVE_INTERVAL: Duration = Duration::from_millis(1_000);
/// Interval after a successful verification
pub const COMPLETED_INTERVAL: Duration = Duration::from_millis(30_000);
/// Interval after a failed verification
pub const FAILED_INTERVAL: Duration = Duration::from_millis(5_000);
/// Interval after a timed out verification
pub const TIMED_OUT_INTERVAL: Duration = Duration::from_millis(10_000);
/// Interval when nothing is known about the worker
pub const NOT_TESTED_INTERVAL: Duration = Duration::from_millis(60_000);

/// Upper bound of the jitter, as a fraction of the computed interval
pub const MAX_JITTER_RATIO: f64 = 0.1;

/// Source of the random offset added to backed-off intervals
pub trait Jitter: Send + Sync {
    /// Returns a non-negative offset in milliseconds for `interval_ms`
    fn offset(&self, interval_ms: f64) -> f64;
}

/// Uniform jitter in `[0, ratio * interval]`
#[derive(Debug, Clone, Copy)]
pub struct RandomJitter {
    pub ratio: f64,
}

impl Default for RandomJitter {
    fn default() -> Self {
        Self {
            ratio: MAX_JITTER_RATIO,
        }
    }
}

impl Jitter for RandomJitter {
    fn offset(&self, interval_ms: f64) -> f64 {
        let mut rng = rand::rng();
        rng.random::<f64>() * interval_ms * self.ratio
    }
}

/// Jitter that never offsets, for deterministic schedules
#[derive(Debug, Clone, Copy, Default)]
pub struct NoJitter;

impl Jitter for NoJitter {
    fn offset(&self, _interval_ms: f64) -> f64 {
        0.0
    }
}

/// Tunable parameters of the backoff policy
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffSettings {
    /// Interval for statuses without a dedicated entry, and the fallback base
    pub base_interval: Duration,
    /// Growth factor applied per consecutive error
    pub multiplier: f64,
    /// Cap of a backed-off interval
    pub max_interval: Duration,
}

impl Default for BackoffSettings {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_millis(1_000),
            multiplier: 1.5,
            max_interval: Duration::from_millis(30_000),
        }
    }
}

/// Computes the delay before the next poll
#[derive(Clone)]
pub struct BackoffPolicy {
    settings: BackoffSettings,
    jitter: Arc<dyn Jitter>,
}

impl BackoffPolicy {
    /// Creates a policy with random jitter
    pub fn new(settings: BackoffSettings) -> Self {
        Self::with_jitter(settings, Arc::new(RandomJitter::default()))
    }

    /// Creates a policy with a custom jitter source
    pub fn with_jitter(settings: BackoffSettings, jitter: Arc<dyn Jitter>) -> Self {
        Self { settings, jitter }
    }

    pub fn settings(&self) -> &BackoffSettings {
        &self.settings
    }

    /// Healthy interval for a status
    ///
    /// `None` means nothing is known yet and is treated like `NotTested`.
    pub fn base_interval(&self, status: Option<JobStatus>) -> Duration {
        match status {
            Some(JobStatus::Processing) | Some(JobStatus::Queued) => ACTIVE_INTERVAL,
            Some(JobStatus::Completed) => COMPLETED_INTERVAL,
            Some(JobStatus::Failed) => FAILED_INTERVAL,
            Some(JobStatus::TimedOut) => TIMED_OUT_INTERVAL,
            Some(JobStatus::NotTested) | None => NOT_TESTED_INTERVAL,
            Some(JobStatus::Pending)
            | Some(JobStatus::Cancelled)
            | Some(JobStatus::Unrecognized) => self.settings.base_interval,
        }
    }

    /// Delay before the next poll
    ///
    /// # Arguments
    /// * `status` - Last status decoded for the job, if any
    /// * `retry_count` - Consecutive failed requests since the last success
    pub fn next_interval(&self, status: Option<JobStatus>, retry_count: u32) -> Duration {
        let base = self.base_interval(status);
        if retry_count == 0 {
            return base;
        }

        let base_ms = base.as_millis() as f64;
        let exponent = i32::try_from(retry_count).unwrap_or(i32::MAX);
        let computed = base_ms * self.settings.multiplier.powi(exponent);
        let jitter = self
            .jitter
            .offset(computed)
            .clamp(0.0, computed * MAX_JITTER_RATIO);

        // The cap never undercuts the healthy interval of the status.
        let cap = self.settings.max_interval.max(base).as_millis() as f64;
        let interval = (computed + jitter).min(cap);

        Duration::from_millis(interval.round() as u64)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(BackoffSettings::default())
    }
}

impl std::fmt::Debug for BackoffPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackoffPolicy")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
