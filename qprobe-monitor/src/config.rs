//! Monitor configuration
//!
//! Defines all configurable parameters of the verification monitor:
//! the hosting application URL, polling and backoff tuning, debounce and
//! cache validity windows, and where the local history is kept.

use std::path::PathBuf;
use std::time::Duration;

use crate::backoff::BackoffSettings;
use crate::scheduler::PollingOptions;
use crate::service::history::DEFAULT_HISTORY_LIMIT;

/// Monitor configuration
///
/// All timeouts and intervals are configurable to allow tuning
/// for different deployment scenarios (dev vs prod, fast vs slow networks).
#[derive(Debug, Clone)]
pub struct Config {
    /// Hosting application base URL (e.g., "http://localhost:8000")
    pub base_url: String,

    /// Anti-forgery token sent with every request
    pub csrf_token: Option<String>,

    /// Bound of a single status check
    pub request_timeout: Duration,

    /// Consecutive failed status checks before polling gives up
    pub max_retries: u32,

    /// Fallback poll interval and backoff base
    pub base_interval: Duration,

    /// Backoff growth factor per consecutive error
    pub backoff_multiplier: f64,

    /// Cap of a backed-off poll interval
    pub max_interval: Duration,

    /// Window within which a repeated trigger is deferred
    pub debounce_delay: Duration,

    /// Validity window of the server-cached status
    pub cache_ttl: Duration,

    /// Directory of the local history; in-memory when unset
    pub history_path: Option<PathBuf>,

    /// Number of history entries kept
    pub history_limit: usize,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            csrf_token: None,
            request_timeout: Duration::from_millis(5_000),
            max_retries: 5,
            base_interval: Duration::from_millis(1_000),
            backoff_multiplier: 1.5,
            max_interval: Duration::from_millis(30_000),
            debounce_delay: Duration::from_millis(1_000),
            cache_ttl: Duration::from_secs(3_600),
            history_path: None,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - QPROBE_URL (required)
    /// - QPROBE_CSRF_TOKEN (optional)
    /// - QPROBE_REQUEST_TIMEOUT_MS (optional, default: 5000)
    /// - QPROBE_MAX_RETRIES (optional, default: 5)
    /// - QPROBE_BASE_INTERVAL_MS (optional, default: 1000)
    /// - QPROBE_BACKOFF_MULTIPLIER (optional, default: 1.5)
    /// - QPROBE_MAX_INTERVAL_MS (optional, default: 30000)
    /// - QPROBE_DEBOUNCE_MS (optional, default: 1000)
    /// - QPROBE_CACHE_TTL_SECS (optional, default: 3600)
    /// - QPROBE_HISTORY_PATH (optional, in-memory history when unset)
    pub fn from_env() -> anyhow::Result<Self> {
        let base_url = std::env::var("QPROBE_URL")
            .map_err(|_| anyhow::anyhow!("QPROBE_URL environment variable not set"))?;

        Ok(Self::from_env_with_base_url(base_url))
    }

    /// Reads every optional variable, taking the base URL from the caller
    pub fn from_env_with_base_url(base_url: String) -> Self {
        let defaults = Self::new(base_url);

        Self {
            csrf_token: std::env::var("QPROBE_CSRF_TOKEN").ok(),
            request_timeout: env_millis("QPROBE_REQUEST_TIMEOUT_MS")
                .unwrap_or(defaults.request_timeout),
            max_retries: env_parse("QPROBE_MAX_RETRIES").unwrap_or(defaults.max_retries),
            base_interval: env_millis("QPROBE_BASE_INTERVAL_MS").unwrap_or(defaults.base_interval),
            backoff_multiplier: env_parse("QPROBE_BACKOFF_MULTIPLIER")
                .unwrap_or(defaults.backoff_multiplier),
            max_interval: env_millis("QPROBE_MAX_INTERVAL_MS").unwrap_or(defaults.max_interval),
            debounce_delay: env_millis("QPROBE_DEBOUNCE_MS").unwrap_or(defaults.debounce_delay),
            cache_ttl: env_parse::<u64>("QPROBE_CACHE_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.cache_ttl),
            history_path: std::env::var("QPROBE_HISTORY_PATH").ok().map(PathBuf::from),
            ..defaults
        }
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.base_url.is_empty() {
            anyhow::bail!("base_url cannot be empty");
        }

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            anyhow::bail!("base_url must start with http:// or https://");
        }

        if self.request_timeout.is_zero() {
            anyhow::bail!("request_timeout must be greater than 0");
        }

        if self.max_retries == 0 {
            anyhow::bail!("max_retries must be greater than 0");
        }

        if self.base_interval.is_zero() {
            anyhow::bail!("base_interval must be greater than 0");
        }

        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            anyhow::bail!("backoff_multiplier must be at least 1.0");
        }

        if self.max_interval < self.base_interval {
            anyhow::bail!("max_interval cannot be shorter than base_interval");
        }

        if self.history_limit == 0 {
            anyhow::bail!("history_limit must be greater than 0");
        }

        Ok(())
    }

    pub fn backoff_settings(&self) -> BackoffSettings {
        BackoffSettings {
            base_interval: self.base_interval,
            multiplier: self.backoff_multiplier,
            max_interval: self.max_interval,
        }
    }

    pub fn polling_options(&self) -> PollingOptions {
        PollingOptions {
            request_timeout: self.request_timeout,
            max_retries: self.max_retries,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new("http://localhost:8000".to_string())
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse::<T>().ok())
}

fn env_millis(name: &str) -> Option<Duration> {
    env_parse::<u64>(name).map(Duration::from_millis)
}
