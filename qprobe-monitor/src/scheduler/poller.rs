//! Status poller
//!
//! Polls the status endpoint for one probe job until the job reaches a
//! terminal status, the poll is cancelled, or too many consecutive requests
//! fail. Each tick races the request and the wait before the next tick
//! against a cancellation token, so stopping aborts the in-flight request
//! instead of merely ignoring it.

use qprobe_client::{ClientError, VerificationApi};
use qprobe_core::domain::job::JobStatus;
use qprobe_core::dto::verify::StatusResponse;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::metrics::PollingMetrics;
use crate::backoff::BackoffPolicy;
use crate::classify::{Classification, classify};

/// Something observed by the poll loop of a job
#[derive(Debug, Clone, PartialEq)]
pub struct PollEvent {
    pub job_id: String,
    pub kind: PollEventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollEventKind {
    /// A status response was decoded
    Status(StatusResponse),
    /// A status check failed and will be retried unless the budget is spent
    TransportError { message: String, retry_count: u32 },
    /// The retry budget is spent; polling has stopped
    GaveUp(Classification),
}

/// Receiver of poll events
///
/// Events are emitted while the engine holds its state lock, which is what
/// guarantees that nothing is delivered after [`PollingEngine::stop_polling`]
/// returns. Implementations must therefore not call back into the engine.
pub trait PollSink: Send + Sync {
    fn emit(&self, event: PollEvent);
}

/// Engine-wide polling settings
#[derive(Debug, Clone, PartialEq)]
pub struct PollingOptions {
    /// Bound of a single status check
    pub request_timeout: Duration,
    /// Consecutive failed checks after which polling gives up
    pub max_retries: u32,
}

impl Default for PollingOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_millis(5_000),
            max_retries: 5,
        }
    }
}

/// Per-job start parameters
#[derive(Debug, Clone, PartialEq)]
pub struct StartOptions {
    /// Wait before the first status check
    pub initial_delay: Duration,
    /// Status assumed until the first response arrives
    pub initial_status: JobStatus,
}

impl Default for StartOptions {
    fn default() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            initial_status: JobStatus::Queued,
        }
    }
}

/// Read-only snapshot of the engine state
#[derive(Debug, Clone, PartialEq)]
pub struct PollingStatus {
    pub is_polling: bool,
    pub job_id: Option<String>,
    pub retry_count: u32,
    pub consecutive_errors: u32,
    pub current_interval: Duration,
    pub last_status: Option<JobStatus>,
}

#[derive(Debug, Default)]
struct PollingState {
    /// Bumped on every start and stop; a loop only acts while it matches
    generation: u64,
    job_id: Option<String>,
    is_polling: bool,
    cancel: Option<CancellationToken>,
    retry_count: u32,
    consecutive_errors: u32,
    current_interval: Duration,
    last_status: Option<JobStatus>,
    metrics: PollingMetrics,
}

impl PollingState {
    fn finish(&mut self) {
        self.is_polling = false;
        self.job_id = None;
        self.cancel = None;
    }
}

/// Polls the status of one probe job at a time
///
/// Must be used from within a tokio runtime: starting a poll spawns the loop.
#[derive(Clone)]
pub struct PollingEngine {
    api: Arc<dyn VerificationApi>,
    policy: BackoffPolicy,
    options: PollingOptions,
    sink: Arc<dyn PollSink>,
    state: Arc<Mutex<PollingState>>,
}

impl PollingEngine {
    /// Creates an idle engine
    pub fn new(
        api: Arc<dyn VerificationApi>,
        policy: BackoffPolicy,
        options: PollingOptions,
        sink: Arc<dyn PollSink>,
    ) -> Self {
        Self {
            api,
            policy,
            options,
            sink,
            state: Arc::new(Mutex::new(PollingState::default())),
        }
    }

    /// Starts polling `job_id`, replacing any loop already running
    pub fn start_polling(&self, job_id: impl Into<String>, start: StartOptions) {
        let job_id = job_id.into();
        let token = CancellationToken::new();

        let generation = {
            let mut state = self.lock_state();
            if let Some(previous) = state.cancel.take() {
                if let Some(previous_job) = &state.job_id {
                    info!(job_id = %previous_job, "Replacing active poll loop");
                }
                previous.cancel();
            }

            state.generation += 1;
            state.job_id = Some(job_id.clone());
            state.is_polling = true;
            state.cancel = Some(token.clone());
            state.retry_count = 0;
            state.consecutive_errors = 0;
            state.current_interval = start.initial_delay;
            state.last_status = Some(start.initial_status);
            state.metrics = PollingMetrics::default();
            state.generation
        };

        info!(job_id = %job_id, "Polling started");

        let poll_loop = PollLoop {
            api: Arc::clone(&self.api),
            policy: self.policy.clone(),
            options: self.options.clone(),
            sink: Arc::clone(&self.sink),
            state: Arc::downgrade(&self.state),
            job_id,
            generation,
            token,
        };
        tokio::spawn(poll_loop.run(start.initial_delay));
    }

    /// Stops polling, aborting any in-flight request and pending wait
    ///
    /// Idempotent. No event is emitted after this returns.
    pub fn stop_polling(&self) {
        let mut state = self.lock_state();
        if let Some(token) = state.cancel.take() {
            token.cancel();
        }
        if state.is_polling {
            info!(job_id = ?state.job_id, "Polling stopped");
        }
        state.generation += 1;
        state.finish();
    }

    pub fn is_polling(&self) -> bool {
        self.lock_state().is_polling
    }

    /// Snapshot of the request metrics of the current (or last) loop
    pub fn metrics(&self) -> PollingMetrics {
        self.lock_state().metrics.clone()
    }

    /// Snapshot of the loop state
    pub fn status(&self) -> PollingStatus {
        let state = self.lock_state();
        PollingStatus {
            is_polling: state.is_polling,
            job_id: state.job_id.clone(),
            retry_count: state.retry_count,
            consecutive_errors: state.consecutive_errors,
            current_interval: state.current_interval,
            last_status: state.last_status,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, PollingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for PollingEngine {
    fn drop(&mut self) {
        // Poll loops only hold a weak reference, so this is the last handle.
        if Arc::strong_count(&self.state) == 1 {
            self.stop_polling();
        }
    }
}

enum Next {
    Wait(Duration),
    Stop,
}

/// One running poll loop
struct PollLoop {
    api: Arc<dyn VerificationApi>,
    policy: BackoffPolicy,
    options: PollingOptions,
    sink: Arc<dyn PollSink>,
    state: Weak<Mutex<PollingState>>,
    job_id: String,
    generation: u64,
    token: CancellationToken,
}

impl PollLoop {
    async fn run(self, initial_delay: Duration) {
        let mut delay = initial_delay;

        loop {
            tokio::select! {
                _ = self.token.cancelled() => return,
                _ = time::sleep(delay) => {}
            }

            debug!(job_id = %self.job_id, "Checking job status");

            let started = Instant::now();
            let outcome = tokio::select! {
                _ = self.token.cancelled() => return,
                outcome = time::timeout(
                    self.options.request_timeout,
                    self.api.fetch_status(&self.job_id),
                ) => outcome,
            };

            let next = match outcome {
                Ok(Ok(response)) => self.on_response(response, started.elapsed()),
                Ok(Err(e)) => self.on_failure(e.classification_text()),
                Err(_) => self.on_failure(ClientError::Timeout.classification_text()),
            };

            match next {
                Next::Wait(interval) => delay = interval,
                Next::Stop => return,
            }
        }
    }

    fn on_response(&self, response: StatusResponse, latency: Duration) -> Next {
        let Some(shared) = self.state.upgrade() else {
            return Next::Stop;
        };
        let mut state = shared.lock().unwrap_or_else(PoisonError::into_inner);
        if state.generation != self.generation {
            return Next::Stop;
        }

        state.retry_count = 0;
        state.consecutive_errors = 0;
        state.metrics.record_success(latency);
        state.last_status = Some(response.status);

        let status = response.status;
        let next = if status.is_terminal() {
            info!(job_id = %self.job_id, status = %status, "Job reached terminal status");
            state.finish();
            Next::Stop
        } else {
            let interval = self.policy.next_interval(Some(status), 0);
            state.current_interval = interval;
            debug!(
                job_id = %self.job_id,
                status = %status,
                next_in_ms = interval.as_millis() as u64,
                "Job still running"
            );
            Next::Wait(interval)
        };

        self.sink.emit(PollEvent {
            job_id: self.job_id.clone(),
            kind: PollEventKind::Status(response),
        });

        next
    }

    fn on_failure(&self, message: String) -> Next {
        let Some(shared) = self.state.upgrade() else {
            return Next::Stop;
        };
        let mut state = shared.lock().unwrap_or_else(PoisonError::into_inner);
        if state.generation != self.generation {
            return Next::Stop;
        }

        state.retry_count += 1;
        state.consecutive_errors += 1;
        state.metrics.record_failure();
        let retry_count = state.retry_count;

        warn!(
            job_id = %self.job_id,
            retry_count,
            max_retries = self.options.max_retries,
            error = %message,
            "Status check failed"
        );

        self.sink.emit(PollEvent {
            job_id: self.job_id.clone(),
            kind: PollEventKind::TransportError {
                message: message.clone(),
                retry_count,
            },
        });

        if retry_count >= self.options.max_retries {
            error!(
                job_id = %self.job_id,
                retry_count,
                "Giving up on status checks"
            );
            state.finish();
            self.sink.emit(PollEvent {
                job_id: self.job_id.clone(),
                kind: PollEventKind::GaveUp(classify(&message)),
            });
            return Next::Stop;
        }

        let interval = self.policy.next_interval(state.last_status, retry_count);
        state.current_interval = interval;
        Next::Wait(interval)
    }
}
