#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use qprobe_client::{ClientError, Result, StatusRefresher, VerificationApi};
use qprobe_core::domain::cache::CachedStatus;
use qprobe_core::domain::job::JobStatus;
use qprobe_core::dto::verify::StatusResponse;
use qprobe_monitor::backoff::{BackoffPolicy, BackoffSettings, NoJitter};
use qprobe_monitor::scheduler::{PollEvent, PollSink};
use tokio::time::Instant;

/// Scripted answer to a dispatch
pub enum DispatchStep {
    Ok(String),
    Fail(ClientError),
    Delayed(Duration, String),
    /// Never resolves; counts a drop when the request is abandoned
    Hang,
}

/// Scripted answer to a status check
pub enum StatusStep {
    Status(StatusResponse),
    Fail(ClientError),
    /// Never resolves; counts a drop when the request is abandoned
    Hang,
}

/// Scripted answer to a cached-status read
pub enum CachedStep {
    Value(Option<CachedStatus>),
    Unavailable,
}

struct DropCounter(Arc<AtomicUsize>);

impl Drop for DropCounter {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Verification API answering from scripted queues
///
/// Once a queue is exhausted, dispatch answers `job-<n>` and status checks
/// answer `processing`.
#[derive(Default)]
pub struct ScriptedApi {
    dispatch_steps: Mutex<VecDeque<DispatchStep>>,
    status_steps: Mutex<VecDeque<StatusStep>>,
    cached: Mutex<Option<CachedStep>>,
    pub dispatch_calls: AtomicUsize,
    pub status_calls: AtomicUsize,
    pub dropped_requests: Arc<AtomicUsize>,
    polls: Mutex<Vec<(String, Instant)>>,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dispatch(self, steps: impl IntoIterator<Item = DispatchStep>) -> Self {
        self.dispatch_steps.lock().unwrap().extend(steps);
        self
    }

    pub fn with_statuses(self, steps: impl IntoIterator<Item = StatusStep>) -> Self {
        self.status_steps.lock().unwrap().extend(steps);
        self
    }

    pub fn with_cached(self, step: CachedStep) -> Self {
        *self.cached.lock().unwrap() = Some(step);
        self
    }

    pub fn dispatch_count(&self) -> usize {
        self.dispatch_calls.load(Ordering::SeqCst)
    }

    pub fn status_count(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn dropped_count(&self) -> usize {
        self.dropped_requests.load(Ordering::SeqCst)
    }

    /// Job ids polled, in order
    pub fn polled_jobs(&self) -> Vec<String> {
        self.polls.lock().unwrap().iter().map(|(id, _)| id.clone()).collect()
    }

    /// Offsets of each status check from `origin`, in milliseconds
    pub fn poll_offsets(&self, origin: Instant) -> Vec<u64> {
        self.polls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, at)| at.duration_since(origin).as_millis() as u64)
            .collect()
    }
}

#[async_trait]
impl VerificationApi for ScriptedApi {
    async fn dispatch(&self) -> Result<String> {
        let n = self.dispatch_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let step = self.dispatch_steps.lock().unwrap().pop_front();
        match step {
            Some(DispatchStep::Ok(job_id)) => Ok(job_id),
            Some(DispatchStep::Fail(e)) => Err(e),
            Some(DispatchStep::Delayed(delay, job_id)) => {
                tokio::time::sleep(delay).await;
                Ok(job_id)
            }
            Some(DispatchStep::Hang) => {
                let _guard = DropCounter(Arc::clone(&self.dropped_requests));
                std::future::pending::<Result<String>>().await
            }
            None => Ok(format!("job-{n}")),
        }
    }

    async fn fetch_status(&self, job_id: &str) -> Result<StatusResponse> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.polls
            .lock()
            .unwrap()
            .push((job_id.to_string(), Instant::now()));

        let step = self.status_steps.lock().unwrap().pop_front();
        match step {
            Some(StatusStep::Status(response)) => Ok(response),
            Some(StatusStep::Fail(e)) => Err(e),
            Some(StatusStep::Hang) => {
                let _guard = DropCounter(Arc::clone(&self.dropped_requests));
                std::future::pending::<Result<StatusResponse>>().await
            }
            None => Ok(StatusResponse::with_status(JobStatus::Processing)),
        }
    }

    async fn fetch_cached_status(&self) -> Result<Option<CachedStatus>> {
        match self.cached.lock().unwrap().take() {
            Some(CachedStep::Value(cached)) => Ok(cached),
            Some(CachedStep::Unavailable) => {
                Err(ClientError::Network("connection refused".to_string()))
            }
            None => Ok(None),
        }
    }
}

/// General refresh that succeeds unless told otherwise
#[derive(Default)]
pub struct FakeRefresher {
    pub fail: AtomicBool,
    pub calls: AtomicUsize,
}

impl FakeRefresher {
    pub fn failing() -> Self {
        Self {
            fail: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl StatusRefresher for FakeRefresher {
    async fn refresh(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(ClientError::api_error(500, "Internal Server Error"));
        }
        Ok(())
    }
}

/// Sink keeping every event
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<PollEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<PollEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl PollSink for RecordingSink {
    fn emit(&self, event: PollEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub fn status(status: JobStatus) -> StatusStep {
    StatusStep::Status(StatusResponse::with_status(status))
}

pub fn completed_in(seconds: f64) -> StatusStep {
    StatusStep::Status(StatusResponse {
        processing_time: Some(seconds),
        ..StatusResponse::with_status(JobStatus::Completed)
    })
}

pub fn network_error() -> StatusStep {
    StatusStep::Fail(ClientError::Network("connection refused".to_string()))
}

/// Backoff without jitter, for exact schedules
pub fn exact_backoff() -> BackoffPolicy {
    BackoffPolicy::with_jitter(BackoffSettings::default(), Arc::new(NoJitter))
}

/// Lets spawned tasks run up to `ms` of paused time
pub async fn run_for(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}
