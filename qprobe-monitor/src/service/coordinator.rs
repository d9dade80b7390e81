//! Verification coordinator
//!
//! Top-level orchestration of a queue worker verification: dispatches the
//! probe job, owns the polling engine, applies the single-flight and debounce
//! rules of [`OperationLock`] to user triggers, bootstraps from the server
//! cached status and publishes a [`VerificationState`] to subscribers.

use anyhow::Context;
use chrono::Utc;
use qprobe_client::{ClientError, StatusRefresher, VerificationApi, VerifyClient};
use qprobe_core::domain::cache::{CachedStatus, default_cache_ttl};
use qprobe_core::domain::job::{JobStatus, ProbeJob};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time;
use tracing::{debug, info, warn};

use super::guard::{Admission, OperationKind, OperationLock, OperationPermit};
use super::history::{
    DEFAULT_HISTORY_LIMIT, FileStore, HistoryEntry, InMemoryStore, KeyValueStore,
    VerificationHistory,
};
use crate::backoff::BackoffPolicy;
use crate::classify::classify;
use crate::config::Config;
use crate::scheduler::{
    PollEvent, PollEventKind, PollSink, PollingEngine, PollingMetrics, PollingOptions,
    PollingStatus, StartOptions,
};
use crate::state::VerificationState;

const DISPATCHED_MESSAGE: &str = "Verification job dispatched, waiting for a worker...";
const QUEUED_MESSAGE: &str = "Job is queued, waiting for a worker...";
const PROCESSING_MESSAGE: &str = "Job is being processed by the queue worker...";

/// Result of a user trigger
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerOutcome<T> {
    /// The operation ran
    Ran(T),
    /// Fired within the debounce window; a single deferred call is armed
    Deferred,
    /// Dropped because an operation of this kind was in progress
    Busy(OperationKind),
    /// Not applicable in the current state
    Skipped,
}

impl<T> TriggerOutcome<T> {
    pub fn ran(self) -> Option<T> {
        match self {
            TriggerOutcome::Ran(value) => Some(value),
            _ => None,
        }
    }
}

/// Outcome of [`VerificationCoordinator::refresh_all`]
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshReport {
    /// Follows the general refresh alone
    pub success: bool,
    pub refresh_error: Option<String>,
    /// State right after the verification dispatch, if it ran
    pub verification: Option<VerificationState>,
}

/// Tuning of a coordinator
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub backoff: BackoffPolicy,
    pub polling: PollingOptions,
    pub debounce_delay: Duration,
    pub cache_ttl: Duration,
    pub history_limit: usize,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            backoff: BackoffPolicy::default(),
            polling: PollingOptions::default(),
            debounce_delay: Duration::from_millis(1_000),
            cache_ttl: Duration::from_secs(3_600),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl From<&Config> for CoordinatorSettings {
    fn from(config: &Config) -> Self {
        Self {
            backoff: BackoffPolicy::new(config.backoff_settings()),
            polling: config.polling_options(),
            debounce_delay: config.debounce_delay,
            cache_ttl: config.cache_ttl,
            history_limit: config.history_limit,
        }
    }
}

/// Published state, current job and history
///
/// Doubles as the poll sink of the engine. Its lock is taken while the engine
/// holds its own, so it never calls back into the engine.
struct ViewState {
    tx: watch::Sender<VerificationState>,
    job: Mutex<Option<ProbeJob>>,
    history: VerificationHistory,
}

impl ViewState {
    fn lock_job(&self) -> MutexGuard<'_, Option<ProbeJob>> {
        self.job.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: VerificationState) {
        debug!(state = state.label(), "Verification state changed");
        self.tx.send_replace(state);
    }

    /// Publishes a terminal state and appends it to the history
    fn settle(&self, state: VerificationState) {
        if let Some(entry) = state.history_entry() {
            self.history.record(entry);
        }
        self.publish(state);
    }

    fn begin(&self, job: ProbeJob, message: String) {
        let job_id = job.job_id.clone();
        *self.lock_job() = Some(job);
        self.publish(VerificationState::Processing { job_id, message });
    }

    fn clear_job(&self) {
        *self.lock_job() = None;
    }
}

impl PollSink for ViewState {
    fn emit(&self, event: PollEvent) {
        if let Some(terminal) = self.apply(event) {
            self.settle(terminal);
        }
    }
}

impl ViewState {
    /// Applies an event to the current job
    ///
    /// Progress is published directly; a terminal state is returned so that
    /// it is settled once the job lock is released.
    fn apply(&self, event: PollEvent) -> Option<VerificationState> {
        let mut current = self.lock_job();
        let Some(job) = current.as_mut().filter(|job| job.job_id == event.job_id) else {
            debug!(job_id = %event.job_id, "Ignoring event of a superseded job");
            return None;
        };

        match event.kind {
            PollEventKind::Status(response) => {
                let now = Utc::now();
                if !job.observe(&response, now) {
                    return None;
                }

                let job_id = Some(job.job_id.clone());
                let completed_at = job.completed_at.unwrap_or(now);
                match response.status {
                    JobStatus::Completed => {
                        info!(job_id = %job.job_id, "Queue worker verified");
                        Some(VerificationState::completed(
                            job_id,
                            job.processing_time_seconds,
                            completed_at,
                        ))
                    }
                    status if status.is_terminal() => {
                        let error = response
                            .error_message
                            .as_deref()
                            .or(response.message.as_deref());
                        warn!(job_id = %job.job_id, status = %status, "Verification job ended unsuccessfully");
                        Some(VerificationState::from_job_failure(
                            job_id,
                            status,
                            error,
                            &response.troubleshooting,
                            completed_at,
                        ))
                    }
                    status => {
                        let message = response
                            .message
                            .clone()
                            .filter(|m| !m.trim().is_empty())
                            .unwrap_or_else(|| active_message(status).to_string());
                        self.publish(VerificationState::Processing {
                            job_id: job.job_id.clone(),
                            message,
                        });
                        None
                    }
                }
            }
            PollEventKind::TransportError {
                message,
                retry_count,
            } => {
                debug!(job_id = %job.job_id, retry_count, error = %message, "Status check will be retried");
                None
            }
            PollEventKind::GaveUp(classification) => Some(VerificationState::failure(
                Some(job.job_id.clone()),
                classification,
                Utc::now(),
            )),
        }
    }
}

fn active_message(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Pending | JobStatus::Queued => QUEUED_MESSAGE,
        _ => PROCESSING_MESSAGE,
    }
}

struct Inner {
    api: Arc<dyn VerificationApi>,
    refresher: Arc<dyn StatusRefresher>,
    engine: PollingEngine,
    gate: OperationLock,
    view: Arc<ViewState>,
    cache_ttl: chrono::Duration,
    /// Bound of a dispatch or general refresh
    request_timeout: Duration,
}

/// Orchestrates queue worker verifications
///
/// Cheap to clone; all clones share the same state. Must be used from within
/// a tokio runtime.
#[derive(Clone)]
pub struct VerificationCoordinator {
    inner: Arc<Inner>,
}

impl VerificationCoordinator {
    /// Creates a coordinator in the `NotTested` state
    pub fn new(
        api: Arc<dyn VerificationApi>,
        refresher: Arc<dyn StatusRefresher>,
        store: Arc<dyn KeyValueStore>,
        settings: CoordinatorSettings,
    ) -> Self {
        let (tx, _) = watch::channel(VerificationState::NotTested);
        let view = Arc::new(ViewState {
            tx,
            job: Mutex::new(None),
            history: VerificationHistory::new(store, settings.history_limit),
        });

        let sink: Arc<dyn PollSink> = view.clone();
        let engine = PollingEngine::new(
            Arc::clone(&api),
            settings.backoff,
            settings.polling.clone(),
            sink,
        );

        let request_timeout = settings.polling.request_timeout;
        let cache_ttl =
            chrono::Duration::from_std(settings.cache_ttl).unwrap_or_else(|_| default_cache_ttl());

        Self {
            inner: Arc::new(Inner {
                api,
                refresher,
                engine,
                gate: OperationLock::new(settings.debounce_delay),
                view,
                cache_ttl,
                request_timeout,
            }),
        }
    }

    /// Wires an HTTP client and history store from the configuration
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let client = VerifyClient::with_timeout(config.base_url.clone(), config.request_timeout)
            .context("Failed to build HTTP client")?
            .with_csrf_token(config.csrf_token.clone());
        let client = Arc::new(client);
        let store: Arc<dyn KeyValueStore> = match &config.history_path {
            Some(path) => Arc::new(FileStore::new(path.clone())),
            None => Arc::new(InMemoryStore::new()),
        };

        Ok(Self::new(
            client.clone(),
            client,
            store,
            CoordinatorSettings::from(config),
        ))
    }

    /// Dispatches a probe job and starts polling it
    ///
    /// Returns the state reached once the dispatch has resolved; follow
    /// [`subscribe`](Self::subscribe) for the rest of the run.
    pub async fn run_verification(&self) -> TriggerOutcome<VerificationState> {
        match self.inner.gate.admit(OperationKind::Verification) {
            Admission::Run(permit) => TriggerOutcome::Ran(self.verify_with(permit).await),
            Admission::Defer => {
                self.defer(OperationKind::Verification);
                TriggerOutcome::Deferred
            }
            Admission::Busy(kind) => {
                warn!(blocked_by = %kind, "Verification trigger dropped: {} in progress", kind);
                TriggerOutcome::Busy(kind)
            }
        }
    }

    /// Refreshes the general status and runs a verification in parallel
    pub async fn refresh_all(&self) -> TriggerOutcome<RefreshReport> {
        match self.inner.gate.admit(OperationKind::Refresh) {
            Admission::Run(permit) => TriggerOutcome::Ran(self.refresh_with(permit).await),
            Admission::Defer => {
                self.defer(OperationKind::Refresh);
                TriggerOutcome::Deferred
            }
            Admission::Busy(kind) => {
                warn!(blocked_by = %kind, "Refresh trigger dropped: {} in progress", kind);
                TriggerOutcome::Busy(kind)
            }
        }
    }

    /// Runs a new verification after a failure or timeout
    pub async fn retry(&self) -> TriggerOutcome<VerificationState> {
        let current = self.state();
        if !current.can_retry() {
            info!(state = current.label(), "Nothing to retry");
            return TriggerOutcome::Skipped;
        }

        self.run_verification().await
    }

    /// Initializes the state from the server cached status
    pub async fn load_cached_status(&self) -> VerificationState {
        if self.inner.engine.is_polling() {
            debug!("Polling in progress, keeping current state");
            return self.state();
        }

        let cached = match self.inner.api.fetch_cached_status().await {
            Ok(cached) => cached,
            Err(e) => {
                warn!(error = %e, "Cached status unavailable");
                None
            }
        };

        let state = match cached {
            Some(cached) => self.adopt_cached(cached),
            None => VerificationState::NotTested,
        };

        if !matches!(state, VerificationState::Processing { .. }) {
            self.inner.view.publish(state.clone());
        }
        state
    }

    fn adopt_cached(&self, cached: CachedStatus) -> VerificationState {
        let now = Utc::now();

        if matches!(cached.status, JobStatus::NotTested | JobStatus::Unrecognized) {
            return VerificationState::NotTested;
        }

        if cached.is_expired(now, self.inner.cache_ttl) {
            info!(status = %cached.status, "Cached status expired");
            return VerificationState::NotTested;
        }

        if let Some(state) = VerificationState::from_cached(&cached) {
            info!(status = %cached.status, "Restored cached verification result");
            return state;
        }

        let Some(job_id) = cached.job_id.clone() else {
            return VerificationState::NotTested;
        };

        info!(job_id = %job_id, status = %cached.status, "Resuming polling of cached job");
        let message = cached
            .message
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| active_message(cached.status).to_string());
        let job = ProbeJob {
            status: cached.status,
            ..ProbeJob::dispatched(job_id.clone(), cached.dispatched_at.unwrap_or(now))
        };

        self.inner.view.begin(job, message.clone());
        self.inner.engine.start_polling(
            job_id.clone(),
            StartOptions {
                initial_delay: Duration::ZERO,
                initial_status: cached.status,
            },
        );

        VerificationState::Processing { job_id, message }
    }

    /// Snapshot of the current state
    pub fn state(&self) -> VerificationState {
        self.inner.view.tx.borrow().clone()
    }

    /// Receiver notified on every state change
    pub fn subscribe(&self) -> watch::Receiver<VerificationState> {
        self.inner.view.tx.subscribe()
    }

    /// Past results, newest first
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.inner.view.history.entries()
    }

    pub fn clear_history(&self) {
        self.inner.view.history.clear();
    }

    pub fn polling_status(&self) -> PollingStatus {
        self.inner.engine.status()
    }

    pub fn polling_metrics(&self) -> PollingMetrics {
        self.inner.engine.metrics()
    }

    /// Cancels deferred triggers and stops polling
    pub fn shutdown(&self) {
        self.inner.gate.cancel_deferred();
        self.inner.engine.stop_polling();
        info!("Verification coordinator shut down");
    }

    async fn verify_with(&self, permit: OperationPermit) -> VerificationState {
        let _permit = permit;
        let view = &self.inner.view;

        self.inner.engine.stop_polling();
        view.clear_job();
        view.publish(VerificationState::Testing);

        let dispatched = time::timeout(self.inner.request_timeout, self.inner.api.dispatch())
            .await
            .unwrap_or_else(|_| Err(ClientError::Timeout));

        match dispatched {
            Ok(job_id) => {
                info!(job_id = %job_id, "Verification job dispatched");
                view.begin(
                    ProbeJob::dispatched(job_id.clone(), Utc::now()),
                    DISPATCHED_MESSAGE.to_string(),
                );
                self.inner
                    .engine
                    .start_polling(job_id, StartOptions::default());
            }
            Err(e) => {
                let classification = classify(&e.classification_text());
                warn!(
                    error = %e,
                    category = %classification.category,
                    "Verification dispatch failed"
                );
                view.settle(VerificationState::failure(None, classification, Utc::now()));
            }
        }

        self.state()
    }

    async fn refresh_with(&self, permit: OperationPermit) -> RefreshReport {
        let _permit = permit;

        let verification = async {
            match self.inner.gate.try_acquire_nested(OperationKind::Verification) {
                Ok(nested) => Some(self.verify_with(nested).await),
                Err(kind) => {
                    warn!(blocked_by = %kind, "Skipping verification: {} in progress", kind);
                    None
                }
            }
        };

        let refresh = async {
            time::timeout(self.inner.request_timeout, self.inner.refresher.refresh())
                .await
                .unwrap_or_else(|_| Err(ClientError::Timeout))
        };

        let (refreshed, verification) = tokio::join!(refresh, verification);

        let refresh_error = refreshed.err().map(|e| {
            warn!(error = %e, "General status refresh failed");
            e.to_string()
        });

        RefreshReport {
            success: refresh_error.is_none(),
            refresh_error,
            verification,
        }
    }

    /// Arms the single deferred call of `kind`
    fn defer(&self, kind: OperationKind) {
        let call = self.inner.gate.arm_deferred(kind);
        let delay = self.inner.gate.debounce();
        let inner: Weak<Inner> = Arc::downgrade(&self.inner);

        debug!(operation = %kind, delay_ms = delay.as_millis() as u64, "Trigger deferred");

        tokio::spawn(async move {
            tokio::select! {
                _ = call.token.cancelled() => return,
                _ = time::sleep(delay) => {}
            }

            let Some(inner) = inner.upgrade() else {
                return;
            };
            VerificationCoordinator { inner }
                .fire_deferred(kind, call.id)
                .await;
        });
    }

    async fn fire_deferred(&self, kind: OperationKind, id: u64) {
        self.inner.gate.disarm(kind, id);

        let permit = match self.inner.gate.try_acquire(kind) {
            Ok(permit) => permit,
            Err(blocker) => {
                warn!(operation = %kind, blocked_by = %blocker, "Deferred trigger dropped");
                return;
            }
        };

        debug!(operation = %kind, "Running deferred trigger");
        match kind {
            OperationKind::Verification => {
                self.verify_with(permit).await;
            }
            OperationKind::Refresh => {
                self.refresh_with(permit).await;
            }
        }
    }
}
