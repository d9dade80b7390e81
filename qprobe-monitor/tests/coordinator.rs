mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use chrono::Utc;
use common::*;
use qprobe_client::ClientError;
use qprobe_core::domain::cache::CachedStatus;
use qprobe_core::domain::job::JobStatus;
use qprobe_core::dto::verify::StatusResponse;
use qprobe_monitor::classify::ErrorCategory;
use qprobe_monitor::scheduler::PollingOptions;
use qprobe_monitor::service::{
    CoordinatorSettings, InMemoryStore, OperationKind, TriggerOutcome, VerificationCoordinator,
};
use qprobe_monitor::VerificationState;

struct Harness {
    api: Arc<ScriptedApi>,
    refresher: Arc<FakeRefresher>,
    coordinator: VerificationCoordinator,
}

fn harness(api: ScriptedApi) -> Harness {
    harness_with(api, FakeRefresher::default(), 5)
}

fn harness_with(api: ScriptedApi, refresher: FakeRefresher, max_retries: u32) -> Harness {
    let api = Arc::new(api);
    let refresher = Arc::new(refresher);
    let settings = CoordinatorSettings {
        backoff: exact_backoff(),
        polling: PollingOptions {
            request_timeout: Duration::from_millis(5_000),
            max_retries,
        },
        ..CoordinatorSettings::default()
    };
    let coordinator = VerificationCoordinator::new(
        api.clone(),
        refresher.clone(),
        Arc::new(InMemoryStore::new()),
        settings,
    );

    Harness {
        api,
        refresher,
        coordinator,
    }
}

fn cached(status: JobStatus, age_minutes: i64) -> CachedStatus {
    let at = Utc::now() - chrono::Duration::minutes(age_minutes);
    CachedStatus {
        job_id: Some("cached-job".to_string()),
        status,
        message: None,
        dispatched_at: Some(at),
        completed_at: status.is_terminal().then_some(at),
        processing_time: status.eq(&JobStatus::Completed).then_some(2.0),
        error_message: None,
        troubleshooting: Vec::new(),
    }
}

#[tokio::test(start_paused = true)]
async fn verification_runs_to_completion() {
    let h = harness(
        ScriptedApi::new()
            .with_dispatch([DispatchStep::Ok("abc".to_string())])
            .with_statuses([
                status(JobStatus::Processing),
                network_error(),
                completed_in(1.23),
            ]),
    );
    let mut rx = h.coordinator.subscribe();

    let outcome = h.coordinator.run_verification().await;
    assert!(matches!(
        outcome,
        TriggerOutcome::Ran(VerificationState::Processing { ref job_id, .. }) if job_id == "abc"
    ));

    let state = rx.wait_for(|s| s.is_terminal()).await.unwrap().clone();
    assert_eq!(state.message(), "Queue worker is functioning properly (1.23s)");
    assert!(!state.can_retry());

    let history = h.coordinator.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, "completed");
    assert_eq!(h.coordinator.polling_metrics().failed_requests, 1);
    assert!(!h.coordinator.polling_status().is_polling);
}

#[tokio::test(start_paused = true)]
async fn second_trigger_within_debounce_fires_once() {
    let h = harness(ScriptedApi::new());

    assert!(matches!(
        h.coordinator.run_verification().await,
        TriggerOutcome::Ran(_)
    ));
    run_for(500).await;
    assert!(matches!(
        h.coordinator.run_verification().await,
        TriggerOutcome::Deferred
    ));
    assert!(matches!(
        h.coordinator.run_verification().await,
        TriggerOutcome::Deferred
    ));
    assert_eq!(h.api.dispatch_count(), 1);

    run_for(1_100).await;
    assert_eq!(h.api.dispatch_count(), 2);

    run_for(5_000).await;
    assert_eq!(h.api.dispatch_count(), 2);
    assert_eq!(h.coordinator.polling_status().job_id.as_deref(), Some("job-2"));
}

#[tokio::test(start_paused = true)]
async fn triggers_during_dispatch_are_dropped() {
    let h = harness(ScriptedApi::new().with_dispatch([DispatchStep::Delayed(
        Duration::from_millis(2_000),
        "slow".to_string(),
    )]));

    let running = tokio::spawn({
        let coordinator = h.coordinator.clone();
        async move { coordinator.run_verification().await }
    });
    run_for(10).await;
    assert_eq!(h.coordinator.state(), VerificationState::Testing);

    assert_eq!(
        h.coordinator.run_verification().await,
        TriggerOutcome::Busy(OperationKind::Verification)
    );
    assert_eq!(
        h.coordinator.refresh_all().await,
        TriggerOutcome::Busy(OperationKind::Verification)
    );

    assert!(running.await.unwrap().ran().is_some());
    assert_eq!(h.api.dispatch_count(), 1);
    assert_eq!(h.refresher.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn refresh_succeeds_when_verification_fails() {
    let h = harness(ScriptedApi::new().with_dispatch([DispatchStep::Fail(
        ClientError::Dispatch("Queue connection could not be established".to_string()),
    )]));

    let report = h.coordinator.refresh_all().await.ran().unwrap();
    assert!(report.success);
    assert!(report.refresh_error.is_none());

    let verification = report.verification.unwrap();
    assert_eq!(verification.label(), "failed");
    assert_eq!(
        verification.classification().unwrap().category,
        ErrorCategory::DispatchFailed
    );
    assert_eq!(h.refresher.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn refresh_failure_is_reported_apart_from_verification() {
    let h = harness_with(ScriptedApi::new(), FakeRefresher::failing(), 5);

    let report = h.coordinator.refresh_all().await.ran().unwrap();
    assert!(!report.success);
    assert!(report.refresh_error.unwrap().contains("500"));
    assert!(matches!(
        report.verification,
        Some(VerificationState::Processing { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn dispatch_errors_are_classified() {
    let h = harness(ScriptedApi::new().with_dispatch([
        DispatchStep::Fail(ClientError::Network("connection refused".to_string())),
        DispatchStep::Fail(ClientError::Timeout),
    ]));

    let first = h.coordinator.run_verification().await.ran().unwrap();
    assert_eq!(first.label(), "failed");
    assert_eq!(
        first.classification().unwrap().category,
        ErrorCategory::NetworkError
    );
    assert!(!h.coordinator.polling_status().is_polling);

    run_for(1_100).await;
    let second = h.coordinator.retry().await.ran().unwrap();
    assert_eq!(second.label(), "timed_out");
    assert!(second.can_retry());
    assert_eq!(h.coordinator.history().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn retry_is_offered_only_after_failure() {
    let h = harness(ScriptedApi::new().with_dispatch([DispatchStep::Fail(
        ClientError::Dispatch("worker refused the job".to_string()),
    )]));

    assert_eq!(h.coordinator.retry().await, TriggerOutcome::Skipped);
    assert_eq!(h.api.dispatch_count(), 0);

    h.coordinator.run_verification().await;
    assert!(h.coordinator.state().can_retry());

    run_for(1_100).await;
    assert!(matches!(
        h.coordinator.retry().await,
        TriggerOutcome::Ran(VerificationState::Processing { .. })
    ));
    assert_eq!(h.api.dispatch_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn job_failure_keeps_server_troubleshooting() {
    let h = harness(ScriptedApi::new().with_statuses([StatusStep::Status(StatusResponse {
        error_message: Some("Worker crashed while handling the job".to_string()),
        troubleshooting: vec!["Restart the worker".to_string()],
        ..StatusResponse::with_status(JobStatus::Failed)
    })]));

    h.coordinator.run_verification().await;
    run_for(100).await;

    let state = h.coordinator.state();
    assert_eq!(state.label(), "failed");
    assert_eq!(
        state.classification().unwrap().troubleshooting_steps,
        vec!["Restart the worker".to_string()]
    );
    assert_eq!(h.coordinator.history()[0].status, "failed");
}

#[tokio::test(start_paused = true)]
async fn job_timeout_and_cancellation_render_as_retryable() {
    let h = harness(ScriptedApi::new().with_statuses([
        status(JobStatus::TimedOut),
        status(JobStatus::Cancelled),
    ]));

    h.coordinator.run_verification().await;
    run_for(100).await;
    assert_eq!(h.coordinator.state().label(), "timed_out");

    run_for(1_000).await;
    h.coordinator.retry().await;
    run_for(100).await;
    assert_eq!(h.coordinator.state().label(), "failed");
    assert!(h.coordinator.state().can_retry());
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_render_classified_failure() {
    let h = harness_with(
        ScriptedApi::new().with_statuses([network_error(), network_error()]),
        FakeRefresher::default(),
        2,
    );

    h.coordinator.run_verification().await;
    run_for(10_000).await;

    let state = h.coordinator.state();
    assert_eq!(state.label(), "failed");
    assert_eq!(
        state.classification().unwrap().category,
        ErrorCategory::NetworkError
    );
    assert_eq!(h.api.status_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn expired_cache_renders_not_tested() {
    let h = harness(
        ScriptedApi::new().with_cached(CachedStep::Value(Some(cached(JobStatus::Completed, 61)))),
    );

    let state = h.coordinator.load_cached_status().await;
    assert_eq!(state, VerificationState::NotTested);
    assert_eq!(h.api.status_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn fresh_terminal_cache_is_rendered_without_polling() {
    let h = harness(
        ScriptedApi::new().with_cached(CachedStep::Value(Some(cached(JobStatus::Completed, 59)))),
    );

    let state = h.coordinator.load_cached_status().await;
    assert_eq!(state.label(), "completed");
    assert_eq!(state.message(), "Queue worker is functioning properly (2.00s)");
    assert_eq!(h.coordinator.state(), state);

    run_for(5_000).await;
    assert_eq!(h.api.status_count(), 0);
    assert!(h.coordinator.history().is_empty());
}

#[tokio::test(start_paused = true)]
async fn unavailable_or_empty_cache_renders_not_tested() {
    let unavailable = harness(ScriptedApi::new().with_cached(CachedStep::Unavailable));
    assert_eq!(
        unavailable.coordinator.load_cached_status().await,
        VerificationState::NotTested
    );

    let empty = harness(ScriptedApi::new().with_cached(CachedStep::Value(None)));
    assert_eq!(
        empty.coordinator.load_cached_status().await,
        VerificationState::NotTested
    );

    let never_run = harness(
        ScriptedApi::new().with_cached(CachedStep::Value(Some(cached(JobStatus::NotTested, 1)))),
    );
    assert_eq!(
        never_run.coordinator.load_cached_status().await,
        VerificationState::NotTested
    );
}

#[tokio::test(start_paused = true)]
async fn fresh_active_cache_resumes_polling() {
    let h = harness(
        ScriptedApi::new()
            .with_cached(CachedStep::Value(Some(cached(JobStatus::Processing, 1))))
            .with_statuses([completed_in(0.4)]),
    );

    let state = h.coordinator.load_cached_status().await;
    assert!(matches!(
        state,
        VerificationState::Processing { ref job_id, .. } if job_id == "cached-job"
    ));

    run_for(100).await;
    assert_eq!(h.api.polled_jobs(), vec!["cached-job".to_string()]);
    assert_eq!(h.coordinator.state().label(), "completed");
    assert_eq!(h.api.dispatch_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_deferred_trigger() {
    let h = harness(ScriptedApi::new());

    h.coordinator.run_verification().await;
    run_for(200).await;
    assert_eq!(
        h.coordinator.run_verification().await,
        TriggerOutcome::Deferred
    );

    h.coordinator.shutdown();
    run_for(5_000).await;

    assert_eq!(h.api.dispatch_count(), 1);
    assert!(!h.coordinator.polling_status().is_polling);
}

#[tokio::test(start_paused = true)]
async fn unanswered_dispatch_times_out_and_releases_the_lock() {
    let h = harness(ScriptedApi::new().with_dispatch([DispatchStep::Hang]));

    let state = h.coordinator.run_verification().await.ran().unwrap();
    assert_eq!(state.label(), "timed_out");
    assert_eq!(
        state.classification().unwrap().category,
        ErrorCategory::Timeout
    );
    assert_eq!(h.api.dropped_count(), 1);

    run_for(1_100).await;
    assert!(matches!(
        h.coordinator.run_verification().await,
        TriggerOutcome::Ran(VerificationState::Processing { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn unanswered_dispatch_does_not_block_refresh() {
    let h = harness(ScriptedApi::new().with_dispatch([DispatchStep::Hang]));

    let report = h.coordinator.refresh_all().await.ran().unwrap();
    assert!(report.success);
    assert_eq!(report.verification.unwrap().label(), "timed_out");

    run_for(1_100).await;
    assert!(matches!(
        h.coordinator.refresh_all().await,
        TriggerOutcome::Ran(_)
    ));
}
