//! Verification command handlers
//!
//! Handles dispatching, retrying, refreshing and inspecting verifications.
//! Each handler follows the coordinator's state until it settles.

use anyhow::{Result, bail};
use colored::*;
use qprobe_monitor::{TriggerOutcome, VerificationCoordinator, VerificationState};
use std::time::Duration;

use crate::output::print_state;

/// Dispatch a probe job and follow it
pub async fn verify(coordinator: &VerificationCoordinator, timeout_secs: u64) -> Result<()> {
    println!("{}", "Verifying queue worker...".bold());
    let outcome = coordinator.run_verification().await;
    settle(coordinator, outcome, timeout_secs).await
}

/// Retry the last verification as cached by the server
pub async fn retry(coordinator: &VerificationCoordinator, timeout_secs: u64) -> Result<()> {
    let last = coordinator.load_cached_status().await;
    if !last.can_retry() {
        print_state(&last);
        println!("{}", "Nothing to retry.".yellow());
        return Ok(());
    }

    println!("{}", "Retrying queue worker verification...".bold());
    let outcome = coordinator.retry().await;
    settle(coordinator, outcome, timeout_secs).await
}

/// Show the server cached status
pub async fn status(coordinator: &VerificationCoordinator, follow: bool) -> Result<()> {
    let state = coordinator.load_cached_status().await;

    if follow && matches!(state, VerificationState::Processing { .. }) {
        return settle(coordinator, TriggerOutcome::Ran(state), 120).await;
    }

    print_state(&state);
    Ok(())
}

/// Refresh the general status and follow the verification
pub async fn refresh(coordinator: &VerificationCoordinator, timeout_secs: u64) -> Result<()> {
    println!("{}", "Refreshing status...".bold());

    let report = match coordinator.refresh_all().await {
        TriggerOutcome::Ran(report) => report,
        other => return report_not_run(&other),
    };

    match &report.refresh_error {
        None => println!("  {} General status refreshed", "ok".green().bold()),
        Some(e) => println!("  {} General status refresh failed: {}", "error".red().bold(), e),
    }

    let verification = match report.verification {
        Some(state) => settle(coordinator, TriggerOutcome::Ran(state), timeout_secs).await,
        None => {
            println!("{}", "Verification skipped.".yellow());
            Ok(())
        }
    };

    if !report.success {
        bail!("General status refresh failed");
    }
    verification
}

/// Follow a triggered verification until it reaches a terminal state
async fn settle(
    coordinator: &VerificationCoordinator,
    outcome: TriggerOutcome<VerificationState>,
    timeout_secs: u64,
) -> Result<()> {
    let first = match outcome {
        TriggerOutcome::Ran(state) => state,
        other => return report_not_run(&other),
    };

    let mut rx = coordinator.subscribe();
    print_state(&first);
    let mut last = first;

    let followed = tokio::time::timeout(Duration::from_secs(timeout_secs), async {
        loop {
            let current = rx.borrow_and_update().clone();
            if current != last {
                print_state(&current);
                last = current;
            }
            if last.is_terminal() || rx.changed().await.is_err() {
                return;
            }
        }
    })
    .await;

    if followed.is_err() {
        bail!("Gave up following the verification after {}s", timeout_secs);
    }

    match coordinator.state() {
        VerificationState::Completed { .. } => Ok(()),
        state if state.can_retry() => bail!("Queue worker verification {}", state.label()),
        _ => Ok(()),
    }
}

fn report_not_run<T>(outcome: &TriggerOutcome<T>) -> Result<()> {
    match outcome {
        TriggerOutcome::Busy(kind) => println!("{}", format!("A {} is already running.", kind).yellow()),
        TriggerOutcome::Deferred => println!("{}", "Triggered too quickly; deferred.".yellow()),
        TriggerOutcome::Skipped => println!("{}", "Nothing to do.".yellow()),
        TriggerOutcome::Ran(_) => {}
    }
    Ok(())
}
