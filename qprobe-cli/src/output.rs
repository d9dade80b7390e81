//! Terminal rendering of verification states

use colored::*;
use qprobe_monitor::VerificationState;

/// Colorize a state label for display
pub fn colorize_label(label: &str) -> ColoredString {
    match label {
        "completed" => label.green(),
        "failed" => label.red(),
        "timed_out" => label.yellow(),
        "testing" | "processing" => label.cyan(),
        _ => label.dimmed(),
    }
}

/// Print a state, including troubleshooting for failures
pub fn print_state(state: &VerificationState) {
    println!("  {} {}", colorize_label(state.label()).bold(), state.message());

    if let VerificationState::Processing { job_id, .. } = state {
        println!("    Job:          {}", job_id.dimmed());
    }

    let Some(classification) = state.classification() else {
        return;
    };

    println!("    Category:     {}", classification.category.to_string().bold());
    if !classification.troubleshooting_steps.is_empty() {
        println!("    Troubleshooting:");
        for (i, step) in classification.troubleshooting_steps.iter().enumerate() {
            println!("      {}. {}", i + 1, step);
        }
    }
    if state.can_retry() {
        println!();
        println!("  Run {} to try again.", "qprobe retry".bold());
    }
}
