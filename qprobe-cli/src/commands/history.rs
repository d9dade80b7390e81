//! History command handler

use anyhow::Result;
use colored::*;
use qprobe_monitor::VerificationCoordinator;

use crate::output::colorize_label;

/// Print or clear the local history
pub fn show(coordinator: &VerificationCoordinator, clear: bool) -> Result<()> {
    if clear {
        coordinator.clear_history();
        println!("{}", "Verification history cleared.".green());
        return Ok(());
    }

    let entries = coordinator.history();
    if entries.is_empty() {
        println!("{}", "No verification history.".yellow());
        return Ok(());
    }

    println!(
        "{}",
        format!("Last {} verification(s):", entries.len()).bold()
    );
    println!();
    for entry in entries {
        println!(
            "  {} {:<10} {}",
            entry
                .timestamp
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
                .dimmed(),
            colorize_label(&entry.status),
            entry.message
        );
    }

    Ok(())
}
