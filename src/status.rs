// Ledger status display: what has been republished for one identity.

use std::path::Path;

use anyhow::Result;
use colored::Colorize;

use crate::db::{Ledger, LedgerKey, LedgerStats, Outcome};

/// Print ledger totals for `key` to the terminal.
pub async fn show(ledger: &dyn Ledger, key: &LedgerKey, db_path: &Path) -> Result<()> {
    let file_size = std::fs::metadata(db_path)
        .map(|m| format_bytes(m.len()))
        .unwrap_or_else(|_| "unknown".to_string());
    println!("Ledger: {} ({})", db_path.display(), file_size);
    println!(
        "Identity: {} -> {}@{}",
        key.source_account.bold(),
        key.dest_login,
        key.dest_instance
    );

    let stats = ledger.stats(key).await?;
    print_stats(&stats);

    Ok(())
}

fn print_stats(stats: &LedgerStats) {
    if stats.total() == 0 {
        println!("Nothing recorded yet");
        return;
    }

    println!("Posts recorded: {}", stats.total());
    println!("  {:<18} {}", "posted", stats.posted.to_string().green());
    for (reason, count) in &stats.skipped {
        println!("  {:<18} {}", reason.as_str(), count.to_string().yellow());
    }
    if stats.unrecognized > 0 {
        println!(
            "  {:<18} {}",
            "unrecognized",
            stats.unrecognized.to_string().red()
        );
    }

    if let Some(latest) = &stats.latest {
        let when = latest.recorded_at.as_deref().unwrap_or("before timestamps");
        let what = match latest.outcome() {
            Some(Outcome::Posted(id)) => format!("posted as {id}"),
            Some(Outcome::Skipped(reason)) => format!("skipped ({reason})"),
            None => format!("unknown outcome {}", latest.outcome_id),
        };
        println!("Latest: post {} {} ({})", latest.post_id, what, when.dimmed());
    }
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
