//! Colored terminal output helpers.
//!
//! All user-facing output goes through these functions so we get
//! consistent styling across every command.

use chrono::DateTime;
use comfy_table::{ContentArrangement, Table};
use console::style;
use serde::Serialize;

use crate::errors::{ChronoVaultError, Result};
use crate::ops::unlock::UnlockSummary;
use crate::ops::StatusReport;

/// Print a green success message: "check_mark {msg}"
pub fn success(msg: &str) {
    println!("{} {}", style("\u{2713}").green().bold(), msg);
}

/// Print a red error message: "x_mark {msg}"
pub fn error(msg: &str) {
    eprintln!("{} {}", style("\u{2717}").red().bold(), msg);
}

/// Print a yellow warning: "warning_sign {msg}"
pub fn warning(msg: &str) {
    eprintln!("{} {}", style("\u{26a0}").yellow().bold(), msg);
}

/// Print a blue info message: "info_sign {msg}"
pub fn info(msg: &str) {
    println!("{} {}", style("\u{2139}").blue().bold(), msg);
}

/// Print a dim tip/hint: "arrow {msg}"
pub fn tip(msg: &str) {
    println!("{} {}", style("\u{2192}").dim(), style(msg).dim());
}

pub fn warnings(list: &[String]) {
    for w in list {
        warning(w);
    }
}

/// Pretty-print `value` as JSON on stdout.
pub fn json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| ChronoVaultError::SerializationError(format!("json output: {e}")))?;
    println!("{text}");
    Ok(())
}

/// Render unix seconds as `YYYY-MM-DD HH:MM:SS UTC`.
pub fn timestamp(secs: u64) -> String {
    i64::try_from(secs)
        .ok()
        .and_then(|s| DateTime::from_timestamp(s, 0))
        .map_or_else(|| secs.to_string(), |dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
}

/// Print the status table (Name, Unlocks, Added, State).
pub fn print_status_table(report: &StatusReport) {
    match report.trusted_time {
        Some(t) => {
            let source = report.time_source.as_deref().unwrap_or("unknown");
            let stale = if report.time_is_stale { " (stale)" } else { "" };
            info(&format!("Trusted time: {} via {source}{stale}", timestamp(t)));
        }
        None => warning("No trusted time has been obtained yet; nothing is unlockable."),
    }

    if let Some(w) = &report.time_warning {
        warning(w);
    }
    for event in &report.tamper_events {
        warning(&event.to_string());
    }

    if report.files.is_empty() {
        info("No files in this vault yet.");
        tip("Run `chronovault add <FILE> --unlock-at <DATE>` to add one.");
        return;
    }

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Name", "Unlocks", "Added", "State"]);

    for f in &report.files {
        let state = if !f.tamper_events.is_empty() {
            style("tampered").red().to_string()
        } else if f.eligible {
            style("unlockable").green().to_string()
        } else {
            style("locked").yellow().to_string()
        };
        table.add_row(vec![
            f.name.clone(),
            f.unlock_timestamp.map_or_else(|| "-".into(), timestamp),
            f.added_at
                .filter(|t| *t > 0)
                .map_or_else(|| "-".into(), timestamp),
            state,
        ]);
    }

    println!("{table}");
}

/// Print the result of `unlock-all`.
pub fn print_unlock_summary(summary: &UnlockSummary) {
    warnings(&summary.warnings);

    if !summary.unlocked.is_empty() || !summary.failures.is_empty() {
        let mut table = Table::new();
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec!["Name", "Result"]);
        for u in &summary.unlocked {
            table.add_row(vec![u.name.clone(), u.output_path.display().to_string()]);
        }
        for f in &summary.failures {
            table.add_row(vec![f.name.clone(), style(&f.error).red().to_string()]);
        }
        println!("{table}");
    }

    for s in &summary.skipped {
        tip(&format!("{} stays locked until {}", s.name, timestamp(s.unlock_timestamp)));
    }

    if summary.failures.is_empty() {
        success(&summary.message);
    } else {
        warning(&summary.message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_is_utc() {
        assert_eq!(timestamp(1_700_000_000), "2023-11-14 22:13:20 UTC");
    }

    #[test]
    fn timestamp_out_of_range_falls_back_to_number() {
        assert_eq!(timestamp(u64::MAX), u64::MAX.to_string());
    }
}
