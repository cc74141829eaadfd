//! `chronovault audit` — display the audit log.
//!
//! Usage:
//!   chronovault audit               # show last 50 entries
//!   chronovault audit --last 20     # show last 20
//!   chronovault audit --since 7d    # entries from last 7 days

use chrono::Utc;

use crate::audit::{AuditEntry, AuditLog};
use crate::cli::output;
use crate::cli::{context, Cli};
use crate::errors::{ChronoVaultError, Result};
use crate::vault::VaultStore;

/// Execute the `audit` command.
pub fn execute(cli: &Cli, last: usize, since: Option<&str>) -> Result<()> {
    let (_engine, dir) = context(cli)?;
    VaultStore::load(&dir)?;

    let audit = AuditLog::open(&dir)
        .ok_or_else(|| ChronoVaultError::AuditError("failed to open audit database".into()))?;

    let since_dt = since.map(parse_duration).transpose()?;
    let entries = audit.query(last, since_dt)?;

    if cli.json {
        return output::json(&entries);
    }
    if entries.is_empty() {
        output::info("No audit entries found.");
        return Ok(());
    }

    print_audit_table(&entries);
    Ok(())
}

/// Parse a human-friendly duration string like "7d", "24h", "30m".
fn parse_duration(input: &str) -> Result<chrono::DateTime<Utc>> {
    let input = input.trim();
    let invalid = |why: &str| {
        ChronoVaultError::CommandFailed(format!("invalid duration '{input}': {why}, use 7d, 24h or 30m"))
    };

    let (num_str, duration): (&str, fn(i64) -> chrono::Duration) =
        if let Some(s) = input.strip_suffix('d') {
            (s, chrono::Duration::days)
        } else if let Some(s) = input.strip_suffix('h') {
            (s, chrono::Duration::hours)
        } else if let Some(s) = input.strip_suffix('m') {
            (s, chrono::Duration::minutes)
        } else {
            return Err(invalid("unknown unit"));
        };

    let num: i64 = num_str.parse().map_err(|_| invalid("number part is not valid"))?;
    Ok(Utc::now() - duration(num))
}

/// Print audit entries in a formatted table.
pub fn print_audit_table(entries: &[AuditEntry]) {
    use comfy_table::{ContentArrangement, Table};
    use console::style;

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Time", "Operation", "File", "Outcome", "Details"]);

    for entry in entries {
        table.add_row(vec![
            entry.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            colorize_operation(&entry.operation),
            entry.file_name.clone().unwrap_or_else(|| "-".into()),
            colorize_outcome(&entry.outcome),
            entry.details.clone().unwrap_or_else(|| "-".into()),
        ]);
    }

    println!("{}", style(format!("{} audit entries:", entries.len())).bold());
    println!("{table}");
}

fn colorize_operation(op: &str) -> String {
    use console::style;

    match op {
        "init" => style(op).green().to_string(),
        "add" => style(op).blue().to_string(),
        "unlock" | "unlock-all" => style(op).cyan().to_string(),
        "refresh-time" | "status-refresh" => style(op).magenta().to_string(),
        _ => op.to_string(),
    }
}

fn colorize_outcome(outcome: &str) -> String {
    use console::style;

    match outcome {
        "ok" => style(outcome).green().to_string(),
        "stale" | "collision" | "not_eligible" => style(outcome).yellow().to_string(),
        _ => style(outcome).red().to_string(),
    }
}
