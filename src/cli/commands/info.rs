//! `chronovault info` — show vault creation time and the cached trusted time.

use crate::api::VaultInfo;
use crate::cli::output;
use crate::cli::{context, Cli};
use crate::errors::Result;

/// Execute the `info` command.
pub fn execute(cli: &Cli) -> Result<()> {
    let (engine, dir) = context(cli)?;
    let info = engine.vault_info(&dir)?;

    if cli.json {
        return output::json(&info);
    }
    print_info(&info);
    Ok(())
}

/// Shared with `refresh-time`.
pub fn print_info(info: &VaultInfo) {
    output::warnings(&info.warnings);

    let origin = if info.created_trusted { "" } else { " (local clock)" };
    output::info(&format!("Created:          {}{origin}", output::timestamp(info.created)));

    match (info.last_server_time, info.time_source.as_deref()) {
        (Some(t), source) => {
            let stale = if info.is_stale { " (cached)" } else { "" };
            output::info(&format!(
                "Last server time: {} via {}{stale}",
                output::timestamp(t),
                source.unwrap_or("unknown")
            ));
        }
        (None, _) => output::info("Last server time: never fetched"),
    }
}
