//! `chronovault refresh-time` — fetch trusted time without a password.
//!
//! Only the displayed copy in the header changes; unlock decisions use
//! the authenticated anchor refreshed by `status --refresh` and `unlock`.

use crate::cli::commands::info::print_info;
use crate::cli::output;
use crate::cli::{context, Cli};
use crate::errors::Result;

/// Execute the `refresh-time` command.
pub fn execute(cli: &Cli) -> Result<()> {
    let (engine, dir) = context(cli)?;
    let info = engine.refresh_server_time(&dir)?;

    if cli.json {
        return output::json(&info);
    }
    print_info(&info);
    if !info.is_stale {
        output::success("Trusted time refreshed.");
    }
    Ok(())
}
