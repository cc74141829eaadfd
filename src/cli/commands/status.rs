//! `chronovault status` — list files with their eligibility and any tamper warnings.

use crate::cli::output;
use crate::cli::{context, prompt_password, Cli};
use crate::errors::Result;

/// Execute the `status` command.
pub fn execute(cli: &Cli, refresh: bool) -> Result<()> {
    let (engine, dir) = context(cli)?;
    let password = prompt_password()?;

    let report = if refresh {
        engine.status_with_refresh(&dir, &password)?
    } else {
        engine.status_with_password(&dir, &password)?
    };

    if cli.json {
        return output::json(&report);
    }
    output::print_status_table(&report);
    if !refresh {
        output::tip("Eligibility uses the cached trusted time; pass --refresh to fetch it now.");
    }
    Ok(())
}
