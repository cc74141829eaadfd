//! `chronovault unlock` — decrypt one eligible file.

use std::path::Path;

use crate::cli::output;
use crate::cli::{context, prompt_password, Cli};
use crate::errors::{ChronoVaultError, Result};

/// Execute the `unlock` command.
pub fn execute(cli: &Cli, name: &str, out: &Path) -> Result<()> {
    let (engine, dir) = context(cli)?;
    let password = prompt_password()?;

    let unlocked = match engine.unlock_file(&dir, out, &password, name) {
        Ok(unlocked) => unlocked,
        Err(e @ ChronoVaultError::NotEligible { .. }) => {
            output::tip("Run `chronovault status --refresh` to see when each file unlocks.");
            return Err(e);
        }
        Err(e) => return Err(e),
    };

    if cli.json {
        return output::json(&unlocked);
    }
    output::warnings(&unlocked.warnings);
    output::success(&unlocked.message);
    Ok(())
}
