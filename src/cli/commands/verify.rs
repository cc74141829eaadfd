//! `chronovault verify` — check the vault password.

use crate::cli::output;
use crate::cli::{context, prompt_password, Cli};
use crate::errors::Result;

/// Execute the `verify` command.
pub fn execute(cli: &Cli) -> Result<()> {
    let (engine, dir) = context(cli)?;
    let password = prompt_password()?;

    engine.verify_vault_password(&dir, &password)?;
    output::success("Password is correct.");
    Ok(())
}
