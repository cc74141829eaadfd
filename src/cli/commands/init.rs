//! `chronovault init` — create a new vault.

use crate::cli::output;
use crate::cli::{context, prompt_new_password, Cli};
use crate::errors::{ChronoVaultError, Result};

/// Execute the `init` command.
pub fn execute(cli: &Cli) -> Result<()> {
    let (engine, dir) = context(cli)?;

    let password = prompt_new_password()?;
    let info = match engine.init_vault(&dir, &password) {
        Ok(info) => info,
        Err(e @ ChronoVaultError::VaultAlreadyExists(_)) => {
            output::tip("Use `chronovault add` to put files into the existing vault.");
            return Err(e);
        }
        Err(e) => return Err(e),
    };

    if cli.json {
        return output::json(&info);
    }

    output::warnings(&info.warnings);
    output::success(&format!("Vault created at {}", dir.display()));
    let origin = if info.created_trusted { "trusted time" } else { "local clock" };
    output::info(&format!("Created {} ({origin})", output::timestamp(info.created)));
    output::tip("Run `chronovault add <FILE> --unlock-at <DATE>` to lock your first file.");
    Ok(())
}
