//! `chronovault unlock-all` — decrypt every eligible file.
//!
//! Per-file failures are reported in the summary; the command itself
//! fails only if none of the attempted files could be written.

use std::path::Path;
use std::sync::mpsc;
use std::thread;

use crate::cli::output;
use crate::cli::{context, prompt_password, Cli};
use crate::errors::{ChronoVaultError, Result};
use crate::ops::Progress;

/// Execute the `unlock-all` command.
pub fn execute(cli: &Cli, out: &Path) -> Result<()> {
    let (engine, dir) = context(cli)?;
    let password = prompt_password()?;

    let (tx, rx) = mpsc::channel::<Progress>();
    let show_progress = !cli.json;
    let printer = thread::spawn(move || {
        for event in rx {
            if !show_progress {
                continue;
            }
            match event {
                Progress::RefreshingTime => output::info("Fetching trusted time..."),
                Progress::Decrypting { name } => output::info(&format!("Decrypting {name}...")),
                _ => {}
            }
        }
    });

    let result = engine.unlock_vault_with_progress(&dir, out, &password, Some(&tx));
    drop(tx);
    let _ = printer.join();
    let summary = result?;

    if cli.json {
        output::json(&summary)?;
    } else {
        output::print_unlock_summary(&summary);
    }

    if summary.unlocked.is_empty() && !summary.failures.is_empty() {
        return Err(ChronoVaultError::CommandFailed(format!(
            "{} file(s) could not be unlocked",
            summary.failures.len()
        )));
    }
    Ok(())
}
