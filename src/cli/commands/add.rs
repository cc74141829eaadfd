//! `chronovault add` — encrypt a file into the vault until a date.
//!
//! A name clash never overwrites.  With `--rename` the next free
//! `"name (n).ext"` is picked; in a terminal the user is offered one;
//! otherwise the command fails with `FILE_EXISTS:<name>`.

use std::io::{self, IsTerminal};
use std::path::Path;

use crate::api::{AddedEntry, Engine};
use crate::cli::output;
use crate::cli::{context, parse_unlock_time, prompt_password, Cli};
use crate::crypto::Credential;
use crate::errors::{ChronoVaultError, Result};
use crate::vault::naming::candidate_name;

/// Execute the `add` command.
pub fn execute(cli: &Cli, file: &Path, unlock_at: &str, name: Option<&str>, rename: bool) -> Result<()> {
    let unlock_timestamp = parse_unlock_time(unlock_at)?;
    let (engine, dir) = context(cli)?;
    let password = prompt_password()?;

    let first = if rename {
        engine.add_file_renaming(&dir, file, &password, unlock_timestamp, name)
    } else if let Some(name) = name {
        engine.add_file_with_custom_name(&dir, file, &password, unlock_timestamp, name)
    } else {
        engine.add_file(&dir, file, &password, unlock_timestamp)
    };

    let added = match first {
        Err(ChronoVaultError::NameCollision(existing)) if !cli.json && io::stdin().is_terminal() => {
            ask_for_new_name(&engine, &dir, file, &password, unlock_timestamp, existing)?
        }
        Err(e @ ChronoVaultError::NameCollision(_)) => {
            if !cli.json {
                output::tip("Pass --rename to pick a free name, or --name to choose one.");
            }
            return Err(e);
        }
        other => other?,
    };

    if cli.json {
        return output::json(&added);
    }
    print_added(&added);
    Ok(())
}

/// Keep asking for another name until one is free or the user gives up.
fn ask_for_new_name(
    engine: &Engine,
    dir: &Path,
    file: &Path,
    password: &Credential,
    unlock_timestamp: u64,
    mut existing: String,
) -> Result<AddedEntry> {
    loop {
        output::warning(&format!("'{existing}' already exists in this vault."));
        let name: String = dialoguer::Input::new()
            .with_prompt("Store it as")
            .default(candidate_name(&existing, 1))
            .interact_text()
            .map_err(|e| ChronoVaultError::CommandFailed(format!("name prompt: {e}")))?;

        if name.trim().is_empty() {
            return Err(ChronoVaultError::UserCancelled);
        }

        match engine.add_file_with_custom_name(dir, file, password, unlock_timestamp, &name) {
            Err(ChronoVaultError::NameCollision(taken)) => existing = taken,
            other => return other,
        }
    }
}

fn print_added(added: &AddedEntry) {
    output::warnings(&added.warnings);
    output::success(&format!(
        "Added '{}' ({} bytes), locked until {}",
        added.name,
        added.size,
        output::timestamp(added.unlock_timestamp)
    ));
    if added.display_name != added.name {
        output::info(&format!("Original name: {}", added.display_name));
    }
    if added.eligible_now {
        output::tip("The unlock date has already passed; this file can be unlocked now.");
    }
}
