//! CLI module: Clap argument parser, output helpers, and command implementations.

pub mod commands;
pub mod output;

use std::path::PathBuf;

use chrono::{DateTime, NaiveDate};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

use crate::api::Engine;
use crate::config::Settings;
use crate::crypto::Credential;
use crate::errors::{ChronoVaultError, Result};

/// Minimum password length to prevent trivially weak passwords.
const MIN_PASSWORD_LEN: usize = 8;

/// Environment variable holding the password for scripted use.
const PASSWORD_ENV: &str = "CHRONOVAULT_PASSWORD";

/// Environment variable holding the log filter.
const LOG_ENV: &str = "CHRONOVAULT_LOG";

/// ChronoVault CLI: files that only decrypt after a trusted future date.
#[derive(Parser)]
#[command(
    name = "chronovault",
    about = "Time-locked file vault backed by trusted network time",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Vault directory (default: `vault_dir` from .chronovault.toml, else .chronovault)
    #[arg(long, global = true, env = "CHRONOVAULT_DIR")]
    pub vault_dir: Option<String>,

    /// Log engine steps to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print results as JSON on stdout
    #[arg(long, global = true)]
    pub json: bool,
}

/// All available subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Create a new vault in an empty directory
    Init,

    /// Check the vault password
    Verify,

    /// List files and whether they can be unlocked yet
    Status {
        /// Fetch trusted time before computing eligibility
        #[arg(long)]
        refresh: bool,
    },

    /// Show creation time and the last trusted time (no password needed)
    Info,

    /// Fetch trusted time and show it (no password needed)
    RefreshTime,

    /// Encrypt a file into the vault until a date
    Add {
        /// File to add
        file: PathBuf,

        /// Unlock date: RFC 3339 (2030-01-01T09:00:00Z), YYYY-MM-DD (UTC midnight) or unix seconds
        #[arg(long)]
        unlock_at: String,

        /// Store under this name instead of the file's basename
        #[arg(long)]
        name: Option<String>,

        /// On a name clash, pick "name (n).ext" automatically
        #[arg(long)]
        rename: bool,
    },

    /// Decrypt one file whose unlock date has passed
    Unlock {
        /// Stored name as shown by `status`
        name: String,

        /// Output directory (created if missing)
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Decrypt every file whose unlock date has passed
    UnlockAll {
        /// Output directory (created if missing)
        #[arg(short, long)]
        out: PathBuf,
    },

    /// View the audit log of vault operations
    #[cfg(feature = "audit-log")]
    Audit {
        /// Number of entries to show (default: 50)
        #[arg(long, default_value = "50")]
        last: usize,
        /// Show entries since a duration ago (e.g. 7d, 24h, 30m)
        #[arg(long)]
        since: Option<String>,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for (bash, zsh, fish, powershell)
        shell: String,
    },
}

// ---------------------------------------------------------------------------
// Shared helpers used by multiple commands
// ---------------------------------------------------------------------------

/// Install the stderr log subscriber.
///
/// `--verbose` shows engine debug output; otherwise `CHRONOVAULT_LOG`
/// decides, defaulting to warnings only.
pub fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("chronovault=debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init();
}

/// Load settings from the working directory and resolve the vault path.
pub fn context(cli: &Cli) -> Result<(Engine, PathBuf)> {
    let cwd = std::env::current_dir()?;
    let settings = Settings::load(&cwd)?;
    let dir = match &cli.vault_dir {
        Some(dir) => cwd.join(dir),
        None => settings.vault_path(&cwd),
    };
    Ok((Engine::new(settings), dir))
}

/// Get the vault password, trying in order:
/// 1. `CHRONOVAULT_PASSWORD` env var (scripts, CI)
/// 2. Interactive prompt
pub fn prompt_password() -> Result<Credential> {
    if let Ok(pw) = std::env::var(PASSWORD_ENV) {
        if !pw.is_empty() {
            return Ok(Credential::new(pw));
        }
    }

    let pw = dialoguer::Password::new()
        .with_prompt("Enter vault password")
        .interact()
        .map_err(|e| ChronoVaultError::CommandFailed(format!("password prompt: {e}")))?;
    Ok(Credential::from(Zeroizing::new(pw)))
}

/// Prompt for a new password with confirmation (used during `init`).
///
/// Also respects `CHRONOVAULT_PASSWORD` for scripted usage.
/// Enforces a minimum password length.
pub fn prompt_new_password() -> Result<Credential> {
    if let Ok(pw) = std::env::var(PASSWORD_ENV) {
        if !pw.is_empty() {
            if pw.chars().count() < MIN_PASSWORD_LEN {
                return Err(ChronoVaultError::CommandFailed(format!(
                    "password must be at least {MIN_PASSWORD_LEN} characters"
                )));
            }
            return Ok(Credential::new(pw));
        }
    }

    loop {
        let password = Zeroizing::new(
            dialoguer::Password::new()
                .with_prompt("Choose vault password")
                .with_confirmation("Confirm vault password", "Passwords do not match, try again")
                .interact()
                .map_err(|e| ChronoVaultError::CommandFailed(format!("password prompt: {e}")))?,
        );

        if password.chars().count() < MIN_PASSWORD_LEN {
            output::warning(&format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters. Try again."
            ));
            continue;
        }

        return Ok(Credential::from(password));
    }
}

/// Parse an unlock date into unix seconds.
///
/// Accepts RFC 3339, a bare `YYYY-MM-DD` (midnight UTC) or unix seconds.
pub fn parse_unlock_time(input: &str) -> Result<u64> {
    let input = input.trim();

    if let Ok(secs) = input.parse::<u64>() {
        return Ok(secs);
    }

    let seconds = if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        dt.timestamp()
    } else if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        date.and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp())
            .unwrap_or_default()
    } else {
        return Err(ChronoVaultError::CommandFailed(format!(
            "invalid unlock date '{input}' — use 2030-01-31, 2030-01-31T09:00:00Z or unix seconds"
        )));
    };

    u64::try_from(seconds).map_err(|_| {
        ChronoVaultError::CommandFailed(format!("unlock date '{input}' is before 1970"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_plain_date_as_utc_midnight() {
        assert_eq!(parse_unlock_time("2023-11-14").unwrap(), 1_699_920_000);
    }

    #[test]
    fn parses_rfc3339_with_offset() {
        assert_eq!(
            parse_unlock_time("2023-11-14T23:13:20+01:00").unwrap(),
            1_700_000_000
        );
    }

    #[test]
    fn parses_unix_seconds() {
        assert_eq!(parse_unlock_time(" 1700000000 ").unwrap(), 1_700_000_000);
    }

    #[test]
    fn rejects_garbage_and_pre_epoch() {
        assert!(parse_unlock_time("next tuesday").is_err());
        assert!(parse_unlock_time("1969-12-31").is_err());
    }

    #[test]
    fn parses_add_arguments() {
        let cli = Cli::try_parse_from([
            "chronovault",
            "--vault-dir",
            "v",
            "add",
            "report.pdf",
            "--unlock-at",
            "2030-01-01",
            "--rename",
        ])
        .unwrap();
        assert_eq!(cli.vault_dir.as_deref(), Some("v"));
        assert!(matches!(
            cli.command,
            Commands::Add { rename: true, ref name, .. } if name.is_none()
        ));
    }
}
