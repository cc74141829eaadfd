use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::crypto::kdf::Argon2Params;
use crate::errors::{ChronoVaultError, Result};
use crate::timesource::ResponseFormat;

/// One external time endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Identifier recorded as the anchor's source.
    pub name: String,
    pub url: String,
    pub format: ResponseFormat,
}

/// Configuration, loaded from `.chronovault.toml`.
///
/// Every field has a sensible default so ChronoVault works out-of-the-box
/// without any config file at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Vault directory used when `--vault-dir` is not given.
    #[serde(default = "default_vault_dir")]
    pub vault_dir: String,

    /// Argon2 memory cost in KiB (default: 64 MB).
    #[serde(default = "default_argon2_memory_kib")]
    pub argon2_memory_kib: u32,

    /// Argon2 iteration count (default: 3).
    #[serde(default = "default_argon2_iterations")]
    pub argon2_iterations: u32,

    /// Argon2 parallelism degree (default: 4).
    #[serde(default = "default_argon2_parallelism")]
    pub argon2_parallelism: u32,

    /// Overall deadline for one time refresh, across all providers.
    #[serde(default = "default_time_timeout_secs")]
    pub time_timeout_secs: u64,

    /// How far back an external time may step before it counts as rollback.
    #[serde(default = "default_clock_skew_tolerance_secs")]
    pub clock_skew_tolerance_secs: u64,

    /// Unlock times within this window of the cached anchor force a refresh.
    #[serde(default = "default_freshness_window_secs")]
    pub freshness_window_secs: u64,

    /// Queried in order until one answers.
    #[serde(default = "default_time_providers")]
    pub time_providers: Vec<ProviderConfig>,
}

// ── Serde default helpers ────────────────────────────────────────────

fn default_vault_dir() -> String {
    ".chronovault".to_string()
}

fn default_argon2_memory_kib() -> u32 {
    65_536 // 64 MB
}

fn default_argon2_iterations() -> u32 {
    3
}

fn default_argon2_parallelism() -> u32 {
    4
}

fn default_time_timeout_secs() -> u64 {
    5
}

fn default_clock_skew_tolerance_secs() -> u64 {
    120
}

fn default_freshness_window_secs() -> u64 {
    300
}

fn default_time_providers() -> Vec<ProviderConfig> {
    vec![
        ProviderConfig {
            name: "worldtimeapi".into(),
            url: "https://worldtimeapi.org/api/timezone/Etc/UTC".into(),
            format: ResponseFormat::UnixtimeJson,
        },
        ProviderConfig {
            name: "timeapi.io".into(),
            url: "https://timeapi.io/api/Time/current/zone?timeZone=UTC".into(),
            format: ResponseFormat::TimeapiIo,
        },
        ProviderConfig {
            name: "worldclockapi".into(),
            url: "http://worldclockapi.com/api/json/utc/now".into(),
            format: ResponseFormat::FiletimeJson,
        },
    ]
}

// ── Implementation ───────────────────────────────────────────────────

impl Default for Settings {
    fn default() -> Self {
        Self {
            vault_dir: default_vault_dir(),
            argon2_memory_kib: default_argon2_memory_kib(),
            argon2_iterations: default_argon2_iterations(),
            argon2_parallelism: default_argon2_parallelism(),
            time_timeout_secs: default_time_timeout_secs(),
            clock_skew_tolerance_secs: default_clock_skew_tolerance_secs(),
            freshness_window_secs: default_freshness_window_secs(),
            time_providers: default_time_providers(),
        }
    }
}

impl Settings {
    /// Name of the config file we look for in the working directory.
    const FILE_NAME: &'static str = ".chronovault.toml";

    /// Load settings from `<dir>/.chronovault.toml`.
    ///
    /// If the file does not exist, sensible defaults are returned.
    /// If the file exists but cannot be parsed, an error is returned.
    pub fn load(dir: &Path) -> Result<Self> {
        let config_path = dir.join(Self::FILE_NAME);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&config_path)?;

        let settings: Settings = toml::from_str(&contents).map_err(|e| {
            ChronoVaultError::ConfigError(format!("Failed to parse {}: {e}", config_path.display()))
        })?;

        Ok(settings)
    }

    /// Resolve the vault directory against `base` unless it is absolute.
    pub fn vault_path(&self, base: &Path) -> PathBuf {
        base.join(&self.vault_dir)
    }

    /// Convert the Argon2 settings into crypto-layer params.
    pub fn argon2_params(&self) -> Argon2Params {
        Argon2Params {
            memory_kib: self.argon2_memory_kib,
            iterations: self.argon2_iterations,
            parallelism: self.argon2_parallelism,
        }
    }

    /// Settings with the cheapest accepted KDF cost. For tests and demos.
    pub fn fast_kdf() -> Self {
        let min = Argon2Params::minimum();
        Self {
            argon2_memory_kib: min.memory_kib,
            argon2_iterations: min.iterations,
            argon2_parallelism: min.parallelism,
            ..Self::default()
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
