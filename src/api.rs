//! The command surface.
//!
//! Every command takes the vault directory and, where needed, a
//! `Credential` that lives only for the call.  Results are plain
//! serializable values; errors are `ChronoVaultError`s whose `kind()`
//! tells callers how to react.  A name collision always displays as
//! `FILE_EXISTS:<name>`.

use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::Settings;
use crate::crypto::Credential;
use crate::errors::{ChronoVaultError, Result};
use crate::ops::add::{self, AddRequest};
use crate::ops::status::{build_report, StatusReport};
use crate::ops::unlock::{self, emit, needs_fresh_anchor, Progress, UnlockSummary};
use crate::tamper::TamperEvent;
use crate::timesource::{TimeAnchor, TimeSourceError, TrustedClock};
use crate::vault::{FileEntry, Listing, VaultHeader, VaultStore};

/// `{created, last_server_time, time_source}` plus staleness details.
#[derive(Debug, Clone, Serialize)]
pub struct VaultInfo {
    pub created: u64,
    pub created_trusted: bool,
    pub last_server_time: Option<u64>,
    pub time_source: Option<String>,
    /// `true` if this is the cached value because a refresh failed.
    pub is_stale: bool,
    pub warnings: Vec<String>,
}

impl VaultInfo {
    fn from_header(header: &VaultHeader) -> Self {
        Self {
            created: header.created_at,
            created_trusted: header.created_at_trusted,
            last_server_time: header.time_anchor.as_ref().map(|a| a.last_verified_time),
            time_source: header.time_anchor.as_ref().map(|a| a.source.clone()),
            is_stale: false,
            warnings: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AddedEntry {
    pub name: String,
    pub display_name: String,
    pub unlock_timestamp: u64,
    pub added_at: u64,
    pub size: u64,
    /// Trusted time already passed the unlock time.
    pub eligible_now: bool,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnlockedFile {
    pub message: String,
    pub output_path: PathBuf,
    pub warnings: Vec<String>,
}

/// Trusted time as seen by one authenticated operation.
struct TimeState {
    anchor: Option<TimeAnchor>,
    events: Vec<TamperEvent>,
    failure: Option<TimeSourceError>,
}

impl TimeState {
    fn cached(anchor: Option<TimeAnchor>) -> Self {
        Self {
            anchor,
            events: Vec::new(),
            failure: None,
        }
    }

    fn warnings(&self) -> Vec<String> {
        let mut warnings: Vec<String> = self.events.iter().map(ToString::to_string).collect();
        if let Some(failure) = &self.failure {
            warnings.push(match &self.anchor {
                Some(a) => format!(
                    "{failure}; using cached trusted time {} from {}",
                    a.last_verified_time, a.source
                ),
                None => format!("{failure}; no trusted time has ever been obtained"),
            });
        }
        warnings
    }
}

fn event_strings(events: &[TamperEvent]) -> Vec<String> {
    events.iter().map(ToString::to_string).collect()
}

fn outcome<T>(result: &Result<T>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(ChronoVaultError::NameCollision(_)) => "collision",
        Err(ChronoVaultError::NotEligible { .. }) => "not_eligible",
        Err(ChronoVaultError::WrongPassword) => "wrong_password",
        Err(_) => "error",
    }
}

#[cfg(feature = "audit-log")]
fn audit(dir: &Path, operation: &str, name: Option<&str>, outcome: &str, details: Option<&str>) {
    crate::audit::record(dir, operation, name, outcome, details);
}

#[cfg(not(feature = "audit-log"))]
fn audit(_dir: &Path, _operation: &str, _name: Option<&str>, _outcome: &str, _details: Option<&str>) {}

/// The vault engine.  Holds configuration and the trusted clock, never
/// a password or key.
pub struct Engine {
    settings: Settings,
    clock: TrustedClock,
}

impl Engine {
    /// Engine querying the HTTPS providers from `settings`.
    pub fn new(settings: Settings) -> Self {
        let clock = TrustedClock::from_settings(&settings);
        Self { settings, clock }
    }

    pub fn with_clock(settings: Settings, clock: TrustedClock) -> Self {
        Self { settings, clock }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    // ------------------------------------------------------------------
    // Vault lifecycle
    // ------------------------------------------------------------------

    /// `init_vault`: create a vault in an empty or new directory.
    pub fn init_vault(&self, dir: &Path, credential: &Credential) -> Result<VaultInfo> {
        if dir.exists() && std::fs::read_dir(dir)?.next().is_some() {
            return Err(if crate::vault::format::header_path(dir).exists() {
                ChronoVaultError::VaultAlreadyExists(dir.to_path_buf())
            } else {
                ChronoVaultError::DirectoryNotEmpty(dir.to_path_buf())
            });
        }

        let mut warnings = Vec::new();
        let anchor = match self.clock.refresh(None) {
            Ok(outcome) => Some(outcome.anchor),
            Err(e) => {
                warn!(error = %e, "no trusted time at init, recording local time");
                warnings.push(format!("{e}; creation time taken from the local clock"));
                None
            }
        };

        let store = VaultStore::init(dir, credential, &self.settings.argon2_params(), anchor)?;
        audit(dir, "init", None, "ok", None);

        let mut info = VaultInfo::from_header(store.header());
        info.warnings = warnings;
        Ok(info)
    }

    /// `verify_vault_password`: `Ok(())` iff the password is correct.
    pub fn verify_vault_password(&self, dir: &Path, credential: &Credential) -> Result<()> {
        VaultStore::open(dir, credential).map(|_| ())
    }

    // ------------------------------------------------------------------
    // Status and time
    // ------------------------------------------------------------------

    /// `status_with_password`: list entries against the cached anchor.
    pub fn status_with_password(&self, dir: &Path, credential: &Credential) -> Result<StatusReport> {
        let store = VaultStore::open(dir, credential)?;
        let listing = store.list_entries()?;
        Ok(build_report(&listing, listing.anchor.as_ref(), Vec::new()))
    }

    /// Status after forcing a trusted-time refresh.
    pub fn status_with_refresh(&self, dir: &Path, credential: &Credential) -> Result<StatusReport> {
        let mut store = VaultStore::open(dir, credential)?;
        let listing = store.list_entries()?;
        let time = self.refresh_authenticated(&mut store, listing.anchor.as_ref())?;

        let mut report = build_report(&listing, time.anchor.as_ref(), time.events.clone());
        report.time_warning = time.failure.as_ref().map(ToString::to_string);
        report.time_is_stale = time.failure.is_some();
        audit(dir, "status-refresh", None, if time.failure.is_some() { "stale" } else { "ok" }, None);
        Ok(report)
    }

    /// `vault_info`: header data, no password and no network.
    pub fn vault_info(&self, dir: &Path) -> Result<VaultInfo> {
        Ok(VaultInfo::from_header(&VaultStore::load(dir)?))
    }

    /// `refresh_server_time`: fetch trusted time and update the header copy.
    ///
    /// Without a password only the advisory copy can change; unlock
    /// decisions never read it.  On failure the cached info comes back
    /// with `is_stale` set and the reason in `warnings`.
    pub fn refresh_server_time(&self, dir: &Path) -> Result<VaultInfo> {
        let header = VaultStore::load(dir)?;

        let info = match self.clock.refresh(header.time_anchor.as_ref()) {
            Ok(outcome) if outcome.is_fresh() => {
                let header = VaultStore::update_display_anchor(dir, &outcome.anchor)?;
                let mut info = VaultInfo::from_header(&header);
                info.warnings = event_strings(&outcome.events);
                info
            }
            Ok(outcome) => {
                let mut info = VaultInfo::from_header(&header);
                info.is_stale = true;
                info.warnings = TimeState {
                    anchor: Some(outcome.anchor),
                    events: outcome.events,
                    failure: outcome.failure,
                }
                .warnings();
                info
            }
            Err(e) => {
                let mut info = VaultInfo::from_header(&header);
                info.is_stale = true;
                info.warnings.push(e.to_string());
                info
            }
        };

        audit(dir, "refresh-time", None, if info.is_stale { "stale" } else { "ok" }, None);
        Ok(info)
    }

    // ------------------------------------------------------------------
    // Adding files
    // ------------------------------------------------------------------

    /// `add_file`: add `source` under its own basename.
    pub fn add_file(
        &self,
        dir: &Path,
        source: &Path,
        credential: &Credential,
        unlock_timestamp: u64,
    ) -> Result<AddedEntry> {
        self.add(dir, source, credential, unlock_timestamp, None, false)
    }

    /// `add_file_with_custom_name`: one attempt under `custom_name`.
    ///
    /// Callers handle `FILE_EXISTS:` by calling again with another name.
    pub fn add_file_with_custom_name(
        &self,
        dir: &Path,
        source: &Path,
        credential: &Credential,
        unlock_timestamp: u64,
        custom_name: &str,
    ) -> Result<AddedEntry> {
        self.add(dir, source, credential, unlock_timestamp, Some(custom_name), false)
    }

    /// Add, resolving a collision with `"<base> (n)<ext>"` names.
    pub fn add_file_renaming(
        &self,
        dir: &Path,
        source: &Path,
        credential: &Credential,
        unlock_timestamp: u64,
        custom_name: Option<&str>,
    ) -> Result<AddedEntry> {
        self.add(dir, source, credential, unlock_timestamp, custom_name, true)
    }

    fn add(
        &self,
        dir: &Path,
        source: &Path,
        credential: &Credential,
        unlock_timestamp: u64,
        custom_name: Option<&str>,
        rename: bool,
    ) -> Result<AddedEntry> {
        let mut store = VaultStore::open(dir, credential)?;
        let listing = store.list_entries()?;
        let time = self.refresh_authenticated(&mut store, listing.anchor.as_ref())?;

        let request = AddRequest {
            source,
            unlock_timestamp,
            preferred_name: custom_name,
            added_at: time.anchor.as_ref().map_or(0, |a| a.last_verified_time),
        };
        let result = if rename {
            add::add_file_renaming(&store, &request)
        } else {
            add::add_file(&store, &request)
        };

        let label = result
            .as_ref()
            .map_or_else(|_| custom_name.map(str::to_string), |e| Some(e.stored_name.clone()));
        let details = result.as_ref().err().map(ToString::to_string);
        audit(dir, "add", label.as_deref(), outcome(&result), details.as_deref());

        let entry: FileEntry = result?;
        let mut warnings = event_strings(&listing.events);
        warnings.extend(time.warnings());

        Ok(AddedEntry {
            eligible_now: entry.is_eligible(time.anchor.as_ref()),
            name: entry.stored_name,
            display_name: entry.display_name,
            unlock_timestamp: entry.unlock_timestamp,
            added_at: entry.added_at,
            size: entry.size,
            warnings,
        })
    }

    // ------------------------------------------------------------------
    // Unlocking
    // ------------------------------------------------------------------

    /// `unlock_file`: decrypt one entry into `out_dir`.
    pub fn unlock_file(
        &self,
        dir: &Path,
        out_dir: &Path,
        credential: &Credential,
        name: &str,
    ) -> Result<UnlockedFile> {
        self.unlock_file_with_progress(dir, out_dir, credential, name, None)
    }

    pub fn unlock_file_with_progress(
        &self,
        dir: &Path,
        out_dir: &Path,
        credential: &Credential,
        name: &str,
        progress: Option<&Sender<Progress>>,
    ) -> Result<UnlockedFile> {
        emit(progress, Progress::VerifyingPassword);
        let mut store = VaultStore::open(dir, credential)?;
        let listing = store.list_entries()?;
        let time = self.time_for_unlock(&mut store, &listing, listing.find(name), progress)?;

        emit(progress, Progress::Decrypting { name: name.to_string() });
        let result = match unlock::unlock_one(&store, &listing, name, time.anchor.as_ref(), out_dir) {
            Err(ChronoVaultError::NotEligible { .. }) if time.anchor.is_none() && time.failure.is_some() => {
                Err(ChronoVaultError::TimeSourceUnavailable(
                    time.failure.clone().unwrap_or(TimeSourceError::NoProviders),
                ))
            }
            other => other,
        };

        audit(dir, "unlock", Some(name), outcome(&result), result.as_ref().err().map(ToString::to_string).as_deref());

        let (unlocked, failed) = match &result {
            Ok(path) => {
                emit(progress, Progress::Wrote { name: name.to_string(), path: path.clone() });
                (1, 0)
            }
            Err(e) => {
                emit(progress, Progress::Failed { name: name.to_string(), error: e.to_string() });
                (0, 1)
            }
        };
        emit(progress, Progress::Finished { unlocked, failed, skipped: 0 });

        let output_path = result?;
        let mut warnings = event_strings(&listing.events);
        warnings.extend(time.warnings());
        Ok(UnlockedFile {
            message: format!("Unlocked '{name}' to {}", output_path.display()),
            output_path,
            warnings,
        })
    }

    /// `unlock_vault`: decrypt every eligible entry into `out_dir`.
    pub fn unlock_vault(&self, dir: &Path, out_dir: &Path, credential: &Credential) -> Result<UnlockSummary> {
        self.unlock_vault_with_progress(dir, out_dir, credential, None)
    }

    pub fn unlock_vault_with_progress(
        &self,
        dir: &Path,
        out_dir: &Path,
        credential: &Credential,
        progress: Option<&Sender<Progress>>,
    ) -> Result<UnlockSummary> {
        emit(progress, Progress::VerifyingPassword);
        let mut store = VaultStore::open(dir, credential)?;
        let listing = store.list_entries()?;
        let time = self.time_for_unlock(&mut store, &listing, listing.entries.iter(), progress)?;

        if time.anchor.is_none() && !listing.entries.is_empty() {
            if let Some(failure) = &time.failure {
                audit(dir, "unlock-all", None, "error", Some(&failure.to_string()));
                return Err(ChronoVaultError::TimeSourceUnavailable(failure.clone()));
            }
        }

        let mut summary = unlock::unlock_all(&store, &listing, time.anchor.as_ref(), out_dir, progress);
        summary.warnings = event_strings(&listing.events);
        summary.warnings.extend(time.warnings());

        audit(dir, "unlock-all", None, "ok", Some(&summary.message));
        Ok(summary)
    }

    // ------------------------------------------------------------------
    // Trusted time
    // ------------------------------------------------------------------

    /// Cached anchor if it settles every decision, a refreshed one otherwise.
    fn time_for_unlock<'a>(
        &self,
        store: &mut VaultStore,
        listing: &'a Listing,
        candidates: impl IntoIterator<Item = &'a FileEntry>,
        progress: Option<&Sender<Progress>>,
    ) -> Result<TimeState> {
        let cached = listing.anchor.clone();
        if !needs_fresh_anchor(candidates, cached.as_ref(), self.settings.freshness_window_secs) {
            debug!("cached anchor is fresh enough");
            return Ok(TimeState::cached(cached));
        }

        emit(progress, Progress::RefreshingTime);
        self.refresh_authenticated(store, cached.as_ref())
    }

    /// Refresh trusted time and persist it as the authenticated anchor.
    ///
    /// A failed refresh is not an error: the stale cache (or nothing)
    /// comes back with the failure recorded.
    fn refresh_authenticated(&self, store: &mut VaultStore, previous: Option<&TimeAnchor>) -> Result<TimeState> {
        match self.clock.refresh(previous) {
            Ok(outcome) => {
                if outcome.is_fresh() {
                    store.update_time_anchor(&outcome.anchor)?;
                }
                Ok(TimeState {
                    anchor: Some(outcome.anchor),
                    events: outcome.events,
                    failure: outcome.failure,
                })
            }
            Err(e) => {
                warn!(error = %e, "trusted time unavailable and nothing cached");
                Ok(TimeState {
                    anchor: None,
                    events: Vec::new(),
                    failure: Some(e),
                })
            }
        }
    }
}
