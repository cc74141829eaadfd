//! Unlock orchestrator: eligibility against trusted time, then decryption.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::crypto::DecryptingStream;
use crate::errors::{ChronoVaultError, ErrorKind, Result};
use crate::timesource::TimeAnchor;
use crate::vault::naming::{claim_output_path, sanitize_name};
use crate::vault::{FileEntry, Listing, VaultStore};

/// Discrete steps reported while an unlock runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Progress {
    VerifyingPassword,
    RefreshingTime,
    Decrypting { name: String },
    Wrote { name: String, path: PathBuf },
    Skipped { name: String, unlock_timestamp: u64 },
    Failed { name: String, error: String },
    Finished { unlocked: usize, failed: usize, skipped: usize },
}

/// Send `event` if anyone listens. A dropped receiver is not an error.
pub fn emit(progress: Option<&Sender<Progress>>, event: Progress) {
    if let Some(tx) = progress {
        let _ = tx.send(event);
    }
}

/// `true` if deciding for these entries needs a fresher anchor than `anchor`.
///
/// That is the case when there is no anchor yet, or when any unlock time
/// is within `window` seconds of the anchor or beyond it.
pub fn needs_fresh_anchor<'a>(
    entries: impl IntoIterator<Item = &'a FileEntry>,
    anchor: Option<&TimeAnchor>,
    window: u64,
) -> bool {
    match anchor {
        None => true,
        Some(a) => {
            let horizon = a.last_verified_time.saturating_sub(window);
            entries.into_iter().any(|e| e.unlock_timestamp > horizon)
        }
    }
}

/// `Ok` iff trusted time has reached the entry's unlock time.
pub fn ensure_eligible(entry: &FileEntry, anchor: Option<&TimeAnchor>) -> Result<()> {
    if entry.is_eligible(anchor) {
        return Ok(());
    }
    Err(ChronoVaultError::NotEligible {
        name: entry.stored_name.clone(),
        unlock_at: entry.unlock_timestamp,
        trusted_now: anchor.map(|a| a.last_verified_time),
    })
}

/// Decrypt `entry` into `out_dir`, never overwriting an existing file.
///
/// The output name is claimed up front as an empty file. Plaintext goes
/// to a hidden partial file and replaces the claim only after every
/// chunk authenticated; on failure both are removed.
pub fn decrypt_to(store: &VaultStore, entry: &FileEntry, out_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(out_dir)?;

    let key = store.file_key(&entry.file_id, entry.unlock_timestamp)?;
    let blob = File::open(store.blob_path(entry))?;

    let output_name = sanitize_name(&entry.display_name).unwrap_or_else(|_| entry.stored_name.clone());
    let target = claim_output_path(out_dir, &output_name)?;
    let partial = out_dir.join(format!(".{}.partial", entry.file_id));

    let result = (|| -> Result<()> {
        let mut writer = BufWriter::new(File::create(&partial)?);
        DecryptingStream::new(key.as_slice()).decrypt_stream(BufReader::new(blob), &mut writer)?;
        writer.flush()?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        fs::rename(&partial, &target)?;
        Ok(())
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&partial);
        let _ = fs::remove_file(&target);
        return Err(e);
    }

    info!(name = %entry.stored_name, path = %target.display(), "file unlocked");
    Ok(target)
}

/// Unlock the entry stored as `name`.
pub fn unlock_one(
    store: &VaultStore,
    listing: &Listing,
    name: &str,
    anchor: Option<&TimeAnchor>,
    out_dir: &Path,
) -> Result<PathBuf> {
    let entry = match listing.find(name) {
        Some(entry) => entry,
        None if listing.damaged.iter().any(|d| d == name) => {
            return Err(ChronoVaultError::TamperDetected(format!(
                "integrity tag mismatch on entry {name}"
            )));
        }
        None => return Err(ChronoVaultError::EntryNotFound(name.to_string())),
    };

    ensure_eligible(entry, anchor)?;
    decrypt_to(store, entry, out_dir)
}

#[derive(Debug, Clone, Serialize)]
pub struct UnlockedEntry {
    pub name: String,
    pub output_path: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnlockFailure {
    pub name: String,
    pub error: String,
    pub kind: ErrorKind,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedEntry {
    pub name: String,
    pub unlock_timestamp: u64,
}

/// Per-file outcome of a bulk unlock.
#[derive(Debug, Clone, Serialize)]
pub struct UnlockSummary {
    pub message: String,
    pub unlocked: Vec<UnlockedEntry>,
    pub failures: Vec<UnlockFailure>,
    /// Not yet eligible.
    pub skipped: Vec<SkippedEntry>,
    /// Tamper events and time-source problems seen along the way.
    pub warnings: Vec<String>,
}

/// Decrypt every eligible entry, collecting failures instead of stopping.
pub fn unlock_all(
    store: &VaultStore,
    listing: &Listing,
    anchor: Option<&TimeAnchor>,
    out_dir: &Path,
    progress: Option<&Sender<Progress>>,
) -> UnlockSummary {
    let mut summary = UnlockSummary {
        message: String::new(),
        unlocked: Vec::new(),
        failures: Vec::new(),
        skipped: Vec::new(),
        warnings: Vec::new(),
    };

    for name in &listing.damaged {
        let error = format!("integrity tag mismatch on entry {name}");
        emit(progress, Progress::Failed { name: name.clone(), error: error.clone() });
        summary.failures.push(UnlockFailure {
            name: name.clone(),
            error,
            kind: ErrorKind::TamperDetected,
        });
    }

    for entry in &listing.entries {
        if !entry.is_eligible(anchor) {
            debug!(name = %entry.stored_name, unlock_timestamp = entry.unlock_timestamp, "not yet eligible");
            emit(
                progress,
                Progress::Skipped {
                    name: entry.stored_name.clone(),
                    unlock_timestamp: entry.unlock_timestamp,
                },
            );
            summary.skipped.push(SkippedEntry {
                name: entry.stored_name.clone(),
                unlock_timestamp: entry.unlock_timestamp,
            });
            continue;
        }

        emit(progress, Progress::Decrypting { name: entry.stored_name.clone() });
        match decrypt_to(store, entry, out_dir) {
            Ok(path) => {
                emit(
                    progress,
                    Progress::Wrote {
                        name: entry.stored_name.clone(),
                        path: path.clone(),
                    },
                );
                summary.unlocked.push(UnlockedEntry {
                    name: entry.stored_name.clone(),
                    output_path: path,
                });
            }
            Err(e) => {
                warn!(name = %entry.stored_name, error = %e, "unlock failed");
                emit(
                    progress,
                    Progress::Failed {
                        name: entry.stored_name.clone(),
                        error: e.to_string(),
                    },
                );
                summary.failures.push(UnlockFailure {
                    name: entry.stored_name.clone(),
                    error: e.to_string(),
                    kind: e.kind(),
                });
            }
        }
    }

    summary.message = summarize(&summary);
    emit(
        progress,
        Progress::Finished {
            unlocked: summary.unlocked.len(),
            failed: summary.failures.len(),
            skipped: summary.skipped.len(),
        },
    );
    summary
}

fn summarize(summary: &UnlockSummary) -> String {
    let mut message = format!("Unlocked {} file(s)", summary.unlocked.len());
    if !summary.skipped.is_empty() {
        message.push_str(&format!(", {} still locked", summary.skipped.len()));
    }
    if !summary.failures.is_empty() {
        message.push_str(&format!(", {} failed", summary.failures.len()));
    }
    message
}
