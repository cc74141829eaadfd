//! High-level vault operations used by the engine.
//!
//! `VaultStore` is an authenticated session on one vault directory: it
//! holds the header and the master key derived from the password, and
//! re-reads the index from disk on every operation so nothing cached in
//! memory can drift from what is durably stored.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};
use zeroize::{Zeroize, Zeroizing};

use crate::crypto::kdf::{derive_key, generate_salt, Argon2Params, KEY_LEN};
use crate::crypto::keys::{generate_file_id, MasterKey};
use crate::crypto::{decrypt, encrypt, Credential};
use crate::errors::{ChronoVaultError, Result};
use crate::tamper::TamperEvent;
use crate::timesource::TimeAnchor;

use super::entry::{FileEntry, Listing};
use super::format::{
    self, compute_hmac, verify_hmac, IndexBody, Record, SealedAnchor, Slot, VaultHeader,
    CURRENT_VERSION,
};

/// The main vault handle.  Create one with `VaultStore::init` or
/// `VaultStore::open`; it is dropped (and its key zeroized) at the end
/// of the operation that opened it.
pub struct VaultStore {
    /// The vault directory.
    dir: PathBuf,

    /// Header metadata (KDF params, salt, verifier, anchor mirror).
    header: VaultHeader,

    /// The derived master key (zeroized on drop).
    master_key: MasterKey,
}

/// Short, stable label for a record in log messages.
fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn local_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

fn derive_master(credential: &Credential, salt: &[u8], params: &Argon2Params) -> Result<MasterKey> {
    let mut bytes: [u8; KEY_LEN] = derive_key(credential.as_bytes(), salt, params)?;
    let key = MasterKey::new(bytes);
    bytes.zeroize();
    Ok(key)
}

impl VaultStore {
    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    /// Create a new vault in `dir`.
    ///
    /// `dir` must not exist or be empty.  If `anchor` is given it becomes
    /// both the creation time and the first authenticated anchor;
    /// otherwise the local clock is recorded and marked untrusted.
    pub fn init(
        dir: &Path,
        credential: &Credential,
        params: &Argon2Params,
        anchor: Option<TimeAnchor>,
    ) -> Result<Self> {
        if format::header_path(dir).exists() {
            return Err(ChronoVaultError::VaultAlreadyExists(dir.to_path_buf()));
        }
        if dir.exists() && fs::read_dir(dir)?.next().is_some() {
            return Err(ChronoVaultError::DirectoryNotEmpty(dir.to_path_buf()));
        }

        // 1. Lay out the directory.
        fs::create_dir_all(dir.join(format::BLOB_DIR))?;

        // 2. Derive the master key from a fresh salt.
        let salt = generate_salt();
        let master_key = derive_master(credential, &salt, params)?;
        let verifier = master_key.password_verifier()?;

        // 3. Build the header.
        let (created_at, created_at_trusted) = match &anchor {
            Some(a) => (a.last_verified_time, true),
            None => (local_now(), false),
        };
        let header = VaultHeader {
            version: CURRENT_VERSION,
            created_at,
            created_at_trusted,
            kdf: *params,
            salt: salt.to_vec(),
            password_verifier: verifier.to_vec(),
            time_anchor: anchor.clone(),
        };

        let store = Self {
            dir: dir.to_path_buf(),
            header,
            master_key,
        };

        // 4. Write an empty index, then the header.  A directory only
        //    counts as a vault once the header exists.
        let mut body = IndexBody {
            manifest_tag: store.manifest_tag(&[])?,
            ..IndexBody::default()
        };
        if let Some(a) = &anchor {
            body.anchor = Some(store.seal_anchor(a)?.into());
        }
        format::write_index(dir, &body)?;
        format::write_header(dir, &store.header)?;

        info!(path = %dir.display(), created_at, created_at_trusted, "vault created");
        Ok(store)
    }

    /// Read the header without a password.
    pub fn load(dir: &Path) -> Result<VaultHeader> {
        format::read_header(dir)
    }

    /// Open an existing vault, verifying the password.
    ///
    /// Uses the Argon2 params stored in the header, never the current
    /// config, so a changed config cannot lock a vault.
    pub fn open(dir: &Path, credential: &Credential) -> Result<Self> {
        let header = format::read_header(dir)?;
        let master_key = derive_master(credential, &header.salt, &header.kdf)?;

        if !master_key.verify(&header.password_verifier)? {
            debug!(path = %dir.display(), "password verifier mismatch");
            return Err(ChronoVaultError::WrongPassword);
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            header,
            master_key,
        })
    }

    // ------------------------------------------------------------------
    // Entries
    // ------------------------------------------------------------------

    /// Read every entry, re-validating the index.
    ///
    /// Problems become tamper events in the listing rather than errors:
    /// a damaged record hides only itself, and an unreadable index yields
    /// an empty listing with an `IndexUnreadable` event.
    pub fn list_entries(&self) -> Result<Listing> {
        let body = match format::read_index(&self.dir) {
            Ok(body) => body,
            Err(ChronoVaultError::IndexCorrupted(reason)) => {
                let event = TamperEvent::IndexUnreadable { reason };
                warn!(%event, "tamper event");
                return Ok(Listing {
                    events: vec![event],
                    ..Listing::default()
                });
            }
            Err(e) => return Err(e),
        };

        let mut listing = Listing::default();

        // 1. Manifest: detects records removed, added or reordered.
        if !self.manifest_ok(&body)? {
            listing.events.push(TamperEvent::ManifestMismatch {
                expected: usize::try_from(body.record_count).unwrap_or(usize::MAX),
                found: body.records.len(),
            });
        }

        // 2. Time anchor.
        match &body.anchor {
            Some(Slot::Parsed(sealed)) if self.anchor_ok(sealed)? => {
                listing.anchor = Some(sealed.anchor.clone());
            }
            Some(_) => listing.events.push(TamperEvent::AnchorMismatch),
            None => {}
        }

        // 3. Each record on its own.
        for (position, slot) in body.records.iter().enumerate() {
            let opened = match slot {
                Slot::Parsed(record) => self.open_record(record),
                Slot::Malformed(_) => Err(ChronoVaultError::DecryptionFailed),
            };
            match opened {
                Ok(entry) => listing.entries.push(entry),
                Err(ChronoVaultError::DecryptionFailed) => {
                    let name = slot
                        .name()
                        .map(str::to_owned)
                        .unwrap_or_else(|| format!("record #{}", position + 1));
                    listing.damaged.push(name.clone());
                    listing.events.push(TamperEvent::IntegrityMismatch { entry: name });
                }
                Err(e) => return Err(e),
            }
        }

        for event in &listing.events {
            warn!(%event, "tamper event");
        }
        debug!(
            entries = listing.entries.len(),
            damaged = listing.damaged.len(),
            "index listed"
        );
        Ok(listing)
    }

    /// Durably add `entry`, or leave the index unchanged.
    ///
    /// Fails with `NameCollision` if `entry.stored_name` is taken, with
    /// `IndexCorrupted` if the index cannot be parsed (appending to it
    /// would discard whatever it still holds), and with `TamperDetected`
    /// if the manifest does not verify. A mismatched manifest is never
    /// re-sealed.
    pub fn append_entry(&self, entry: &FileEntry) -> Result<()> {
        let mut body = format::read_index(&self.dir)?;

        if body
            .records
            .iter()
            .any(|r| r.name() == Some(entry.stored_name.as_str()))
        {
            return Err(ChronoVaultError::NameCollision(entry.stored_name.clone()));
        }

        if !self.manifest_ok(&body)? {
            warn!(
                expected = body.record_count,
                found = body.records.len(),
                "index manifest did not verify; refusing to append"
            );
            return Err(ChronoVaultError::TamperDetected(format!(
                "index manifest mismatch (expected {} records, found {}); \
                 restore the index before adding files",
                body.record_count,
                body.records.len()
            )));
        }

        body.records.push(self.seal_record(entry)?.into());
        body.record_count = body.records.len() as u64;
        body.manifest_tag = self.manifest_tag(&body.records)?;
        format::write_index(&self.dir, &body)?;

        info!(
            name = %entry.stored_name,
            record = short_id(&entry.file_id),
            unlock_timestamp = entry.unlock_timestamp,
            "entry appended"
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Time anchor
    // ------------------------------------------------------------------

    /// Persist `anchor` as the authenticated anchor and mirror it in the header.
    pub fn update_time_anchor(&mut self, anchor: &TimeAnchor) -> Result<()> {
        let stored = TimeAnchor {
            is_stale: false,
            ..anchor.clone()
        };

        let mut body = format::read_index(&self.dir)?;
        body.anchor = Some(self.seal_anchor(&stored)?.into());
        format::write_index(&self.dir, &body)?;

        self.header.time_anchor = Some(stored);
        format::write_header(&self.dir, &self.header)?;

        debug!(
            last_verified_time = anchor.last_verified_time,
            source = %anchor.source,
            "time anchor persisted"
        );
        Ok(())
    }

    /// Update only the advisory header copy. Needs no password.
    pub fn update_display_anchor(dir: &Path, anchor: &TimeAnchor) -> Result<VaultHeader> {
        let mut header = format::read_header(dir)?;
        header.time_anchor = Some(TimeAnchor {
            is_stale: false,
            ..anchor.clone()
        });
        format::write_header(dir, &header)?;
        Ok(header)
    }

    // ------------------------------------------------------------------
    // File contents
    // ------------------------------------------------------------------

    /// A fresh random file id, hex encoded.
    pub fn new_file_id() -> String {
        to_hex(&generate_file_id())
    }

    /// Content key for `file_id`, bound to its unlock time.
    pub fn file_key(&self, file_id: &str, unlock_timestamp: u64) -> Result<Zeroizing<[u8; KEY_LEN]>> {
        self.master_key.file_key(file_id.as_bytes(), unlock_timestamp)
    }

    pub fn blob_path(&self, entry: &FileEntry) -> PathBuf {
        self.blobs_dir().join(entry.blob_name())
    }

    pub fn blobs_dir(&self) -> PathBuf {
        self.dir.join(format::BLOB_DIR)
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn header(&self) -> &VaultHeader {
        &self.header
    }

    // ------------------------------------------------------------------
    // Sealing helpers
    // ------------------------------------------------------------------

    fn seal_record(&self, entry: &FileEntry) -> Result<Record> {
        let key = self.master_key.entry_key(entry.file_id.as_bytes())?;
        let plaintext = Zeroizing::new(
            serde_json::to_vec(entry)
                .map_err(|e| ChronoVaultError::SerializationError(format!("entry: {e}")))?,
        );
        let sealed = encrypt(
            key.as_slice(),
            &Record::aad(&entry.file_id, &entry.stored_name),
            &plaintext,
        )?;

        Ok(Record {
            id: entry.file_id.clone(),
            name: entry.stored_name.clone(),
            sealed,
        })
    }

    /// Authenticate and decode one record.
    ///
    /// Returns `DecryptionFailed` for any tag mismatch, and also when the
    /// sealed entry disagrees with the record's clear id or name.
    fn open_record(&self, record: &Record) -> Result<FileEntry> {
        let key = self.master_key.entry_key(record.id.as_bytes())?;
        let plaintext = Zeroizing::new(decrypt(
            key.as_slice(),
            &Record::aad(&record.id, &record.name),
            &record.sealed,
        )?);

        let entry: FileEntry =
            serde_json::from_slice(&plaintext).map_err(|_| ChronoVaultError::DecryptionFailed)?;
        if entry.file_id != record.id || entry.stored_name != record.name {
            return Err(ChronoVaultError::DecryptionFailed);
        }
        Ok(entry)
    }

    fn manifest_tag(&self, records: &[Slot<Record>]) -> Result<Vec<u8>> {
        let key = self.master_key.index_mac_key()?;
        compute_hmac(key.as_slice(), &IndexBody::manifest_input(records))
    }

    fn manifest_ok(&self, body: &IndexBody) -> Result<bool> {
        if body.record_count != body.records.len() as u64 {
            return Ok(false);
        }
        let key = self.master_key.index_mac_key()?;
        verify_hmac(
            key.as_slice(),
            &IndexBody::manifest_input(&body.records),
            &body.manifest_tag,
        )
    }

    fn seal_anchor(&self, anchor: &TimeAnchor) -> Result<SealedAnchor> {
        let key = self.master_key.anchor_mac_key()?;
        Ok(SealedAnchor {
            anchor: anchor.clone(),
            mac: compute_hmac(key.as_slice(), &anchor.mac_input())?,
        })
    }

    fn anchor_ok(&self, sealed: &SealedAnchor) -> Result<bool> {
        let key = self.master_key.anchor_mac_key()?;
        verify_hmac(key.as_slice(), &sealed.anchor.mac_input(), &sealed.mac)
    }
}
