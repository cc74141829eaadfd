//! Add-file pipeline: encrypt a file into the vault and register it.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::crypto::EncryptingStream;
use crate::errors::{ChronoVaultError, Result};
use crate::vault::format::{temp_path_for, BLOB_EXT};
use crate::vault::naming::{retry_with_suffixes, sanitize_name};
use crate::vault::{FileEntry, VaultStore};

/// What to add and when it may be opened.
#[derive(Debug, Clone)]
pub struct AddRequest<'a> {
    pub source: &'a Path,
    pub unlock_timestamp: u64,
    /// Overrides the source file's basename.
    pub preferred_name: Option<&'a str>,
    /// Trusted time recorded as `added_at`.
    pub added_at: u64,
}

impl<'a> AddRequest<'a> {
    fn display_name(&self) -> Result<String> {
        match self.preferred_name {
            Some(name) => Ok(name.trim().to_string()),
            None => self
                .source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| ChronoVaultError::InvalidFileName(self.source.display().to_string())),
        }
    }

    fn with_name(&self, name: &'a str) -> Self {
        Self {
            preferred_name: Some(name),
            ..self.clone()
        }
    }
}

/// Encrypt `request.source` and append it as a new entry.
///
/// Never overwrites: if the stored name is taken the result is
/// `NameCollision(name)` and the vault is unchanged.  Past unlock times
/// are accepted; such files are eligible immediately.
pub fn add_file(store: &VaultStore, request: &AddRequest<'_>) -> Result<FileEntry> {
    // 1. Resolve names.
    let display_name = request.display_name()?;
    let stored_name = sanitize_name(&display_name)?;

    // 2. Cheap rejection before any encryption work.
    let listing = store.list_entries()?;
    if listing.find(&stored_name).is_some() || listing.damaged.contains(&stored_name) {
        return Err(ChronoVaultError::NameCollision(stored_name));
    }

    // 3. Stream the plaintext into a new blob.
    let file_id = VaultStore::new_file_id();
    let blob = store.blobs_dir().join(format!("{file_id}.{BLOB_EXT}"));
    let size = write_blob(store, &file_id, request, &blob)?;

    let entry = FileEntry {
        file_id,
        stored_name,
        display_name,
        unlock_timestamp: request.unlock_timestamp,
        added_at: request.added_at,
        size,
    };

    // 4. Register it.  The blob is useless without its record.
    if let Err(e) = store.append_entry(&entry) {
        if let Err(rm) = fs::remove_file(&blob) {
            warn!(path = %blob.display(), error = %rm, "could not remove orphaned blob");
        }
        return Err(e);
    }

    Ok(entry)
}

/// Like `add_file`, but on a collision retries as `"<base> (n)<ext>"`.
pub fn add_file_renaming(store: &VaultStore, request: &AddRequest<'_>) -> Result<FileEntry> {
    match add_file(store, request) {
        Err(ChronoVaultError::NameCollision(existing)) => {
            debug!(name = %existing, "name taken, trying numbered variants");
            retry_with_suffixes(&existing, |candidate| {
                add_file(store, &request.with_name(candidate))
            })
        }
        other => other,
    }
}

fn write_blob(store: &VaultStore, file_id: &str, request: &AddRequest<'_>, blob: &Path) -> Result<u64> {
    let source = File::open(request.source)?;
    let key = store.file_key(file_id, request.unlock_timestamp)?;
    fs::create_dir_all(store.blobs_dir())?;

    let tmp: PathBuf = temp_path_for(blob);
    let result = (|| -> Result<u64> {
        let mut writer = BufWriter::new(File::create(&tmp)?);
        let size = EncryptingStream::new(key.as_slice()).encrypt_stream(BufReader::new(source), &mut writer)?;
        writer.flush()?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        fs::rename(&tmp, blob)?;
        Ok(size)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::kdf::Argon2Params;
    use crate::crypto::Credential;
    use tempfile::TempDir;

    fn setup() -> (TempDir, VaultStore, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let vault_dir = tmp.path().join("vault");
        let store = VaultStore::init(
            &vault_dir,
            &Credential::new("Secret123"),
            &Argon2Params::minimum(),
            None,
        )
        .unwrap();
        let source = tmp.path().join("report.pdf");
        fs::write(&source, b"%PDF-1.7 quarterly numbers").unwrap();
        (tmp, store, source)
    }

    fn request(source: &Path) -> AddRequest<'_> {
        AddRequest {
            source,
            unlock_timestamp: 2_000,
            preferred_name: None,
            added_at: 1_000,
        }
    }

    #[test]
    fn adds_under_the_basename() {
        let (_tmp, store, source) = setup();
        let entry = add_file(&store, &request(&source)).unwrap();

        assert_eq!(entry.stored_name, "report.pdf");
        assert_eq!(entry.display_name, "report.pdf");
        assert_eq!(entry.size, 26);
        assert!(store.blob_path(&entry).exists());
    }

    #[test]
    fn second_add_collides_without_leaving_a_blob() {
        let (_tmp, store, source) = setup();
        add_file(&store, &request(&source)).unwrap();
        let blobs_before = fs::read_dir(store.blobs_dir()).unwrap().count();

        let err = add_file(&store, &request(&source)).unwrap_err();
        assert_eq!(err.to_string(), "FILE_EXISTS:report.pdf");
        assert_eq!(fs::read_dir(store.blobs_dir()).unwrap().count(), blobs_before);
    }

    #[test]
    fn renaming_add_picks_first_free_suffix() {
        let (_tmp, store, source) = setup();
        add_file(&store, &request(&source)).unwrap();
        add_file(&store, &request(&source).with_name("report (1).pdf")).unwrap();

        let entry = add_file_renaming(&store, &request(&source)).unwrap();
        assert_eq!(entry.stored_name, "report (2).pdf");
    }

    #[test]
    fn custom_name_is_sanitized() {
        let (_tmp, store, source) = setup();
        let entry = add_file(&store, &request(&source).with_name("q3/summary.pdf")).unwrap();
        assert_eq!(entry.display_name, "q3/summary.pdf");
        assert_eq!(entry.stored_name, "q3_summary.pdf");
    }

    #[test]
    fn missing_source_is_an_io_error() {
        let (tmp, store, _source) = setup();
        let missing = tmp.path().join("nope.txt");
        let err = add_file(&store, &request(&missing)).unwrap_err();
        assert!(matches!(err, ChronoVaultError::Io(_)));
        assert!(store.list_entries().unwrap().entries.is_empty());
    }
}
