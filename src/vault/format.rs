//! On-disk layout of a vault directory.
//!
//! ```text
//! <vault_dir>/
//!   vault.json        header, readable without the password
//!   index.cvx         [CVIX: 4 bytes][version: 1 byte][body_len: 4 bytes LE][body JSON]
//!   blobs/<id>.cvf    encrypted file contents (see `crypto::stream`)
//!   audit.db          optional operation history
//! ```
//!
//! - **Header**: format version, creation time, Argon2 params + salt, the
//!   password verifier, and an advisory copy of the last time anchor.
//! - **Index body**: sealed per-entry records, an HMAC over the record
//!   list (the manifest), and the authenticated time anchor.
//!
//! Every file is replaced atomically (temp file + fsync + rename).

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::crypto::kdf::Argon2Params;
use crate::crypto::Sealed;
use crate::errors::{ChronoVaultError, Result};
use crate::timesource::TimeAnchor;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const HEADER_FILE: &str = "vault.json";
pub const INDEX_FILE: &str = "index.cvx";
pub const BLOB_DIR: &str = "blobs";
pub const BLOB_EXT: &str = "cvf";

/// Magic bytes at the start of the index file.
const INDEX_MAGIC: &[u8; 4] = b"CVIX";

/// Current format version, shared by header and index.
pub const CURRENT_VERSION: u8 = 1;

/// Fixed-size prefix: 4 (magic) + 1 (version) + 4 (body_len).
const PREFIX_LEN: usize = 9;

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

/// Vault metadata stored in `vault.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultHeader {
    pub version: u8,

    /// Unix seconds when the vault was created.
    pub created_at: u64,

    /// `false` if no trusted time was reachable at init and the local
    /// clock was used instead.
    pub created_at_trusted: bool,

    /// Argon2 params used at creation; always used on open.
    pub kdf: Argon2Params,

    /// The salt used for Argon2id key derivation (base64 in JSON).
    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub salt: Vec<u8>,

    /// HKDF output proving a password correct (base64 in JSON).
    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub password_verifier: Vec<u8>,

    /// Display copy of the last time anchor. Not trusted for unlocking.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_anchor: Option<TimeAnchor>,
}

pub fn header_path(dir: &Path) -> PathBuf {
    dir.join(HEADER_FILE)
}

pub fn index_path(dir: &Path) -> PathBuf {
    dir.join(INDEX_FILE)
}

pub fn write_header(dir: &Path, header: &VaultHeader) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(header)
        .map_err(|e| ChronoVaultError::SerializationError(format!("header: {e}")))?;
    atomic_write(&header_path(dir), &bytes)
}

/// Read the vault header. A directory without one is not a vault.
pub fn read_header(dir: &Path) -> Result<VaultHeader> {
    let path = header_path(dir);
    if !path.exists() {
        return Err(ChronoVaultError::VaultNotFound(dir.to_path_buf()));
    }

    let data = fs::read(&path)?;
    let header: VaultHeader = serde_json::from_slice(&data)
        .map_err(|e| ChronoVaultError::InvalidVaultFormat(format!("header JSON: {e}")))?;

    if header.version != CURRENT_VERSION {
        return Err(ChronoVaultError::InvalidVaultFormat(format!(
            "unsupported version {}, expected {CURRENT_VERSION}",
            header.version
        )));
    }

    Ok(header)
}

// ---------------------------------------------------------------------------
// Index
// ---------------------------------------------------------------------------

/// One sealed `FileEntry`.
///
/// `name` stays in the clear so uniqueness can be enforced and damaged
/// records can be reported by name; it is bound into the AEAD as aad.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub sealed: Sealed,
}

impl Record {
    /// Authenticated data binding the record to its id and name.
    pub fn aad(id: &str, name: &str) -> Vec<u8> {
        let mut aad = Vec::with_capacity(id.len() + name.len() + 1);
        aad.extend_from_slice(id.as_bytes());
        aad.push(0);
        aad.extend_from_slice(name.as_bytes());
        aad
    }
}

/// The time anchor together with its HMAC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealedAnchor {
    pub anchor: TimeAnchor,
    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub mac: Vec<u8>,
}

/// A value from the index body that either decoded or did not.
///
/// A malformed slot is kept as raw JSON and written back untouched, so one
/// bad record (or anchor) never makes the rest of the index unreadable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Slot<T> {
    Parsed(T),
    Malformed(serde_json::Value),
}

impl<T> Slot<T> {
    pub fn parsed(&self) -> Option<&T> {
        match self {
            Slot::Parsed(value) => Some(value),
            Slot::Malformed(_) => None,
        }
    }

    pub fn parsed_mut(&mut self) -> Option<&mut T> {
        match self {
            Slot::Parsed(value) => Some(value),
            Slot::Malformed(_) => None,
        }
    }
}

impl<T> From<T> for Slot<T> {
    fn from(value: T) -> Self {
        Slot::Parsed(value)
    }
}

impl Slot<Record> {
    /// The clear id, read from the raw JSON when the record is malformed.
    pub fn id(&self) -> Option<&str> {
        self.clear_field("id", |r| &r.id)
    }

    /// The clear name, read from the raw JSON when the record is malformed.
    pub fn name(&self) -> Option<&str> {
        self.clear_field("name", |r| &r.name)
    }

    fn clear_field<'a>(&'a self, key: &str, field: fn(&Record) -> &String) -> Option<&'a str> {
        match self {
            Slot::Parsed(record) => Some(field(record).as_str()),
            Slot::Malformed(raw) => raw.get(key).and_then(serde_json::Value::as_str),
        }
    }
}

/// Decoded contents of `index.cvx`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexBody {
    pub records: Vec<Slot<Record>>,

    /// Number of records when the manifest tag was computed.
    pub record_count: u64,

    /// HMAC over `record_count` and every record id and name, in order.
    /// A tag that is not valid base64 reads as empty and fails to verify.
    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode_or_empty")]
    pub manifest_tag: Vec<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor: Option<Slot<SealedAnchor>>,
}

impl IndexBody {
    /// Bytes covered by the manifest tag.
    pub fn manifest_input(records: &[Slot<Record>]) -> Vec<u8> {
        let mut buf = (records.len() as u64).to_be_bytes().to_vec();
        for r in records {
            let id = r.id().unwrap_or_default();
            let name = r.name().unwrap_or_default();
            for part in [id.as_bytes(), name.as_bytes()] {
                buf.extend_from_slice(&(part.len() as u32).to_be_bytes());
                buf.extend_from_slice(part);
            }
        }
        buf
    }
}

/// Write the index envelope atomically.
pub fn write_index(dir: &Path, body: &IndexBody) -> Result<()> {
    let body_bytes = serde_json::to_vec(body)
        .map_err(|e| ChronoVaultError::SerializationError(format!("index: {e}")))?;

    let body_len = u32::try_from(body_bytes.len()).map_err(|_| {
        ChronoVaultError::SerializationError(format!(
            "index length {} exceeds u32::MAX",
            body_bytes.len()
        ))
    })?;

    let mut buf = Vec::with_capacity(PREFIX_LEN + body_bytes.len());
    buf.extend_from_slice(INDEX_MAGIC); // 4 bytes
    buf.push(CURRENT_VERSION); // 1 byte
    buf.extend_from_slice(&body_len.to_le_bytes()); // 4 bytes LE
    buf.extend_from_slice(&body_bytes);

    atomic_write(&index_path(dir), &buf)
}

/// Read and decode the index.
///
/// Any structural problem (missing file, bad magic, length mismatch,
/// undecodable JSON) is reported as `IndexCorrupted`. A record or anchor
/// that is well-formed JSON but fails to decode comes back as
/// `Slot::Malformed` instead.
pub fn read_index(dir: &Path) -> Result<IndexBody> {
    let path = index_path(dir);
    let data = match fs::read(&path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ChronoVaultError::IndexCorrupted("index file is missing".into()));
        }
        Err(e) => return Err(e.into()),
    };

    if data.len() < PREFIX_LEN {
        return Err(ChronoVaultError::IndexCorrupted(format!(
            "file is {} bytes, shorter than the {PREFIX_LEN}-byte prefix",
            data.len()
        )));
    }

    if &data[0..4] != INDEX_MAGIC {
        return Err(ChronoVaultError::IndexCorrupted("missing CVIX magic bytes".into()));
    }

    let version = data[4];
    if version != CURRENT_VERSION {
        return Err(ChronoVaultError::IndexCorrupted(format!(
            "unsupported version {version}, expected {CURRENT_VERSION}"
        )));
    }

    let body_len = u32::from_le_bytes([data[5], data[6], data[7], data[8]]) as usize;
    let actual = data.len() - PREFIX_LEN;
    if body_len != actual {
        return Err(ChronoVaultError::IndexCorrupted(format!(
            "declared {body_len} body bytes, found {actual}"
        )));
    }

    serde_json::from_slice(&data[PREFIX_LEN..])
        .map_err(|e| ChronoVaultError::IndexCorrupted(format!("body JSON: {e}")))
}

// ---------------------------------------------------------------------------
// Atomic writes
// ---------------------------------------------------------------------------

/// Temp path next to `path`: `<dir>/.<name>.tmp`.
pub(crate) fn temp_path_for(path: &Path) -> PathBuf {
    let parent = path.parent().unwrap_or(Path::new("."));
    parent.join(format!(
        ".{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy()
    ))
}

/// Replace `path` with `bytes` so readers see either the old or new file.
///
/// 1. Write everything to a temp file in the same directory.
/// 2. fsync the temp file.
/// 3. Rename it over the target.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp_path = temp_path_for(path);

    let result = (|| -> Result<()> {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

// ---------------------------------------------------------------------------
// HMAC helpers
// ---------------------------------------------------------------------------

/// Compute HMAC-SHA256 over `data`.
pub fn compute_hmac(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key)
        .map_err(|e| ChronoVaultError::HmacError(format!("invalid HMAC key: {e}")))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Constant-time HMAC check.
pub fn verify_hmac(key: &[u8], data: &[u8], expected: &[u8]) -> Result<bool> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key)
        .map_err(|e| ChronoVaultError::HmacError(format!("invalid HMAC key: {e}")))?;
    mac.update(data);
    Ok(mac.verify_slice(expected).is_ok())
}

// ---------------------------------------------------------------------------
// Serde helpers for base64-encoded Vec<u8> fields
// ---------------------------------------------------------------------------

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

pub(crate) fn base64_encode<S>(data: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    let encoded = BASE64.encode(data);
    serializer.serialize_str(&encoded)
}

pub(crate) fn base64_decode<'de, D>(deserializer: D) -> std::result::Result<Vec<u8>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    BASE64.decode(&s).map_err(serde::de::Error::custom)
}

pub(crate) fn base64_decode_or_empty<'de, D>(
    deserializer: D,
) -> std::result::Result<Vec<u8>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Ok(BASE64.decode(&s).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_record(id: &str, name: &str) -> Record {
        Record {
            id: id.into(),
            name: name.into(),
            sealed: Sealed {
                nonce: vec![1; 12],
                ciphertext: vec![2; 5],
                tag: vec![3; 16],
            },
        }
    }

    #[test]
    fn index_roundtrips_through_disk() {
        let dir = TempDir::new().unwrap();
        let body = IndexBody {
            records: vec![sample_record("aa", "a.txt").into()],
            record_count: 1,
            manifest_tag: vec![9; 32],
            anchor: None,
        };
        write_index(dir.path(), &body).unwrap();

        let back = read_index(dir.path()).unwrap();
        assert_eq!(back.records.len(), 1);
        let record = back.records[0].parsed().unwrap();
        assert_eq!(record.name, "a.txt");
        assert_eq!(record.sealed.tag, vec![3; 16]);
        assert_eq!(back.manifest_tag, vec![9; 32]);
    }

    #[test]
    fn bad_base64_in_one_record_keeps_the_others() {
        let dir = TempDir::new().unwrap();
        let body = IndexBody {
            records: vec![
                sample_record("aa", "a.txt").into(),
                sample_record("bb", "b.txt").into(),
            ],
            record_count: 2,
            manifest_tag: vec![9; 32],
            anchor: None,
        };
        write_index(dir.path(), &body).unwrap();

        // Same length, so the envelope still checks out.
        let path = index_path(dir.path());
        let text = String::from_utf8(fs::read(&path).unwrap()).unwrap();
        let at = text.rfind("\"tag\":\"").unwrap() + "\"tag\":\"".len();
        let mut bytes = text.into_bytes();
        bytes[at] = b'!';
        fs::write(&path, &bytes).unwrap();

        let back = read_index(dir.path()).unwrap();
        assert_eq!(back.records[0].parsed().unwrap().name, "a.txt");
        assert!(back.records[1].parsed().is_none());
        assert_eq!(back.records[1].name(), Some("b.txt"));
        assert_eq!(back.records[1].id(), Some("bb"));
        assert_eq!(
            IndexBody::manifest_input(&back.records),
            IndexBody::manifest_input(&body.records)
        );

        // Rewriting keeps the malformed record, still malformed.
        write_index(dir.path(), &back).unwrap();
        let again = read_index(dir.path()).unwrap();
        assert!(again.records[1].parsed().is_none());
        assert_eq!(again.records[1].name(), Some("b.txt"));
    }

    #[test]
    fn undecodable_manifest_tag_reads_as_empty() {
        let dir = TempDir::new().unwrap();
        let body = br#"{"records":[],"record_count":0,"manifest_tag":"!!!!"}"#;
        let mut data = b"CVIX\x01".to_vec();
        data.extend_from_slice(&(body.len() as u32).to_le_bytes());
        data.extend_from_slice(body);
        fs::write(index_path(dir.path()), data).unwrap();

        let back = read_index(dir.path()).unwrap();
        assert!(back.manifest_tag.is_empty());
    }

    #[test]
    fn truncated_index_is_detected() {
        let dir = TempDir::new().unwrap();
        write_index(dir.path(), &IndexBody::default()).unwrap();

        let path = index_path(dir.path());
        let mut data = fs::read(&path).unwrap();
        data.truncate(data.len() - 3);
        fs::write(&path, data).unwrap();

        let err = read_index(dir.path()).unwrap_err();
        assert!(matches!(err, ChronoVaultError::IndexCorrupted(_)));
    }

    #[test]
    fn bad_magic_is_detected() {
        let dir = TempDir::new().unwrap();
        fs::write(index_path(dir.path()), b"NOPE\x01\x00\x00\x00\x00").unwrap();
        assert!(matches!(
            read_index(dir.path()),
            Err(ChronoVaultError::IndexCorrupted(_))
        ));
    }

    #[test]
    fn missing_index_is_corruption_not_io() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            read_index(dir.path()),
            Err(ChronoVaultError::IndexCorrupted(_))
        ));
    }

    #[test]
    fn missing_header_means_no_vault() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            read_header(dir.path()),
            Err(ChronoVaultError::VaultNotFound(_))
        ));
    }

    #[test]
    fn atomic_write_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("file.bin");
        atomic_write(&path, b"first").unwrap();
        atomic_write(&path, b"second").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"second");
        assert!(!temp_path_for(&path).exists());
    }

    #[test]
    fn manifest_input_depends_on_order() {
        let a: Slot<Record> = sample_record("1", "a").into();
        let b: Slot<Record> = sample_record("2", "b").into();
        assert_ne!(
            IndexBody::manifest_input(&[a.clone(), b.clone()]),
            IndexBody::manifest_input(&[b, a])
        );
    }

    #[test]
    fn hmac_verify_detects_changes() {
        let key = [4u8; 32];
        let tag = compute_hmac(&key, b"data").unwrap();
        assert!(verify_hmac(&key, b"data", &tag).unwrap());
        assert!(!verify_hmac(&key, b"datb", &tag).unwrap());
    }
}
