//! Key derivation helpers using HKDF-SHA256.
//!
//! From a single master key we derive:
//! - A **password verifier** stored in the vault header.
//! - Dedicated **MAC keys** for the index manifest and the time anchor.
//! - A unique **per-entry** key for each sealed index record.
//! - A unique **per-file** content key, bound to the file's unlock time.
//!
//! Every per-file key mixes in a random 32-byte file id, so no two files
//! ever share a content key.

use hkdf::Hkdf;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, Zeroizing};

use super::kdf::KEY_LEN;
use crate::errors::{ChronoVaultError, Result};

/// Length of a file id in bytes.
pub const FILE_ID_LEN: usize = 32;

/// Internal helper: run HKDF-SHA256 expand with the given `info`.
///
/// The master key already comes out of Argon2id, so it is used directly
/// as input keying material with no extra salt.
fn hkdf_derive(ikm: &[u8], info: &[u8]) -> Result<[u8; KEY_LEN]> {
    let hk = Hkdf::<Sha256>::new(None, ikm);

    let mut okm = [0u8; KEY_LEN];
    hk.expand(info, &mut okm)
        .map_err(|e| ChronoVaultError::KeyDerivationFailed(format!("HKDF expand failed: {e}")))?;

    Ok(okm)
}

/// A wrapper around a 32-byte master key that zeroes its memory on drop.
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct MasterKey {
    bytes: [u8; KEY_LEN],
}

impl MasterKey {
    pub fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    /// The value stored in the header to prove a password is correct.
    ///
    /// It is a one-way HKDF output, so it never reveals the master key.
    pub fn password_verifier(&self) -> Result<[u8; KEY_LEN]> {
        hkdf_derive(&self.bytes, b"chronovault-verifier")
    }

    /// Compare against a stored verifier in constant time.
    pub fn verify(&self, stored_verifier: &[u8]) -> Result<bool> {
        let mut computed = self.password_verifier()?;
        let matches: bool = computed[..].ct_eq(stored_verifier).into();
        computed.zeroize();
        Ok(matches)
    }

    /// Key for the HMAC over the index manifest (record count and ids).
    pub fn index_mac_key(&self) -> Result<Zeroizing<[u8; KEY_LEN]>> {
        hkdf_derive(&self.bytes, b"chronovault-index-mac").map(Zeroizing::new)
    }

    /// Key for the HMAC over the persisted time anchor.
    pub fn anchor_mac_key(&self) -> Result<Zeroizing<[u8; KEY_LEN]>> {
        hkdf_derive(&self.bytes, b"chronovault-anchor-mac").map(Zeroizing::new)
    }

    /// Key sealing one index record.
    pub fn entry_key(&self, file_id: &[u8]) -> Result<Zeroizing<[u8; KEY_LEN]>> {
        let mut info = b"chronovault-entry:".to_vec();
        info.extend_from_slice(file_id);
        hkdf_derive(&self.bytes, &info).map(Zeroizing::new)
    }

    /// Key encrypting the contents of one file.
    ///
    /// The unlock timestamp is part of `info`, so a record whose unlock
    /// time was altered can no longer decrypt its blob.
    pub fn file_key(&self, file_id: &[u8], unlock_timestamp: u64) -> Result<Zeroizing<[u8; KEY_LEN]>> {
        let mut info = b"chronovault-file:".to_vec();
        info.extend_from_slice(file_id);
        info.push(b':');
        info.extend_from_slice(&unlock_timestamp.to_be_bytes());
        hkdf_derive(&self.bytes, &info).map(Zeroizing::new)
    }
}

/// A password handed into exactly one engine call.
///
/// The caller owns it for the duration of the call; it is wiped from
/// memory when dropped and is never cached inside the engine.
pub struct Credential(Zeroizing<String>);

impl Credential {
    pub fn new(password: impl Into<String>) -> Self {
        Self(Zeroizing::new(password.into()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl From<Zeroizing<String>> for Credential {
    fn from(password: Zeroizing<String>) -> Self {
        Self(password)
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Generate a random file id.
pub fn generate_file_id() -> [u8; FILE_ID_LEN] {
    use rand::RngCore;
    let mut id = [0u8; FILE_ID_LEN];
    rand::rng().fill_bytes(&mut id);
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifier_matches_only_same_key() {
        let key = MasterKey::new([7u8; KEY_LEN]);
        let other = MasterKey::new([8u8; KEY_LEN]);
        let stored = key.password_verifier().unwrap();

        assert!(key.verify(&stored).unwrap());
        assert!(!other.verify(&stored).unwrap());
    }

    #[test]
    fn verifier_rejects_truncated_value() {
        let key = MasterKey::new([7u8; KEY_LEN]);
        let stored = key.password_verifier().unwrap();
        assert!(!key.verify(&stored[..16]).unwrap());
    }

    #[test]
    fn file_keys_differ_per_id_and_unlock_time() {
        let key = MasterKey::new([1u8; KEY_LEN]);
        let a = key.file_key(&[1u8; FILE_ID_LEN], 100).unwrap();
        let b = key.file_key(&[2u8; FILE_ID_LEN], 100).unwrap();
        let c = key.file_key(&[1u8; FILE_ID_LEN], 101).unwrap();
        assert_ne!(*a, *b);
        assert_ne!(*a, *c);
    }

    #[test]
    fn sub_keys_are_domain_separated() {
        let key = MasterKey::new([3u8; KEY_LEN]);
        let index = key.index_mac_key().unwrap();
        let anchor = key.anchor_mac_key().unwrap();
        assert_ne!(*index, *anchor);
        assert_ne!(*index, key.password_verifier().unwrap());
    }

    #[test]
    fn credential_debug_hides_password() {
        let cred = Credential::new("Secret123");
        assert_eq!(format!("{cred:?}"), "Credential(***)");
        assert_eq!(cred.as_bytes(), b"Secret123");
    }
}
