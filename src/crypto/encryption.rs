//! AES-256-GCM authenticated encryption with detached tags.
//!
//! `encrypt` generates a fresh random 12-byte nonce per call and returns
//! the nonce, ciphertext and 16-byte tag as separate fields so the index
//! can store the integrity tag on its own.  Callers additionally use a
//! key that is unique per record, so a nonce is never reused under a key.

use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce, Tag};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::errors::{ChronoVaultError, Result};
use crate::vault::format::{base64_decode, base64_encode};

/// Size of the AES-256-GCM nonce in bytes.
pub const NONCE_LEN: usize = 12;

/// Size of the AES-256-GCM authentication tag in bytes.
pub const TAG_LEN: usize = 16;

/// Output of `encrypt`: everything needed to decrypt except the key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sealed {
    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub nonce: Vec<u8>,
    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub ciphertext: Vec<u8>,
    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub tag: Vec<u8>,
}

/// Encrypt `plaintext` with a 32-byte `key`, authenticating `aad` too.
pub fn encrypt(key: &[u8], aad: &[u8], plaintext: &[u8]) -> Result<Sealed> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| ChronoVaultError::EncryptionFailed(format!("invalid key length: {e}")))?;

    let mut nonce = [0u8; NONCE_LEN];
    rand::rng().fill_bytes(&mut nonce);

    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(&nonce), aad, &mut buffer)
        .map_err(|e| ChronoVaultError::EncryptionFailed(format!("encryption error: {e}")))?;

    Ok(Sealed {
        nonce: nonce.to_vec(),
        ciphertext: buffer,
        tag: tag.to_vec(),
    })
}

/// Decrypt data produced by `encrypt`.
///
/// Every failure (bad lengths, wrong key, altered tag, ciphertext or aad)
/// maps to the same `DecryptionFailed` error.
pub fn decrypt(key: &[u8], aad: &[u8], sealed: &Sealed) -> Result<Vec<u8>> {
    if sealed.nonce.len() != NONCE_LEN || sealed.tag.len() != TAG_LEN {
        return Err(ChronoVaultError::DecryptionFailed);
    }

    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| ChronoVaultError::DecryptionFailed)?;

    let mut buffer = sealed.ciphertext.clone();
    cipher
        .decrypt_in_place_detached(
            Nonce::from_slice(&sealed.nonce),
            aad,
            &mut buffer,
            Tag::from_slice(&sealed.tag),
        )
        .map_err(|_| ChronoVaultError::DecryptionFailed)?;

    Ok(buffer)
}
