//! Chunked streaming encryption for file contents.
//!
//! Files are never buffered whole.  Layout of a `.cvf` blob:
//!
//! ```text
//! [CVF1: 4 bytes][chunk_size: u32 LE] { [ct_len: u32 LE][ciphertext + 16-byte tag] }*
//! ```
//!
//! Chunk `i` is sealed under the per-file key with nonce
//! `[i: u64 BE][0, 0, 0][last]`, where `last` is `1` only for the final
//! chunk.  Because the key is unique per file and the counter never
//! repeats within a file, nonces are never reused.  Dropping, reordering
//! or truncating chunks makes authentication fail.

use std::io::{ErrorKind, Read, Write};

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use zeroize::Zeroizing;

use super::encryption::{NONCE_LEN, TAG_LEN};
use crate::errors::{ChronoVaultError, Result};

/// Magic bytes at the start of every encrypted blob.
const MAGIC: &[u8; 4] = b"CVF1";

/// Default plaintext chunk size (64 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Upper bound accepted when reading a blob header (16 MiB).
const MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// Authenticated data shared by every chunk of every blob.
const CHUNK_AAD: &[u8] = b"chronovault-chunk";

fn chunk_nonce(index: u64, last: bool) -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    nonce[..8].copy_from_slice(&index.to_be_bytes());
    nonce[NONCE_LEN - 1] = u8::from(last);
    nonce
}

/// Fill `buf` as far as possible; returns the number of bytes read.
/// Short only at end of input.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

/// Encrypts a reader into a writer, one chunk at a time.
pub struct EncryptingStream<'a> {
    key: &'a [u8],
    chunk_size: usize,
}

impl<'a> EncryptingStream<'a> {
    pub fn new(key: &'a [u8]) -> Self {
        Self {
            key,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.clamp(1, MAX_CHUNK_SIZE);
        self
    }

    /// Returns the number of plaintext bytes consumed.
    ///
    /// Reads one chunk ahead so the final chunk can be flagged; empty
    /// input still produces a single (empty) final chunk.
    pub fn encrypt_stream<R: Read, W: Write>(&self, mut reader: R, mut writer: W) -> Result<u64> {
        let cipher = Aes256Gcm::new_from_slice(self.key)
            .map_err(|e| ChronoVaultError::EncryptionFailed(format!("invalid key length: {e}")))?;

        let chunk_size = u32::try_from(self.chunk_size).map_err(|_| {
            ChronoVaultError::EncryptionFailed("chunk size exceeds u32::MAX".into())
        })?;
        writer.write_all(MAGIC)?;
        writer.write_all(&chunk_size.to_le_bytes())?;

        let mut current = Zeroizing::new(vec![0u8; self.chunk_size]);
        let mut next = Zeroizing::new(vec![0u8; self.chunk_size]);
        let mut current_len = read_full(&mut reader, &mut current)?;
        let mut index = 0u64;
        let mut total = 0u64;

        loop {
            let next_len = if current_len == self.chunk_size {
                read_full(&mut reader, &mut next)?
            } else {
                0
            };
            let last = next_len == 0;

            let nonce = chunk_nonce(index, last);
            let sealed = cipher
                .encrypt(
                    Nonce::from_slice(&nonce),
                    Payload {
                        msg: &current[..current_len],
                        aad: CHUNK_AAD,
                    },
                )
                .map_err(|e| ChronoVaultError::EncryptionFailed(format!("chunk {index}: {e}")))?;

            let sealed_len = u32::try_from(sealed.len())
                .map_err(|_| ChronoVaultError::EncryptionFailed("chunk too large".into()))?;
            writer.write_all(&sealed_len.to_le_bytes())?;
            writer.write_all(&sealed)?;
            total += current_len as u64;

            if last {
                break;
            }
            std::mem::swap(&mut current, &mut next);
            current_len = next_len;
            index += 1;
        }

        writer.flush()?;
        Ok(total)
    }
}

/// Decrypts a blob produced by `EncryptingStream`.
pub struct DecryptingStream<'a> {
    key: &'a [u8],
}

impl<'a> DecryptingStream<'a> {
    pub fn new(key: &'a [u8]) -> Self {
        Self { key }
    }

    /// Returns the number of plaintext bytes written.
    ///
    /// Every failure after the header, including truncation, is reported
    /// as `DecryptionFailed`.  Plaintext of already-verified chunks may
    /// have reached `writer`, so callers write to a temporary location.
    pub fn decrypt_stream<R: Read, W: Write>(&self, mut reader: R, mut writer: W) -> Result<u64> {
        let cipher = Aes256Gcm::new_from_slice(self.key).map_err(|_| ChronoVaultError::DecryptionFailed)?;

        let mut header = [0u8; 8];
        if read_full(&mut reader, &mut header)? != header.len() || &header[..4] != MAGIC {
            return Err(ChronoVaultError::DecryptionFailed);
        }
        let chunk_size = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;
        if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE {
            return Err(ChronoVaultError::DecryptionFailed);
        }
        let max_sealed = chunk_size + TAG_LEN;

        let mut len_buf = [0u8; 4];
        if read_full(&mut reader, &mut len_buf)? != len_buf.len() {
            return Err(ChronoVaultError::DecryptionFailed);
        }

        let mut sealed = vec![0u8; max_sealed];
        let mut index = 0u64;
        let mut total = 0u64;

        loop {
            let sealed_len = u32::from_le_bytes(len_buf) as usize;
            if !(TAG_LEN..=max_sealed).contains(&sealed_len) {
                return Err(ChronoVaultError::DecryptionFailed);
            }
            if read_full(&mut reader, &mut sealed[..sealed_len])? != sealed_len {
                return Err(ChronoVaultError::DecryptionFailed);
            }

            // Peek the next length prefix to learn whether this chunk is the last.
            let peeked = read_full(&mut reader, &mut len_buf)?;
            let last = match peeked {
                0 => true,
                4 => false,
                _ => return Err(ChronoVaultError::DecryptionFailed),
            };

            let nonce = chunk_nonce(index, last);
            let plaintext = Zeroizing::new(
                cipher
                    .decrypt(
                        Nonce::from_slice(&nonce),
                        Payload {
                            msg: &sealed[..sealed_len],
                            aad: CHUNK_AAD,
                        },
                    )
                    .map_err(|_| ChronoVaultError::DecryptionFailed)?,
            );

            writer.write_all(&plaintext)?;
            total += plaintext.len() as u64;

            if last {
                break;
            }
            index += 1;
        }

        writer.flush()?;
        Ok(total)
    }
}
