//! Cryptographic primitives for ChronoVault.
//!
//! This module provides:
//! - AES-256-GCM encryption with detached tags (`encryption`)
//! - Argon2id password-based key derivation (`kdf`)
//! - HKDF-based sub-keys, the password verifier and credentials (`keys`)
//! - Chunked streaming encryption for file contents (`stream`)

pub mod encryption;
pub mod kdf;
pub mod keys;
pub mod stream;

// Re-export the most commonly used items so callers can write:
//   use crate::crypto::{encrypt, decrypt, derive_key, ...};
pub use encryption::{decrypt, encrypt, Sealed};
pub use kdf::{derive_key, generate_salt, Argon2Params};
pub use keys::{Credential, MasterKey};
pub use stream::{DecryptingStream, EncryptingStream};
