//! Password-based key derivation using Argon2id.
//!
//! Argon2id is a memory-hard KDF that protects against brute-force and
//! GPU-based attacks.  The parameters used at vault creation are stored
//! in the vault header, so re-opening never depends on the current config.

use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;

use crate::errors::{ChronoVaultError, Result};

/// Length of the salt in bytes (256 bits).
pub const SALT_LEN: usize = 32;

/// Length of the derived key in bytes (256 bits, for AES-256).
pub const KEY_LEN: usize = 32;

/// Minimum safe memory cost in KiB (8 MB).
const MIN_MEMORY_KIB: u32 = 8_192;

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Argon2Params {
    /// Memory cost in KiB (default: 65 536 = 64 MB).
    pub memory_kib: u32,
    /// Number of iterations (default: 3).
    pub iterations: u32,
    /// Parallelism lanes (default: 4).
    pub parallelism: u32,
}

impl Default for Argon2Params {
    fn default() -> Self {
        Self {
            memory_kib: 65_536,
            iterations: 3,
            parallelism: 4,
        }
    }
}

impl Argon2Params {
    /// The cheapest parameters `derive_key` accepts. Used by tests.
    pub fn minimum() -> Self {
        Self {
            memory_kib: MIN_MEMORY_KIB,
            iterations: 1,
            parallelism: 1,
        }
    }
}

/// Derive a 32-byte master key from a password and salt using Argon2id.
///
/// The same password + salt + params always produce the same key.
/// Rejects parameters weaker than the enforced minimums.
pub fn derive_key(password: &[u8], salt: &[u8], params: &Argon2Params) -> Result<[u8; KEY_LEN]> {
    if params.memory_kib < MIN_MEMORY_KIB {
        return Err(ChronoVaultError::KeyDerivationFailed(format!(
            "Argon2 memory_kib must be at least {MIN_MEMORY_KIB} (got {})",
            params.memory_kib
        )));
    }
    if params.iterations < 1 {
        return Err(ChronoVaultError::KeyDerivationFailed(
            "Argon2 iterations must be at least 1".into(),
        ));
    }
    if params.parallelism < 1 {
        return Err(ChronoVaultError::KeyDerivationFailed(
            "Argon2 parallelism must be at least 1".into(),
        ));
    }

    let argon_params = Params::new(
        params.memory_kib,
        params.iterations,
        params.parallelism,
        Some(KEY_LEN),
    )
    .map_err(|e| ChronoVaultError::KeyDerivationFailed(format!("invalid Argon2 params: {e}")))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

    let mut key = [0u8; KEY_LEN];
    argon2
        .hash_password_into(password, salt, &mut key)
        .map_err(|e| ChronoVaultError::KeyDerivationFailed(format!("Argon2id hashing failed: {e}")))?;

    Ok(key)
}

/// Generate a cryptographically random 32-byte salt.
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::rng().fill_bytes(&mut salt);
    salt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_weak_memory_cost() {
        let params = Argon2Params {
            memory_kib: 1024,
            ..Argon2Params::minimum()
        };
        let err = derive_key(b"pw", &[0u8; SALT_LEN], &params).unwrap_err();
        assert!(err.to_string().contains("memory_kib"));
    }

    #[test]
    fn rejects_zero_iterations_and_lanes() {
        let no_iter = Argon2Params {
            iterations: 0,
            ..Argon2Params::minimum()
        };
        assert!(derive_key(b"pw", &[0u8; SALT_LEN], &no_iter).is_err());

        let no_lanes = Argon2Params {
            parallelism: 0,
            ..Argon2Params::minimum()
        };
        assert!(derive_key(b"pw", &[0u8; SALT_LEN], &no_lanes).is_err());
    }

    #[test]
    fn salts_are_random() {
        assert_ne!(generate_salt(), generate_salt());
    }
}
