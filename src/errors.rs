use std::path::PathBuf;
use thiserror::Error;

use crate::timesource::TimeSourceError;

/// Prefix of the name-collision message. Callers match on it literally.
pub const FILE_EXISTS_PREFIX: &str = "FILE_EXISTS:";

/// All errors that can occur in ChronoVault.
#[derive(Debug, Error)]
pub enum ChronoVaultError {
    // --- Crypto errors ---
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed — wrong key or corrupted data")]
    DecryptionFailed,

    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),

    #[error("Invalid password. Please check your password and try again.")]
    WrongPassword,

    // --- Vault errors ---
    #[error("Vault not found at {0}")]
    VaultNotFound(PathBuf),

    #[error("Vault already exists at {0}")]
    VaultAlreadyExists(PathBuf),

    #[error("Directory {0} is not empty — choose an empty or new directory for the vault")]
    DirectoryNotEmpty(PathBuf),

    #[error("Invalid vault format: {0}")]
    InvalidVaultFormat(String),

    #[error("Vault index is unreadable: {0}")]
    IndexCorrupted(String),

    #[error("HMAC error: {0}")]
    HmacError(String),

    #[error("FILE_EXISTS:{0}")]
    NameCollision(String),

    #[error("Too many files named like '{0}' — choose a different name")]
    TooManySimilarNames(String),

    #[error("No file named '{0}' in this vault")]
    EntryNotFound(String),

    #[error("Invalid file name '{0}'")]
    InvalidFileName(String),

    // --- Time errors ---
    #[error("'{name}' is locked until {unlock_at} (trusted time: {})", trusted_display(.trusted_now))]
    NotEligible {
        name: String,
        unlock_at: u64,
        trusted_now: Option<u64>,
    },

    #[error("Time source unavailable: {0}")]
    TimeSourceUnavailable(#[from] TimeSourceError),

    #[error("Tampering detected: {0}")]
    TamperDetected(String),

    // --- Config errors ---
    #[error("Config file error: {0}")]
    ConfigError(String),

    // --- IO errors ---
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // --- Serialization errors ---
    #[error("Serialization error: {0}")]
    SerializationError(String),

    // --- CLI errors ---
    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("User cancelled operation")]
    UserCancelled,

    #[error("Audit error: {0}")]
    AuditError(String),
}

fn trusted_display(trusted_now: &Option<u64>) -> String {
    match trusted_now {
        Some(t) => t.to_string(),
        None => "never verified".to_string(),
    }
}

/// Coarse classification used by callers to decide how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Wrong password or failed authenticated decryption. Re-prompt, never retry as-is.
    Authentication,
    /// Stored name already taken. Recoverable through the rename protocol.
    NameCollision,
    /// Unlock attempted before trusted time reached the unlock timestamp.
    NotEligible,
    /// No trusted time could be fetched.
    TimeSourceUnavailable,
    /// Integrity mismatch or time rollback.
    TamperDetected,
    Io,
    Invalid,
}

impl ChronoVaultError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::WrongPassword | Self::DecryptionFailed => ErrorKind::Authentication,
            Self::NameCollision(_) => ErrorKind::NameCollision,
            Self::NotEligible { .. } => ErrorKind::NotEligible,
            Self::TimeSourceUnavailable(_) => ErrorKind::TimeSourceUnavailable,
            Self::TamperDetected(_) | Self::IndexCorrupted(_) => ErrorKind::TamperDetected,
            Self::Io(_) | Self::VaultNotFound(_) => ErrorKind::Io,
            _ => ErrorKind::Invalid,
        }
    }

    /// Returns the conflicting name if this is a `FILE_EXISTS:` error.
    pub fn collision_name(&self) -> Option<&str> {
        match self {
            Self::NameCollision(name) => Some(name),
            _ => None,
        }
    }
}

/// Convenience type alias for ChronoVault results.
pub type Result<T> = std::result::Result<T, ChronoVaultError>;
