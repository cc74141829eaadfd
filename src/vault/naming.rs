//! File name handling and the `"<base> (n)<ext>"` collision policy.

use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};

use crate::errors::{ChronoVaultError, Result};

/// Suffixes tried after the original name collided.
pub const MAX_SUFFIX_ATTEMPTS: u32 = 10;

/// Make a display name safe to use as a stored name and output file name.
///
/// Path separators and control characters become `_`; empty names and
/// `.`/`..` are rejected.
pub fn sanitize_name(name: &str) -> Result<String> {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| {
            if c == '/' || c == '\\' || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        return Err(ChronoVaultError::InvalidFileName(name.to_string()));
    }
    Ok(cleaned)
}

/// Split `name` into base and extension (including the dot).
///
/// A leading dot is part of the base, so `.bashrc` has no extension.
pub fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(i) if i > 0 => name.split_at(i),
        _ => (name, ""),
    }
}

/// `candidate_name("report.pdf", 2)` → `"report (2).pdf"`.
pub fn candidate_name(name: &str, n: u32) -> String {
    let (base, ext) = split_extension(name);
    format!("{base} ({n}){ext}")
}

/// Retry `attempt` with suffixed names after `original` collided.
///
/// Tries `n = 1..=10`. Stops at the first result that is not a name
/// collision; after ten collisions returns `TooManySimilarNames`.
pub fn retry_with_suffixes<T>(
    original: &str,
    mut attempt: impl FnMut(&str) -> Result<T>,
) -> Result<T> {
    for n in 1..=MAX_SUFFIX_ATTEMPTS {
        let candidate = candidate_name(original, n);
        match attempt(&candidate) {
            Err(ChronoVaultError::NameCollision(_)) => continue,
            other => return other,
        }
    }
    Err(ChronoVaultError::TooManySimilarNames(original.to_string()))
}

/// Create an empty file in `dir` named `name`, or the first free candidate.
///
/// Each path is opened with `create_new`, so a file that already exists
/// (or appears while candidates are tried) is never touched.
pub fn claim_output_path(dir: &Path, name: &str) -> Result<PathBuf> {
    let claim = |candidate: &str| -> Result<PathBuf> {
        let path = dir.join(candidate);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(path),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(ChronoVaultError::NameCollision(candidate.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    };

    match claim(name) {
        Err(ChronoVaultError::NameCollision(_)) => retry_with_suffixes(name, claim),
        other => other,
    }
}
