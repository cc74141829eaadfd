//! Tamper events: inconsistencies reported alongside normal results.
//!
//! A `TamperEvent` is never persisted.  It is produced while reading the
//! index or refreshing trusted time and handed back to the caller, who
//! decides how loudly to warn.

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TamperEvent {
    /// A sealed index record failed authentication.
    IntegrityMismatch { entry: String },
    /// Records were added, removed or reordered outside the engine.
    ManifestMismatch { expected: usize, found: usize },
    /// The index file could not be parsed at all.
    IndexUnreadable { reason: String },
    /// The persisted time anchor does not match its MAC.
    AnchorMismatch,
    /// The external source reported a time earlier than the last anchor.
    TimeRollback {
        previous: u64,
        observed: u64,
        source: String,
    },
    /// Local clock elapsed time disagrees with external elapsed time.
    LocalClockJump {
        external_elapsed: i64,
        local_elapsed: i64,
    },
}

impl TamperEvent {
    /// The stored name this event concerns, if it is entry-specific.
    pub fn entry(&self) -> Option<&str> {
        match self {
            Self::IntegrityMismatch { entry } => Some(entry),
            _ => None,
        }
    }
}

impl fmt::Display for TamperEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IntegrityMismatch { entry } => {
                write!(f, "integrity tag mismatch on entry {entry}")
            }
            Self::ManifestMismatch { expected, found } => write!(
                f,
                "index manifest mismatch: expected {expected} record(s) as last written, found {found}"
            ),
            Self::IndexUnreadable { reason } => write!(f, "index truncated or unreadable: {reason}"),
            Self::AnchorMismatch => f.write_str("time anchor integrity mismatch"),
            Self::TimeRollback {
                previous,
                observed,
                source,
            } => write!(
                f,
                "time source rollback detected: {source} reported {observed}, earlier than last verified {previous}"
            ),
            Self::LocalClockJump {
                external_elapsed,
                local_elapsed,
            } => write!(
                f,
                "local clock jump detected: {local_elapsed}s elapsed locally vs {external_elapsed}s by trusted time"
            ),
        }
    }
}
