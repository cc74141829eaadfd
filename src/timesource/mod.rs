//! Trusted time, the only clock unlock decisions are based on.
//!
//! This module provides:
//! - `TimeAnchor`, the cached last-known-good external time (`anchor`)
//! - The `TimeProvider` trait with HTTPS and manual providers (`provider`)
//! - `TrustedClock`, which refreshes the anchor and detects rollback (`clock`)

pub mod anchor;
pub mod clock;
pub mod provider;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

pub use anchor::TimeAnchor;
pub use clock::{RefreshOutcome, TrustedClock};
pub use provider::{HttpTimeProvider, ManualTimeProvider, ResponseFormat, TimeProvider};

use crate::config::Settings;

/// Why no fresh trusted time could be obtained.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeSourceError {
    #[error("no network — could not reach {provider}: {reason}")]
    NoNetwork { provider: String, reason: String },

    #[error("{provider} rejected the request (HTTP {status})")]
    Rejected { provider: String, status: u16 },

    #[error("{provider} did not answer in time")]
    Timeout { provider: String },

    #[error("{provider} returned an unusable response: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("no time providers are configured")]
    NoProviders,
}

impl TrustedClock {
    /// Build a clock querying the HTTPS providers listed in `settings`.
    pub fn from_settings(settings: &Settings) -> Self {
        let providers = settings
            .time_providers
            .iter()
            .map(|p| {
                Arc::new(HttpTimeProvider::new(&p.name, &p.url, p.format)) as Arc<dyn TimeProvider>
            })
            .collect();

        Self::new(
            providers,
            Duration::from_secs(settings.time_timeout_secs),
            settings.clock_skew_tolerance_secs,
        )
    }
}
