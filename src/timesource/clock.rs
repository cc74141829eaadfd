use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use super::anchor::TimeAnchor;
use super::provider::TimeProvider;
use super::TimeSourceError;
use crate::tamper::TamperEvent;

type LocalClock = Box<dyn Fn() -> u64 + Send + Sync>;

/// Result of a refresh that produced a usable anchor.
#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    /// The anchor to use from now on. Stale if `failure` is set.
    pub anchor: TimeAnchor,
    /// Rollback or clock-jump signals observed during this refresh.
    pub events: Vec<TamperEvent>,
    /// Why no fresh value could be obtained, if the cache was reused.
    pub failure: Option<TimeSourceError>,
}

impl RefreshOutcome {
    pub fn is_fresh(&self) -> bool {
        self.failure.is_none()
    }
}

/// Obtains externally verified time and checks it against the last anchor.
pub struct TrustedClock {
    providers: Vec<Arc<dyn TimeProvider>>,
    timeout: Duration,
    skew_tolerance: u64,
    local_clock: LocalClock,
}

fn system_unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

impl TrustedClock {
    /// `timeout` bounds the whole refresh, across all providers.
    pub fn new(providers: Vec<Arc<dyn TimeProvider>>, timeout: Duration, skew_tolerance: u64) -> Self {
        Self {
            providers,
            timeout,
            skew_tolerance,
            local_clock: Box::new(system_unix_now),
        }
    }

    /// Replace the local wall clock used for jump detection.
    pub fn with_local_clock(mut self, clock: impl Fn() -> u64 + Send + Sync + 'static) -> Self {
        self.local_clock = Box::new(clock);
        self
    }

    pub fn skew_tolerance(&self) -> u64 {
        self.skew_tolerance
    }

    /// Fetch trusted time and fold it into `previous`.
    ///
    /// Providers are tried in order, each at most once, until one answers
    /// or the deadline passes.  If none answers, the previous anchor comes
    /// back marked stale together with the last failure; with no previous
    /// anchor the failure itself is returned.
    pub fn refresh(&self, previous: Option<&TimeAnchor>) -> Result<RefreshOutcome, TimeSourceError> {
        let deadline = Instant::now() + self.timeout;
        let mut last_err = TimeSourceError::NoProviders;

        for provider in &self.providers {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                last_err = TimeSourceError::Timeout {
                    provider: provider.name().to_string(),
                };
                break;
            }

            debug!(provider = provider.name(), "fetching trusted time");
            match provider.fetch(remaining) {
                Ok(observed) => return Ok(self.accept(previous, observed, provider.name())),
                Err(e) => {
                    warn!(provider = provider.name(), error = %e, "time provider failed");
                    last_err = e;
                }
            }
        }

        match previous.filter(|a| a.last_verified_time > 0) {
            Some(prev) => {
                warn!(
                    last_verified_time = prev.last_verified_time,
                    "no time provider answered, reusing cached anchor"
                );
                Ok(RefreshOutcome {
                    anchor: TimeAnchor {
                        is_stale: true,
                        ..prev.clone()
                    },
                    events: Vec::new(),
                    failure: Some(last_err),
                })
            }
            None => Err(last_err),
        }
    }

    /// Build the new anchor from an observed value.
    ///
    /// A value earlier than the previous anchor by more than the skew
    /// tolerance is reported as a rollback but still adopted: the external
    /// source is authoritative.  Smaller regressions are absorbed.
    fn accept(&self, previous: Option<&TimeAnchor>, observed: u64, source: &str) -> RefreshOutcome {
        let local_now = (self.local_clock)();
        let mut events = Vec::new();
        let mut verified = observed;

        if let Some(prev) = previous.filter(|a| a.last_verified_time > 0) {
            if observed.saturating_add(self.skew_tolerance) < prev.last_verified_time {
                let event = TamperEvent::TimeRollback {
                    previous: prev.last_verified_time,
                    observed,
                    source: source.to_string(),
                };
                warn!(%event, "tamper event");
                events.push(event);
            } else {
                verified = observed.max(prev.last_verified_time);
            }

            let external_elapsed = observed as i64 - prev.last_verified_time as i64;
            let local_elapsed = local_now as i64 - prev.fetched_at_local as i64;
            if (local_elapsed - external_elapsed).unsigned_abs() > self.skew_tolerance {
                let event = TamperEvent::LocalClockJump {
                    external_elapsed,
                    local_elapsed,
                };
                warn!(%event, "tamper event");
                events.push(event);
            }
        }

        info!(source, last_verified_time = verified, "trusted time refreshed");
        RefreshOutcome {
            anchor: TimeAnchor::new(verified, source, local_now),
            events,
            failure: None,
        }
    }
}
