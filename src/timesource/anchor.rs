use serde::{Deserialize, Serialize};

/// The last externally verified timestamp trusted for unlock decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeAnchor {
    /// Unix seconds reported by an external source.
    pub last_verified_time: u64,

    /// Name of the provider that supplied `last_verified_time`.
    pub source: String,

    /// Local wall clock (unix seconds) when the value was fetched.
    ///
    /// Compared on the next fetch to spot local clock jumps.
    pub fetched_at_local: u64,

    /// `true` once a refresh failed and this cached value was reused.
    #[serde(default)]
    pub is_stale: bool,
}

impl TimeAnchor {
    pub fn new(last_verified_time: u64, source: impl Into<String>, fetched_at_local: u64) -> Self {
        Self {
            last_verified_time,
            source: source.into(),
            fetched_at_local,
            is_stale: false,
        }
    }

    /// `true` if trusted time has reached `unlock_timestamp`.
    pub fn permits(&self, unlock_timestamp: u64) -> bool {
        self.last_verified_time >= unlock_timestamp
    }

    /// Bytes covered by the anchor MAC. `is_stale` is transient and excluded.
    pub fn mac_input(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(16 + self.source.len() + 8);
        buf.extend_from_slice(&self.last_verified_time.to_be_bytes());
        buf.extend_from_slice(&self.fetched_at_local.to_be_bytes());
        buf.extend_from_slice(&(self.source.len() as u64).to_be_bytes());
        buf.extend_from_slice(self.source.as_bytes());
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permits_at_and_after_unlock_time() {
        let anchor = TimeAnchor::new(1_000, "manual", 1_000);
        assert!(anchor.permits(999));
        assert!(anchor.permits(1_000));
        assert!(!anchor.permits(1_001));
    }

    #[test]
    fn mac_input_ignores_staleness() {
        let fresh = TimeAnchor::new(5, "a", 6);
        let stale = TimeAnchor {
            is_stale: true,
            ..fresh.clone()
        };
        assert_eq!(fresh.mac_input(), stale.mac_input());
        assert_ne!(fresh.mac_input(), TimeAnchor::new(5, "b", 6).mac_input());
    }
}
