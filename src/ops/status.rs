//! Status reporting: integrity-checked listing plus eligibility.

use serde::Serialize;

use crate::tamper::TamperEvent;
use crate::timesource::TimeAnchor;
use crate::vault::Listing;

/// One row of a status report.
///
/// For a damaged record only `name` and `tamper_events` are known.
#[derive(Debug, Clone, Serialize)]
pub struct FileStatus {
    pub name: String,
    pub display_name: Option<String>,
    pub unlock_timestamp: Option<u64>,
    pub added_at: Option<u64>,
    pub size: Option<u64>,
    pub eligible: bool,
    pub tamper_events: Vec<TamperEvent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub files: Vec<FileStatus>,

    /// Every tamper event seen, entry-specific ones included.
    pub tamper_events: Vec<TamperEvent>,

    /// Trusted time the eligibility flags were computed against.
    pub trusted_time: Option<u64>,
    pub time_source: Option<String>,

    /// `true` if a refresh was attempted and failed.
    pub time_is_stale: bool,

    /// Why trusted time could not be refreshed, if it was attempted.
    pub time_warning: Option<String>,
}

/// Compose a listing with the eligibility rule.
///
/// `extra_events` carries signals from outside the index, such as a
/// rollback seen during a refresh.
pub fn build_report(
    listing: &Listing,
    anchor: Option<&TimeAnchor>,
    extra_events: Vec<TamperEvent>,
) -> StatusReport {
    let mut tamper_events = listing.events.clone();
    tamper_events.extend(extra_events);

    let events_for = |name: &str| -> Vec<TamperEvent> {
        tamper_events
            .iter()
            .filter(|e| e.entry() == Some(name))
            .cloned()
            .collect()
    };

    let mut files: Vec<FileStatus> = listing
        .entries
        .iter()
        .map(|entry| FileStatus {
            name: entry.stored_name.clone(),
            display_name: Some(entry.display_name.clone()),
            unlock_timestamp: Some(entry.unlock_timestamp),
            added_at: Some(entry.added_at),
            size: Some(entry.size),
            eligible: entry.is_eligible(anchor),
            tamper_events: events_for(&entry.stored_name),
        })
        .collect();

    files.extend(listing.damaged.iter().map(|name| FileStatus {
        name: name.clone(),
        display_name: None,
        unlock_timestamp: None,
        added_at: None,
        size: None,
        eligible: false,
        tamper_events: events_for(name),
    }));

    StatusReport {
        files,
        tamper_events,
        trusted_time: anchor.map(|a| a.last_verified_time),
        time_source: anchor.map(|a| a.source.clone()),
        time_is_stale: anchor.is_some_and(|a| a.is_stale),
        time_warning: None,
    }
}
