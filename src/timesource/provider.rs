//! External time providers.
//!
//! A provider answers one question: "what is the current unix time?"
//! `HttpTimeProvider` asks a public HTTPS endpoint; `ManualTimeProvider`
//! is driven by the caller and serves tests and air-gapped setups.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::TimeSourceError;

/// Seconds between 1601-01-01 (FILETIME epoch) and 1970-01-01.
const FILETIME_EPOCH_OFFSET: i64 = 11_644_473_600;

/// FILETIME ticks per second (100 ns resolution).
const FILETIME_TICKS_PER_SEC: i64 = 10_000_000;

const USER_AGENT: &str = concat!("chronovault/", env!("CARGO_PKG_VERSION"));

/// Anything that can report the current unix time.
pub trait TimeProvider: Send + Sync {
    /// Short identifier recorded as the anchor's `source`.
    fn name(&self) -> &str;

    /// Fetch the current unix time, giving up after `timeout`.
    fn fetch(&self, timeout: Duration) -> Result<u64, TimeSourceError>;
}

/// How to extract a timestamp from a provider's response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    /// JSON body with an integer `unixtime` field.
    UnixtimeJson,
    /// JSON body with a UTC `dateTime` string (`YYYY-MM-DDTHH:MM:SS[.f]`).
    TimeapiIo,
    /// JSON body with a Windows FILETIME `currentFileTime` field.
    FiletimeJson,
    /// RFC 2822 `Date` response header.
    HttpDate,
}

/// Extract unix seconds from a JSON body.
pub fn parse_json_time(format: ResponseFormat, body: &serde_json::Value) -> Option<u64> {
    let seconds = match format {
        ResponseFormat::UnixtimeJson => body.get("unixtime")?.as_i64()?,
        ResponseFormat::TimeapiIo => {
            let raw = body.get("dateTime")?.as_str()?;
            match DateTime::parse_from_rfc3339(raw) {
                Ok(dt) => dt.timestamp(),
                Err(_) => NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()?
                    .and_utc()
                    .timestamp(),
            }
        }
        ResponseFormat::FiletimeJson => {
            let ticks = body.get("currentFileTime")?.as_i64()?;
            ticks / FILETIME_TICKS_PER_SEC - FILETIME_EPOCH_OFFSET
        }
        ResponseFormat::HttpDate => return None,
    };
    u64::try_from(seconds).ok()
}

/// Parse an RFC 2822 HTTP `Date` header into unix seconds.
pub fn parse_http_date(value: &str) -> Option<u64> {
    let dt = DateTime::parse_from_rfc2822(value.trim()).ok()?;
    u64::try_from(dt.timestamp()).ok()
}

/// Queries a public HTTPS time endpoint.
#[derive(Debug, Clone)]
pub struct HttpTimeProvider {
    name: String,
    url: String,
    format: ResponseFormat,
}

impl HttpTimeProvider {
    pub fn new(name: impl Into<String>, url: impl Into<String>, format: ResponseFormat) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            format,
        }
    }

    fn invalid(&self, reason: impl Into<String>) -> TimeSourceError {
        TimeSourceError::InvalidResponse {
            provider: self.name.clone(),
            reason: reason.into(),
        }
    }

    /// Map transport errors onto the distinctions users need to see.
    fn classify(&self, err: &ureq::Error) -> TimeSourceError {
        let provider = self.name.clone();
        match err {
            ureq::Error::StatusCode(status) => TimeSourceError::Rejected {
                provider,
                status: *status,
            },
            ureq::Error::Timeout(_) => TimeSourceError::Timeout { provider },
            ureq::Error::Io(io) if io.kind() == std::io::ErrorKind::TimedOut => {
                TimeSourceError::Timeout { provider }
            }
            ureq::Error::HostNotFound | ureq::Error::ConnectionFailed | ureq::Error::Io(_) => {
                TimeSourceError::NoNetwork {
                    provider,
                    reason: err.to_string(),
                }
            }
            other => TimeSourceError::InvalidResponse {
                provider,
                reason: other.to_string(),
            },
        }
    }
}

impl TimeProvider for HttpTimeProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self, timeout: Duration) -> Result<u64, TimeSourceError> {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();

        let mut response = agent
            .get(&self.url)
            .header("User-Agent", USER_AGENT)
            .call()
            .map_err(|e| self.classify(&e))?;

        if self.format == ResponseFormat::HttpDate {
            let value = response
                .headers()
                .get("date")
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| self.invalid("missing Date header"))?;
            return parse_http_date(value).ok_or_else(|| self.invalid(format!("bad Date header '{value}'")));
        }

        let body: serde_json::Value = response
            .body_mut()
            .read_json()
            .map_err(|e| self.classify(&e))?;
        parse_json_time(self.format, &body).ok_or_else(|| self.invalid("no timestamp in response body"))
    }
}

/// A provider whose answer is set by the caller.
pub struct ManualTimeProvider {
    name: String,
    now: AtomicU64,
    failure: Mutex<Option<TimeSourceError>>,
}

impl ManualTimeProvider {
    pub fn new(now: u64) -> Self {
        Self::named("manual", now)
    }

    pub fn named(name: impl Into<String>, now: u64) -> Self {
        Self {
            name: name.into(),
            now: AtomicU64::new(now),
            failure: Mutex::new(None),
        }
    }

    pub fn now(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }

    pub fn set(&self, now: u64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }

    /// Make every following fetch fail with `err` until `recover` is called.
    pub fn fail_with(&self, err: TimeSourceError) {
        *self.failure.lock().unwrap_or_else(|p| p.into_inner()) = Some(err);
    }

    pub fn recover(&self) {
        *self.failure.lock().unwrap_or_else(|p| p.into_inner()) = None;
    }
}

impl TimeProvider for ManualTimeProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self, _timeout: Duration) -> Result<u64, TimeSourceError> {
        if let Some(err) = self.failure.lock().unwrap_or_else(|p| p.into_inner()).clone() {
            return Err(err);
        }
        Ok(self.now())
    }
}
