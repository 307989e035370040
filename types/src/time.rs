//! Timestamp type used throughout the station.
//!
//! Timestamps are Unix epoch seconds (UTC). On the wire they travel as fixed
//! width `YYYY-MM-DD HH:MM:SS` text, which sorts lexicographically in the same
//! order as the underlying seconds.

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::TypesError;

/// `strftime` pattern of the textual wire form.
pub const WIRE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const WIRE_LEN: usize = 19;

/// A Unix timestamp in seconds since epoch (UTC).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The epoch (time zero). Stands in for "never issued".
    pub const EPOCH: Self = Self(0);

    /// Largest timestamp with a four-digit year (`9999-12-31 23:59:59`).
    pub const MAX_WIRE: Self = Self(253_402_300_799);

    pub fn new(secs: u64) -> Self {
        Self(secs)
    }

    /// Get the current system time as a `Timestamp`.
    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self(secs)
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }

    /// The smallest timestamp strictly after this one.
    pub fn next_tick(&self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Seconds elapsed since this timestamp (relative to `now`).
    pub fn elapsed_since(&self, now: Timestamp) -> u64 {
        now.0.saturating_sub(self.0)
    }

    /// Whether this timestamp + duration has passed relative to `now`.
    pub fn has_expired(&self, duration_secs: u64, now: Timestamp) -> bool {
        now.0 >= self.0.saturating_add(duration_secs)
    }

    /// Render in the `YYYY-MM-DD HH:MM:SS` wire form.
    pub fn to_wire(&self) -> Result<String, TypesError> {
        if *self > Self::MAX_WIRE {
            return Err(TypesError::TimestampOutOfRange(self.0));
        }
        let dt = DateTime::from_timestamp(self.0 as i64, 0)
            .ok_or(TypesError::TimestampOutOfRange(self.0))?;
        Ok(dt.format(WIRE_FORMAT).to_string())
    }

    /// Parse the `YYYY-MM-DD HH:MM:SS` wire form.
    ///
    /// The shape is checked strictly before handing off to chrono, so
    /// unpadded fields like `2024-1-5 9:00:00` are refused: a short field
    /// would break lexicographic ordering of payloads.
    pub fn parse_wire(s: &str) -> Result<Self, TypesError> {
        let invalid = || TypesError::InvalidTimestamp {
            input: s.to_string(),
        };
        if !has_wire_shape(s) {
            return Err(invalid());
        }
        let naive = NaiveDateTime::parse_from_str(s, WIRE_FORMAT).map_err(|_| invalid())?;
        let secs = naive.and_utc().timestamp();
        u64::try_from(secs).map(Self).map_err(|_| invalid())
    }
}

fn has_wire_shape(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() == WIRE_LEN
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            10 => *b == b' ',
            13 | 16 => *b == b':',
            _ => b.is_ascii_digit(),
        })
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_wire() {
            Ok(text) => f.write_str(&text),
            Err(_) => write!(f, "{}s", self.0),
        }
    }
}
