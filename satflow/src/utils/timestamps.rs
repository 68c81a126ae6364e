//! Marker timestamps and the clock abstraction.
//!
//! Marker timestamps are minute-precision UTC instants written as
//! zero-padded `YYYYMMDDHHMM` strings, so lexicographic order is
//! chronological order.

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Represents a UTC timestamp.
pub type Timestamp = DateTime<Utc>;

/// Format of marker timestamps.
pub const MARK_FORMAT: &str = "%Y%m%d%H%M";

/// Errors that can occur during timestamp parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimestampError {
    /// The value is not twelve ASCII digits.
    #[error("Invalid marker timestamp '{0}': expected 12 digits YYYYMMDDHHMM")]
    InvalidFormat(String),

    /// The digits do not name a real instant.
    #[error("Invalid marker timestamp '{0}': not a valid date/time")]
    OutOfRange(String),

    /// A filename time field did not match its declared format.
    #[error("Cannot parse '{value}' with format '{format}'")]
    Pattern {
        /// The captured value.
        value: String,
        /// The declared chrono format.
        format: String,
    },
}

/// A minute-precision marker timestamp (`YYYYMMDDHHMM`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MarkTimestamp(String);

impl MarkTimestamp {
    /// Truncates a UTC instant to the minute.
    #[must_use]
    pub fn from_datetime(dt: &Timestamp) -> Self {
        Self(dt.format(MARK_FORMAT).to_string())
    }

    /// Parses a time field captured from a filename with a chrono format,
    /// truncating to the minute.
    pub fn parse_with_format(value: &str, format: &str) -> Result<Self, TimestampError> {
        let naive = NaiveDateTime::parse_from_str(value, format).map_err(|_| {
            TimestampError::Pattern {
                value: value.to_string(),
                format: format.to_string(),
            }
        })?;
        Ok(Self::from_datetime(&Utc.from_utc_datetime(&naive)))
    }

    /// Returns the instant this timestamp names.
    #[must_use]
    pub fn to_datetime(&self) -> Timestamp {
        // Validated on construction.
        NaiveDateTime::parse_from_str(&self.0, MARK_FORMAT)
            .map(|naive| Utc.from_utc_datetime(&naive))
            .unwrap_or_default()
    }

    /// Returns how long ago this timestamp was, relative to `now`.
    ///
    /// Negative for future-dated timestamps.
    #[must_use]
    pub fn age(&self, now: &Timestamp) -> Duration {
        *now - self.to_datetime()
    }

    /// Returns the `YYYYMMDDHHMM` string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for MarkTimestamp {
    type Err = TimestampError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 12 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TimestampError::InvalidFormat(s.to_string()));
        }
        NaiveDateTime::parse_from_str(s, MARK_FORMAT)
            .map_err(|_| TimestampError::OutOfRange(s.to_string()))?;
        Ok(Self(s.to_string()))
    }
}

impl fmt::Display for MarkTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for MarkTimestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for MarkTimestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Source of the current time, injected so stages are testable.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Returns the current UTC time.
    fn now(&self) -> Timestamp;
}

/// The system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// A clock frozen at a fixed instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub Timestamp);

impl FixedClock {
    /// Creates a fixed clock from a marker timestamp string plus an offset.
    pub fn at_mark(mark: &str, offset: Duration) -> Result<Self, TimestampError> {
        let mark: MarkTimestamp = mark.parse()?;
        Ok(Self(mark.to_datetime() + offset))
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        self.0
    }
}

/// Returns the current UTC timestamp.
#[must_use]
pub fn now_utc() -> Timestamp {
    Utc::now()
}
