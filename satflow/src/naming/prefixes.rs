//! Time-windowed source prefixes scanned by the poll stage.

use crate::utils::Timestamp;
use chrono::{Duration, DurationRound, Timelike};
use serde::{Deserialize, Serialize};

/// How a source bucket lays out its folders over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum PollLayout {
    /// Fast-cadence sources: `{folder}/%Y/%m/%d/%H%M` per sub-hour bucket.
    SubHourly {
        /// Bucket width in minutes.
        #[serde(default = "default_interval_minutes")]
        interval_minutes: u32,
        /// Number of trailing buckets scanned.
        #[serde(default = "default_buckets")]
        buckets: u32,
    },
    /// Slow-cadence sources: `{folder}/%Y/%j/%H` per hour.
    DayOfYearHourly {
        /// Number of trailing hours scanned.
        #[serde(default = "default_hours")]
        hours: u32,
    },
}

fn default_interval_minutes() -> u32 {
    10
}

fn default_buckets() -> u32 {
    6
}

fn default_hours() -> u32 {
    2
}

impl Default for PollLayout {
    fn default() -> Self {
        Self::DayOfYearHourly {
            hours: default_hours(),
        }
    }
}

impl PollLayout {
    /// Builds the prefixes to scan for one source folder, newest first.
    ///
    /// Each bucket is formatted with its own date, so windows that cross
    /// midnight land in the previous day's folder.
    #[must_use]
    pub fn prefixes(&self, folder: &str, now: &Timestamp) -> Vec<String> {
        let folder = folder.trim_end_matches('/');
        match *self {
            Self::SubHourly {
                interval_minutes,
                buckets,
            } => {
                let interval = Duration::minutes(i64::from(interval_minutes.max(1)));
                let start = now
                    .with_second(0)
                    .and_then(|t| t.with_nanosecond(0))
                    .and_then(|t| t.duration_trunc(interval).ok())
                    .unwrap_or(*now);
                (0..buckets)
                    .map(|i| {
                        let at = start - interval * i32::try_from(i).unwrap_or(i32::MAX);
                        format!("{folder}/{}/", at.format("%Y/%m/%d/%H%M"))
                    })
                    .collect()
            }
            Self::DayOfYearHourly { hours } => (0..hours)
                .map(|i| {
                    let at = *now - Duration::hours(i64::from(i));
                    format!("{folder}/{}/", at.format("%Y/%j/%H"))
                })
                .collect(),
        }
    }
}
