//! Utility types for marker timestamps, clocks and execution ids.

pub mod timestamps;

pub use timestamps::{
    now_utc, Clock, FixedClock, MarkTimestamp, SystemClock, Timestamp, TimestampError,
    MARK_FORMAT,
};

/// Generates a time-ordered execution id (UUID v7).
#[must_use]
pub fn generate_execution_id() -> uuid::Uuid {
    uuid::Uuid::now_v7()
}
