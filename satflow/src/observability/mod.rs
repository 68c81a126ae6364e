//! Observability utilities.

mod tracing;

pub use tracing::{init_logging, stage_span, LogFormat, SpanTimer, StageSpanAttributes};
