//! Structured logging setup and stage span helpers.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Once;
use std::time::Instant;
use tracing::Span;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// JSON lines, for log aggregation.
    Json,
}

/// Initializes the global subscriber on stderr. Later calls are no-ops.
///
/// `RUST_LOG` controls the filter; `default_filter` applies when it is unset.
pub fn init_logging(format: LogFormat, default_filter: &str) {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
        let registry = tracing_subscriber::registry().with(filter);
        let result = match format {
            LogFormat::Json => registry
                .with(
                    fmt::layer()
                        .json()
                        .with_current_span(true)
                        .with_writer(std::io::stderr),
                )
                .try_init(),
            LogFormat::Text => registry
                .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
                .try_init(),
        };
        if let Err(e) = result {
            eprintln!("logging already initialised: {e}");
        }
    });
}

/// Creates the span every stage run executes in.
#[must_use]
pub fn stage_span(stage: &str, execution_id: &str) -> Span {
    tracing::info_span!("stage", stage = stage, execution_id = execution_id)
}

/// Attributes recorded when a stage run ends.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageSpanAttributes {
    /// Stage name.
    pub stage_name: String,
    /// Wire status.
    pub status: Option<String>,
    /// Duration in milliseconds.
    pub duration_ms: Option<f64>,
    /// Error code, for failures caused by an error.
    pub error_code: Option<String>,
}

impl StageSpanAttributes {
    /// Creates attributes for a stage.
    #[must_use]
    pub fn new(stage_name: impl Into<String>) -> Self {
        Self {
            stage_name: stage_name.into(),
            ..Default::default()
        }
    }

    /// Sets the status.
    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Sets the duration.
    #[must_use]
    pub fn with_duration_ms(mut self, duration_ms: f64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Sets the error code.
    #[must_use]
    pub fn with_error_code(mut self, code: Option<String>) -> Self {
        self.error_code = code;
        self
    }

    /// Flattens into dotted key/value pairs.
    #[must_use]
    pub fn to_attributes(&self) -> HashMap<String, String> {
        let mut attrs = HashMap::new();
        attrs.insert("stage.name".to_string(), self.stage_name.clone());
        if let Some(ref v) = self.status {
            attrs.insert("stage.status".to_string(), v.clone());
        }
        if let Some(v) = self.duration_ms {
            attrs.insert("stage.duration_ms".to_string(), format!("{v:.3}"));
        }
        if let Some(ref v) = self.error_code {
            attrs.insert("stage.error_code".to_string(), v.clone());
        }
        attrs
    }
}

/// Simple span timing helper.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
    name: String,
}

impl SpanTimer {
    /// Starts a timer.
    #[must_use]
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Returns the timer name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stops the timer and returns the duration in milliseconds.
    #[must_use]
    pub fn finish(self) -> f64 {
        self.elapsed_ms()
    }
}
