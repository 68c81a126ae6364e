//! Stage output type with factory methods per outcome.

use super::{PipelineEvent, StageMeta, StageOutcome};
use crate::errors::SatflowError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The output of a stage invocation.
///
/// `StageOutput` carries the outcome explicitly; the wire status string is
/// only derived when the output is encoded for the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOutput {
    /// The outcome of the invocation.
    pub outcome: StageOutcome,

    /// Metadata for downstream stages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<StageMeta>,

    /// Human-readable explanation (failures, skips, bomb-outs).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Error classification code, for failures caused by an error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,

    /// Per-stage response details (copied keys, uploaded artifacts, ...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, serde_json::Value>,
}

impl StageOutput {
    fn new(outcome: StageOutcome) -> Self {
        Self {
            outcome,
            meta: None,
            message: None,
            error_code: None,
            details: BTreeMap::new(),
        }
    }

    /// Creates a successful output carrying metadata.
    #[must_use]
    pub fn success(meta: StageMeta) -> Self {
        Self::new(StageOutcome::Success).with_meta(meta)
    }

    /// Creates a successful output with no metadata.
    #[must_use]
    pub fn success_empty() -> Self {
        Self::new(StageOutcome::Success)
    }

    /// Creates a retryable failure.
    #[must_use]
    pub fn retryable(message: impl Into<String>) -> Self {
        Self::new(StageOutcome::Retryable).with_message(message)
    }

    /// Creates a terminal (bomb-out) output.
    #[must_use]
    pub fn terminal(message: impl Into<String>) -> Self {
        Self::new(StageOutcome::Terminal).with_message(message)
    }

    /// Creates a skip output with a reason.
    #[must_use]
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::new(StageOutcome::Skipped).with_message(reason)
    }

    /// Creates the output an error maps to.
    #[must_use]
    pub fn from_error(error: &SatflowError) -> Self {
        let mut output = Self::new(error.outcome()).with_message(error.to_string());
        output.error_code = Some(error.code().to_string());
        output
    }

    /// Sets the metadata.
    #[must_use]
    pub fn with_meta(mut self, meta: StageMeta) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Sets the message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Adds a single detail entry.
    #[must_use]
    pub fn add_detail(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.details.insert(key.into(), value);
        self
    }

    /// Returns true if the output indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    /// Returns true if the orchestrator should retry.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.outcome.is_retryable()
    }

    /// Gets a detail value.
    #[must_use]
    pub fn detail(&self, key: &str) -> Option<&serde_json::Value> {
        self.details.get(key)
    }

    /// Builds the pipeline event handed back to the orchestrator.
    #[must_use]
    pub fn into_pipeline_event(self, passthrough: serde_json::Value) -> PipelineEvent {
        let responses = if self.details.is_empty() && self.error_code.is_none() {
            None
        } else {
            let mut map: serde_json::Map<String, serde_json::Value> =
                self.details.into_iter().collect();
            if let Some(code) = self.error_code {
                map.insert("error_code".to_string(), serde_json::json!(code));
            }
            Some(serde_json::Value::Object(map))
        };

        PipelineEvent {
            status: Some(self.outcome),
            event: passthrough,
            meta: self.meta,
            message: self.message,
            responses,
        }
    }
}
