//! The pipeline event payload threaded between stages by the orchestrator.
//!
//! Wire shape:
//!
//! ```json
//! {
//!   "status": "SUCCEEDED",
//!   "event": { "...": "input passthrough" },
//!   "<event meta key>": {
//!     "data_service_s3_uri_props": { "rad": ["s3://bucket/org/src/rad/", "202401010010"] },
//!     "data_service_files": { "rad": ["bucket/org/src/rad/file.nc"] },
//!     "csa_timestamp": "202401010010"
//!   }
//! }
//! ```

use super::StageOutcome;
use crate::errors::SatflowError;
use crate::utils::MarkTimestamp;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Key of the status tag.
pub const STATUS_KEY: &str = "status";
/// Key of the passthrough input event.
pub const EVENT_KEY: &str = "event";
/// Key of the human-readable message.
pub const MESSAGE_KEY: &str = "msg";
/// Key of the per-stage response details.
pub const RESPONSES_KEY: &str = "responses";

/// A data-service source prefix paired with the timestamp to look for.
///
/// Serialized as a two-element array `[uri, timestamp]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UriProps(pub String, pub MarkTimestamp);

impl UriProps {
    /// Returns the source prefix URI.
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.0
    }

    /// Returns the timestamp.
    #[must_use]
    pub fn timestamp(&self) -> &MarkTimestamp {
        &self.1
    }
}

/// Stage metadata carried under the configured event meta key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageMeta {
    /// Per-service prefix and reconciled timestamp (LatestStage output).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data_service_s3_uri_props: BTreeMap<String, UriProps>,
    /// Per-service `bucket/key` file lists (AvailabilityGate output).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data_service_files: BTreeMap<String, Vec<String>>,
    /// The timestamp of the combined artifact being assembled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csa_timestamp: Option<MarkTimestamp>,
}

/// A decoded pipeline event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineEvent {
    /// Status tag set by the previous stage, if any.
    pub status: Option<StageOutcome>,
    /// The passthrough payload.
    pub event: serde_json::Value,
    /// Stage metadata, if present.
    pub meta: Option<StageMeta>,
    /// Message attached by the previous stage.
    pub message: Option<String>,
    /// Response details attached by the previous stage.
    pub responses: Option<serde_json::Value>,
}

impl PipelineEvent {
    /// Decodes a raw payload.
    ///
    /// Redriven executions wrap the previous stage output in an extra
    /// `event` layer; when the meta key is absent at the top level but
    /// present in the nested event, the nested event is used instead.
    pub fn from_value(value: serde_json::Value, meta_key: &str) -> Result<Self, SatflowError> {
        let value = unwrap_redrive(value, meta_key);
        let serde_json::Value::Object(mut map) = value else {
            return Err(SatflowError::InvalidEvent(
                "expected a JSON object".to_string(),
            ));
        };

        let status = match map.remove(STATUS_KEY) {
            Some(serde_json::Value::String(s)) => Some(
                s.parse::<StageOutcome>()
                    .map_err(SatflowError::InvalidEvent)?,
            ),
            Some(serde_json::Value::Null) | None => None,
            Some(other) => {
                return Err(SatflowError::InvalidEvent(format!(
                    "status must be a string, got {other}"
                )))
            }
        };
        let meta = map
            .remove(meta_key)
            .map(serde_json::from_value::<StageMeta>)
            .transpose()
            .map_err(|e| SatflowError::InvalidEvent(format!("malformed '{meta_key}': {e}")))?;
        let message = map
            .remove(MESSAGE_KEY)
            .and_then(|v| v.as_str().map(str::to_string));
        let responses = map.remove(RESPONSES_KEY);
        let event = map
            .remove(EVENT_KEY)
            .unwrap_or_else(|| serde_json::Value::Object(map));

        Ok(Self {
            status,
            event,
            meta,
            message,
            responses,
        })
    }

    /// Encodes to the wire shape.
    #[must_use]
    pub fn to_value(&self, meta_key: &str) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        if let Some(status) = self.status {
            map.insert(STATUS_KEY.to_string(), serde_json::json!(status));
        }
        map.insert(EVENT_KEY.to_string(), self.event.clone());
        if let Some(ref meta) = self.meta {
            map.insert(
                meta_key.to_string(),
                serde_json::to_value(meta).unwrap_or_default(),
            );
        }
        if let Some(ref message) = self.message {
            map.insert(MESSAGE_KEY.to_string(), serde_json::json!(message));
        }
        if let Some(ref responses) = self.responses {
            map.insert(RESPONSES_KEY.to_string(), responses.clone());
        }
        serde_json::Value::Object(map)
    }

    /// Returns the stage metadata or an error naming the missing key.
    pub fn require_meta(&self, meta_key: &str) -> Result<&StageMeta, SatflowError> {
        self.meta
            .as_ref()
            .ok_or_else(|| SatflowError::InvalidEvent(format!("missing '{meta_key}'")))
    }

    /// Re-encodes this whole event as the passthrough of a retry envelope.
    #[must_use]
    pub fn as_passthrough(&self, meta_key: &str) -> serde_json::Value {
        self.to_value(meta_key)
    }
}

/// Strips one redrive envelope if the meta key is only present inside it.
#[must_use]
pub fn unwrap_redrive(value: serde_json::Value, meta_key: &str) -> serde_json::Value {
    match value {
        serde_json::Value::Object(mut map)
            if !map.contains_key(meta_key)
                && map
                    .get(EVENT_KEY)
                    .and_then(|e| e.as_object())
                    .is_some_and(|e| e.contains_key(meta_key)) =>
        {
            map.remove(EVENT_KEY).unwrap_or_default()
        }
        other => other,
    }
}
