//! Error types for the satflow stages.
//!
//! Every failure a stage can hit is classified here, and each class knows
//! which [`StageOutcome`] it turns into. Stages return `Result<_, SatflowError>`
//! internally; the runner converts errors into outcomes so nothing panics
//! across the orchestrator boundary.

use crate::core::StageOutcome;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for satflow operations.
#[derive(Debug, Error)]
pub enum SatflowError {
    /// Required configuration is missing or invalid.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// An object-store call failed.
    #[error("{0}")]
    Store(#[from] StoreError),

    /// A parameter-store call failed.
    #[error("{0}")]
    Parameter(#[from] ParameterError),

    /// An extraction/processing/collection plugin failed.
    #[error("{0}")]
    Collaborator(#[from] CollaboratorError),

    /// No timestamp could be reconciled across the data services.
    #[error("Reconciliation impossible: {0}")]
    Reconciliation(String),

    /// A newer batch has already been claimed; this execution is superseded.
    #[error("Superseded: {0}")]
    Stale(String),

    /// The stage input payload was malformed.
    #[error("Invalid pipeline event: {0}")]
    InvalidEvent(String),

    /// A resource the stage depends on could not be found.
    #[error("Missing resource: {0}")]
    MissingResource(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SatflowError {
    /// Returns the outcome this error maps to.
    ///
    /// Everything is retryable by the orchestrator except a superseded
    /// execution, which must stop.
    #[must_use]
    pub fn outcome(&self) -> StageOutcome {
        match self {
            Self::Stale(_) => StageOutcome::Terminal,
            _ => StageOutcome::Retryable,
        }
    }

    /// Returns a short classification code used in logs and payloads.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIGURATION",
            Self::Store(_) | Self::Parameter(_) => "TRANSIENT_STORE",
            Self::Collaborator(_) => "DOWNSTREAM_COLLABORATOR",
            Self::Reconciliation(_) => "RECONCILIATION_IMPOSSIBLE",
            Self::Stale(_) => "STALENESS_DETECTED",
            Self::InvalidEvent(_) => "INVALID_EVENT",
            Self::MissingResource(_) => "MISSING_RESOURCE",
            Self::Serialization(_) => "SERIALIZATION",
            Self::Io(_) => "IO",
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("code".to_string(), serde_json::json!(self.code()));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map
    }
}

/// Configuration errors. Fatal: the process aborts before any stage runs.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required setting is absent.
    #[error("Missing configuration: {0}")]
    Missing(String),

    /// A setting is present but unusable.
    #[error("Invalid configuration for '{field}': {reason}")]
    Invalid {
        /// The offending setting.
        field: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The configuration file could not be read.
    #[error("Failed to read configuration '{path}': {source}")]
    Io {
        /// Path that was read.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ConfigError {
    /// Creates an invalid-setting error.
    #[must_use]
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised by object-store clients.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The object or bucket does not exist.
    #[error("Object not found: {bucket}/{key}")]
    NotFound {
        /// The bucket.
        bucket: String,
        /// The key.
        key: String,
    },

    /// The call failed for a reason that may clear on retry.
    #[error("Object store call '{operation}' failed: {message}")]
    Transient {
        /// The operation attempted (list, get, put, copy, exists).
        operation: String,
        /// Backend message.
        message: String,
    },

    /// A URI could not be split into bucket and key.
    #[error("Invalid object URI: {0}")]
    InvalidUri(String),

    /// A listing page claimed more results but gave no continuation token.
    #[error("Truncated listing without continuation token for {bucket}/{prefix}")]
    TruncatedListing {
        /// The bucket.
        bucket: String,
        /// The prefix.
        prefix: String,
    },

    /// The backend cannot honour a requested option.
    #[error("Object store call '{operation}' is unsupported: {reason}")]
    Unsupported {
        /// The operation attempted.
        operation: String,
        /// What could not be honoured.
        reason: String,
    },

    /// Local file IO while staging downloads/uploads.
    #[error("Local IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Creates a transient error for an operation.
    #[must_use]
    pub fn transient(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transient {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates an unsupported-option error.
    #[must_use]
    pub fn unsupported(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Returns true if this is a definite not-found.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Errors raised by parameter-store clients.
#[derive(Debug, Error)]
pub enum ParameterError {
    /// The backend call failed.
    #[error("Parameter store call on '{name}' failed: {message}")]
    Backend {
        /// The parameter name.
        name: String,
        /// Backend message.
        message: String,
    },

    /// The stored value was not a valid marker mapping.
    #[error("Parameter '{name}' holds a malformed value: {reason}")]
    Malformed {
        /// The parameter name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },
}

impl ParameterError {
    /// Creates a backend error.
    #[must_use]
    pub fn backend(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Errors raised by extraction, processing and collection plugins.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum CollaboratorError {
    /// No plugin is registered for the source.
    #[error("No {kind} registered for source '{source_name}'")]
    NotRegistered {
        /// Plugin kind (extractor, processor, collector).
        kind: String,
        /// The source name.
        source_name: String,
    },

    /// The plugin ran and failed.
    #[error("{kind} for '{source_name}' failed: {reason}")]
    Failed {
        /// Plugin kind.
        kind: String,
        /// The source name.
        source_name: String,
        /// The failure reason.
        reason: String,
    },

    /// The plugin returned output that could not be interpreted.
    #[error("{kind} returned invalid output: {reason}")]
    InvalidOutput {
        /// Plugin kind.
        kind: String,
        /// Why it was rejected.
        reason: String,
    },
}

impl CollaboratorError {
    /// Creates a not-registered error.
    #[must_use]
    pub fn not_registered(kind: impl Into<String>, source_name: impl Into<String>) -> Self {
        Self::NotRegistered {
            kind: kind.into(),
            source_name: source_name.into(),
        }
    }

    /// Creates a failed error.
    #[must_use]
    pub fn failed(
        kind: impl Into<String>,
        source_name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Failed {
            kind: kind.into(),
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid-output error.
    #[must_use]
    pub fn invalid_output(kind: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidOutput {
            kind: kind.into(),
            reason: reason.into(),
        }
    }
}

/// Convenience result alias.
pub type Result<T, E = SatflowError> = std::result::Result<T, E>;
