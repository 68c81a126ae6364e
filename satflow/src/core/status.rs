//! Stage outcome tag.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The outcome of a stage invocation.
///
/// Serialized with the status strings the orchestrator branches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageOutcome {
    /// The stage completed; downstream stages may proceed.
    #[serde(rename = "SUCCEEDED")]
    Success,
    /// The stage could not complete yet; the orchestrator retries it.
    #[serde(rename = "FAILED")]
    Retryable,
    /// The execution was superseded by a newer one and must stop.
    #[serde(rename = "BOMB-OUT")]
    Terminal,
    /// Nothing to do for this input.
    #[serde(rename = "SKIPPING")]
    Skipped,
}

impl StageOutcome {
    /// Returns the wire status string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "SUCCEEDED",
            Self::Retryable => "FAILED",
            Self::Terminal => "BOMB-OUT",
            Self::Skipped => "SKIPPING",
        }
    }

    /// Returns true if the execution ends with this outcome.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Terminal | Self::Skipped)
    }

    /// Returns true if the outcome indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success | Self::Skipped)
    }

    /// Returns true if the orchestrator should invoke the stage again.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable)
    }
}

impl fmt::Display for StageOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUCCEEDED" => Ok(Self::Success),
            "FAILED" => Ok(Self::Retryable),
            "BOMB-OUT" => Ok(Self::Terminal),
            "SKIPPING" => Ok(Self::Skipped),
            other => Err(format!("unknown stage status '{other}'")),
        }
    }
}
