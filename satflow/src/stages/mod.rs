//! Stage trait and the pipeline stages.
//!
//! Each stage is an independently invoked, retryable unit of work. A stage
//! never panics across the orchestrator boundary: it returns a
//! [`StageOutput`] whose outcome tells the orchestrator what to do next.

mod archive;
mod available;
mod collect;
mod extract;
mod latest;
mod poll;
mod ports;
mod process;
mod upload;

#[cfg(test)]
mod integration_tests;

pub use archive::ArchiveStage;
pub use available::AvailabilityGate;
pub use collect::CollectStage;
pub use extract::ExtractStage;
pub use latest::{reconcile, LatestStage};
pub use poll::{PollStage, PollStats};
pub use ports::PipelinePorts;
pub use process::ProcessStage;
pub use upload::{UploadFailure, UploadItem, UploadReceipt, UploadReport, Uploader};

use crate::context::StageContext;
use crate::core::StageOutput;
use crate::errors::{ConfigError, SatflowError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::str::FromStr;
use std::sync::Arc;

/// Trait for pipeline stages.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Returns the name of the stage.
    fn name(&self) -> &str;

    /// Executes the stage.
    async fn execute(&self, ctx: &StageContext) -> StageOutput;
}

/// Converts a stage result into an output, logging errors.
pub(crate) fn finish(stage: &str, result: Result<StageOutput, SatflowError>) -> StageOutput {
    match result {
        Ok(output) => output,
        Err(e) => {
            tracing::warn!(stage, code = e.code(), error = %e, "Stage failed");
            StageOutput::from_error(&e)
        }
    }
}

/// The stages this crate provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    /// Copy newly landed source objects into the canonical layout.
    Poll,
    /// Reconcile a common timestamp and advance the high-water mark.
    Latest,
    /// Claim a timestamp and wait for its files.
    Available,
    /// Extract one raw object against its static grid.
    Extract,
    /// Run the processor and upload its outputs.
    Process,
    /// Move yesterday's combined artifact to cold storage.
    Archive,
    /// Run the collector and upload parameter files.
    Collect,
}

impl StageKind {
    /// Every stage, in pipeline order.
    pub const ALL: [Self; 7] = [
        Self::Poll,
        Self::Latest,
        Self::Available,
        Self::Extract,
        Self::Process,
        Self::Archive,
        Self::Collect,
    ];

    /// Returns the stage name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Poll => "poll",
            Self::Latest => "latest",
            Self::Available => "available",
            Self::Extract => "extract",
            Self::Process => "process",
            Self::Archive => "archive",
            Self::Collect => "collect",
        }
    }

    /// Builds the stage over shared ports.
    #[must_use]
    pub fn build(self, ports: Arc<PipelinePorts>) -> Arc<dyn Stage> {
        match self {
            Self::Poll => Arc::new(PollStage::new(ports)),
            Self::Latest => Arc::new(LatestStage::new(ports)),
            Self::Available => Arc::new(AvailabilityGate::new(ports)),
            Self::Extract => Arc::new(ExtractStage::new(ports)),
            Self::Process => Arc::new(ProcessStage::new(ports)),
            Self::Archive => Arc::new(ArchiveStage::new(ports)),
            Self::Collect => Arc::new(CollectStage::new(ports)),
        }
    }

    /// Checks that everything this stage needs is configured and registered.
    pub fn validate(self, ports: &PipelinePorts) -> Result<(), ConfigError> {
        let config = &ports.config;
        let require = |value: &str, field: &str| {
            if value.trim().is_empty() {
                Err(ConfigError::Missing(field.to_string()))
            } else {
                Ok(())
            }
        };

        match self {
            Self::Poll => require(&config.stages.poll.source_bucket, "stages.poll.source_bucket"),
            Self::Latest => Ok(()),
            Self::Available => ports.readers.ensure_registered(
                config
                    .data_services
                    .iter()
                    .filter_map(|s| s.reader_hint.as_deref()),
            ),
            Self::Extract => {
                require(&config.buckets.static_grids, "buckets.static_grids")?;
                for source in &config.stages.extract.allowed_sources {
                    ports
                        .plugins
                        .extractor(source)
                        .map_err(|e| ConfigError::invalid("plugins.extractors", e.to_string()))?;
                }
                Ok(())
            }
            Self::Process => {
                require(&config.buckets.static_grids, "buckets.static_grids")?;
                require(&config.buckets.artifacts, "buckets.artifacts")?;
                require(&config.buckets.params, "buckets.params")?;
                ports
                    .plugins
                    .processor(&config.source_name)
                    .map(|_| ())
                    .map_err(|e| ConfigError::invalid("plugins.processors", e.to_string()))
            }
            Self::Archive => {
                require(&config.buckets.artifacts, "buckets.artifacts")?;
                require(
                    &config.stages.archive.destination_bucket,
                    "stages.archive.destination_bucket",
                )
            }
            Self::Collect => {
                require(&config.buckets.params, "buckets.params")?;
                ports
                    .plugins
                    .collector(&config.source_name)
                    .map(|_| ())
                    .map_err(|e| ConfigError::invalid("plugins.collectors", e.to_string()))
            }
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown stage '{s}'"))
    }
}
