//! Extraction, processing and collection capabilities.
//!
//! The scientific work is opaque to the pipeline. Stages hand local file
//! paths to a capability resolved by source name from a [`PluginRegistry`]
//! built at startup, and get back the names of files written into the
//! stage's scratch directory.

mod command;
mod registry;

pub use command::{CommandCollector, CommandExtractor, CommandProcessor, CommandSpec, PluginConfig};
pub use registry::PluginRegistry;

use crate::errors::CollaboratorError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Previously produced combined artifacts handed to a processor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorArtifacts {
    /// Latest artifact from today, if any.
    pub today: Option<PathBuf>,
    /// Latest artifact from yesterday, if any.
    pub yesterday: Option<PathBuf>,
}

/// Everything a processor receives.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInput {
    /// Downloaded raw files per data service.
    pub data_files: BTreeMap<String, Vec<PathBuf>>,
    /// Downloaded static grids per grid kind.
    pub static_grids: BTreeMap<String, PathBuf>,
    /// Prior combined artifacts.
    pub prior_artifacts: PriorArtifacts,
    /// Directory outputs must be written into.
    pub work_dir: PathBuf,
}

/// Files a processor wrote into the work directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessOutput {
    /// The combined artifact filename.
    #[serde(default)]
    pub artifact: Option<String>,
    /// Parameter filenames.
    #[serde(default)]
    pub params: Vec<String>,
}

/// Extracts parameters from one raw file with a static grid.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Runs the extraction, writing outputs into `work_dir`.
    async fn extract(
        &self,
        raw_path: &Path,
        grid_path: &Path,
        work_dir: &Path,
    ) -> Result<(), CollaboratorError>;
}

/// Produces a combined artifact and parameter files.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Processor: Send + Sync {
    /// Runs the processing.
    async fn get_data(&self, input: &ProcessInput) -> Result<ProcessOutput, CollaboratorError>;
}

/// Collects parameter files from an external source.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Collector: Send + Sync {
    /// Writes parameter files into `work_dir` and returns their filenames.
    async fn get_data(&self, work_dir: &Path) -> Result<Vec<String>, CollaboratorError>;
}
