//! Hand-written plugins that write real files and record their calls.
//!
//! The generated `mockall` mocks cover single-stage expectations; these are
//! for flows that run several stages against the same registry.

use crate::errors::CollaboratorError;
use crate::plugins::{Collector, Extractor, ProcessInput, ProcessOutput, Processor};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};

/// Extractor that records its inputs and writes one output file.
#[derive(Debug, Default)]
pub struct RecordingExtractor {
    calls: Mutex<Vec<(PathBuf, PathBuf)>>,
}

impl RecordingExtractor {
    /// Creates the extractor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw and grid filenames of every call.
    #[must_use]
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls
            .lock()
            .iter()
            .map(|(raw, grid)| (file_name(raw), file_name(grid)))
            .collect()
    }
}

#[async_trait]
impl Extractor for RecordingExtractor {
    async fn extract(
        &self,
        raw_path: &Path,
        grid_path: &Path,
        work_dir: &Path,
    ) -> Result<(), CollaboratorError> {
        self.calls
            .lock()
            .push((raw_path.to_path_buf(), grid_path.to_path_buf()));
        std::fs::write(work_dir.join("extracted.json"), b"{}")
            .map_err(|e| CollaboratorError::failed("extractor", "test", e.to_string()))
    }
}

/// Processor that writes a fixed artifact and parameter set.
#[derive(Debug)]
pub struct FixedProcessor {
    artifact: String,
    params: Vec<String>,
    inputs: Mutex<Vec<ProcessInput>>,
}

impl FixedProcessor {
    /// Creates a processor producing `artifact` and `params`.
    #[must_use]
    pub fn new(artifact: impl Into<String>, params: &[&str]) -> Self {
        Self {
            artifact: artifact.into(),
            params: params.iter().map(|p| (*p).to_string()).collect(),
            inputs: Mutex::new(Vec::new()),
        }
    }

    /// Inputs of every call.
    #[must_use]
    pub fn inputs(&self) -> Vec<ProcessInput> {
        self.inputs.lock().clone()
    }
}

#[async_trait]
impl Processor for FixedProcessor {
    async fn get_data(&self, input: &ProcessInput) -> Result<ProcessOutput, CollaboratorError> {
        self.inputs.lock().push(input.clone());
        for name in std::iter::once(&self.artifact).chain(&self.params) {
            std::fs::write(input.work_dir.join(name), name.as_bytes())
                .map_err(|e| CollaboratorError::failed("processor", "test", e.to_string()))?;
        }
        Ok(ProcessOutput {
            artifact: Some(self.artifact.clone()),
            params: self.params.clone(),
        })
    }
}

/// Collector that fails every call.
#[derive(Debug, Default)]
pub struct FailingCollector;

#[async_trait]
impl Collector for FailingCollector {
    async fn get_data(&self, _work_dir: &Path) -> Result<Vec<String>, CollaboratorError> {
        Err(CollaboratorError::failed("collector", "test", "upstream unavailable"))
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
