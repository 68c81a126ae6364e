//! Capabilities implemented by external executables.
//!
//! The pipeline talks to a command through environment variables, stdin and
//! stdout:
//!
//! - extractor: `SATFLOW_RAW_PATH`, `SATFLOW_GRID_PATH`, `SATFLOW_WORK_DIR`;
//!   success is a zero exit status
//! - processor: a JSON [`ProcessInput`] on stdin; stdout is a JSON
//!   `{"artifact": ..., "params": [...]}`
//! - collector: `SATFLOW_WORK_DIR`; stdout is a JSON `{"params": [...]}`

use super::{Collector, Extractor, PluginRegistry, ProcessInput, ProcessOutput, Processor};
use crate::errors::CollaboratorError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

/// An executable and its fixed arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Program to run.
    pub program: String,
    /// Arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl CommandSpec {
    /// Creates a spec with no arguments.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
        }
    }

    /// Appends an argument.
    #[must_use]
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    async fn run(
        &self,
        kind: &str,
        source_name: &str,
        env: &[(&str, &Path)],
        stdin: Option<Vec<u8>>,
    ) -> Result<Vec<u8>, CollaboratorError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .envs(&self.env)
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, path) in env {
            command.env(key, path);
        }

        debug!(kind, source_name, program = %self.program, "Spawning plugin command");
        let mut child = command.spawn().map_err(|e| {
            CollaboratorError::failed(kind, source_name, format!("spawn {}: {e}", self.program))
        })?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(&input).await.map_err(|e| {
                CollaboratorError::failed(kind, source_name, format!("write stdin: {e}"))
            })?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| CollaboratorError::failed(kind, source_name, e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CollaboratorError::failed(
                kind,
                source_name,
                format!("{} exited with {}: {}", self.program, output.status, stderr.trim()),
            ));
        }
        info!(kind, source_name, program = %self.program, "Plugin command finished");
        Ok(output.stdout)
    }
}

/// Command plugins per source, as configured.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Extractors by source name.
    #[serde(default)]
    pub extractors: BTreeMap<String, CommandSpec>,
    /// Processors by source name.
    #[serde(default)]
    pub processors: BTreeMap<String, CommandSpec>,
    /// Collectors by source name.
    #[serde(default)]
    pub collectors: BTreeMap<String, CommandSpec>,
}

impl PluginConfig {
    /// Builds a registry of command plugins.
    #[must_use]
    pub fn into_registry(self) -> PluginRegistry {
        let mut registry = PluginRegistry::new();
        for (source, spec) in self.extractors {
            let plugin = Arc::new(CommandExtractor::new(source.clone(), spec));
            registry = registry.with_extractor(source, plugin);
        }
        for (source, spec) in self.processors {
            let plugin = Arc::new(CommandProcessor::new(source.clone(), spec));
            registry = registry.with_processor(source, plugin);
        }
        for (source, spec) in self.collectors {
            let plugin = Arc::new(CommandCollector::new(source.clone(), spec));
            registry = registry.with_collector(source, plugin);
        }
        registry
    }
}

/// Extractor backed by a command.
#[derive(Debug, Clone)]
pub struct CommandExtractor {
    source_name: String,
    spec: CommandSpec,
}

impl CommandExtractor {
    /// Creates a command extractor.
    #[must_use]
    pub fn new(source_name: impl Into<String>, spec: CommandSpec) -> Self {
        Self {
            source_name: source_name.into(),
            spec,
        }
    }
}

#[async_trait]
impl Extractor for CommandExtractor {
    async fn extract(
        &self,
        raw_path: &Path,
        grid_path: &Path,
        work_dir: &Path,
    ) -> Result<(), CollaboratorError> {
        self.spec
            .run(
                "extractor",
                &self.source_name,
                &[
                    ("SATFLOW_RAW_PATH", raw_path),
                    ("SATFLOW_GRID_PATH", grid_path),
                    ("SATFLOW_WORK_DIR", work_dir),
                ],
                None,
            )
            .await
            .map(|_| ())
    }
}

/// Processor backed by a command.
#[derive(Debug, Clone)]
pub struct CommandProcessor {
    source_name: String,
    spec: CommandSpec,
}

impl CommandProcessor {
    /// Creates a command processor.
    #[must_use]
    pub fn new(source_name: impl Into<String>, spec: CommandSpec) -> Self {
        Self {
            source_name: source_name.into(),
            spec,
        }
    }
}

#[async_trait]
impl Processor for CommandProcessor {
    async fn get_data(&self, input: &ProcessInput) -> Result<ProcessOutput, CollaboratorError> {
        let stdin = serde_json::to_vec(input)
            .map_err(|e| CollaboratorError::invalid_output("processor", e.to_string()))?;
        let stdout = self
            .spec
            .run(
                "processor",
                &self.source_name,
                &[("SATFLOW_WORK_DIR", input.work_dir.as_path())],
                Some(stdin),
            )
            .await?;
        serde_json::from_slice(&stdout)
            .map_err(|e| CollaboratorError::invalid_output("processor", e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct CollectorOutput {
    #[serde(default)]
    params: Vec<String>,
}

/// Collector backed by a command.
#[derive(Debug, Clone)]
pub struct CommandCollector {
    source_name: String,
    spec: CommandSpec,
}

impl CommandCollector {
    /// Creates a command collector.
    #[must_use]
    pub fn new(source_name: impl Into<String>, spec: CommandSpec) -> Self {
        Self {
            source_name: source_name.into(),
            spec,
        }
    }
}

#[async_trait]
impl Collector for CommandCollector {
    async fn get_data(&self, work_dir: &Path) -> Result<Vec<String>, CollaboratorError> {
        let stdout = self
            .spec
            .run("collector", &self.source_name, &[("SATFLOW_WORK_DIR", work_dir)], None)
            .await?;
        serde_json::from_slice::<CollectorOutput>(&stdout)
            .map(|o| o.params)
            .map_err(|e| CollaboratorError::invalid_output("collector", e.to_string()))
    }
}
