//! Plugin registry keyed by source name.

use super::{Collector, Extractor, Processor};
use crate::errors::CollaboratorError;
use std::collections::HashMap;
use std::sync::Arc;

/// Capabilities registered per source name.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    extractors: HashMap<String, Arc<dyn Extractor>>,
    processors: HashMap<String, Arc<dyn Processor>>,
    collectors: HashMap<String, Arc<dyn Collector>>,
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut extractors: Vec<_> = self.extractors.keys().collect();
        let mut processors: Vec<_> = self.processors.keys().collect();
        let mut collectors: Vec<_> = self.collectors.keys().collect();
        extractors.sort();
        processors.sort();
        collectors.sort();
        f.debug_struct("PluginRegistry")
            .field("extractors", &extractors)
            .field("processors", &processors)
            .field("collectors", &collectors)
            .finish()
    }
}

impl PluginRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an extractor.
    #[must_use]
    pub fn with_extractor(
        mut self,
        source_name: impl Into<String>,
        extractor: Arc<dyn Extractor>,
    ) -> Self {
        self.extractors.insert(source_name.into(), extractor);
        self
    }

    /// Registers a processor.
    #[must_use]
    pub fn with_processor(
        mut self,
        source_name: impl Into<String>,
        processor: Arc<dyn Processor>,
    ) -> Self {
        self.processors.insert(source_name.into(), processor);
        self
    }

    /// Registers a collector.
    #[must_use]
    pub fn with_collector(
        mut self,
        source_name: impl Into<String>,
        collector: Arc<dyn Collector>,
    ) -> Self {
        self.collectors.insert(source_name.into(), collector);
        self
    }

    /// Resolves the extractor of a source.
    pub fn extractor(&self, source_name: &str) -> Result<Arc<dyn Extractor>, CollaboratorError> {
        self.extractors
            .get(source_name)
            .cloned()
            .ok_or_else(|| CollaboratorError::not_registered("extractor", source_name))
    }

    /// Resolves the processor of a source.
    pub fn processor(&self, source_name: &str) -> Result<Arc<dyn Processor>, CollaboratorError> {
        self.processors
            .get(source_name)
            .cloned()
            .ok_or_else(|| CollaboratorError::not_registered("processor", source_name))
    }

    /// Resolves the collector of a source.
    pub fn collector(&self, source_name: &str) -> Result<Arc<dyn Collector>, CollaboratorError> {
        self.collectors
            .get(source_name)
            .cloned()
            .ok_or_else(|| CollaboratorError::not_registered("collector", source_name))
    }

    /// Returns true if no capability is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty() && self.processors.is_empty() && self.collectors.is_empty()
    }
}
