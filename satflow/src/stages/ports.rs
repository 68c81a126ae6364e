//! Injected capabilities shared by every stage.

use crate::config::PipelineConfig;
use crate::errors::ConfigError;
use crate::naming::FilenameMetaReader;
use crate::params::{MarkStore, ParameterStore};
use crate::plugins::PluginRegistry;
use crate::readers::ReaderRegistry;
use crate::scratch::ScratchDir;
use crate::storage::ObjectStoreClient;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration plus the collaborators stages talk to.
///
/// Built once at startup; stages hold it behind an `Arc`.
#[derive(Clone)]
pub struct PipelinePorts {
    /// Validated configuration.
    pub config: Arc<PipelineConfig>,
    /// Object storage.
    pub objects: Arc<dyn ObjectStoreClient>,
    /// Parameter storage holding the marker records.
    pub params: Arc<dyn ParameterStore>,
    /// Compiled filename rules.
    pub filename_meta: Arc<FilenameMetaReader>,
    /// File readers by name.
    pub readers: ReaderRegistry,
    /// Extraction, processing and collection capabilities.
    pub plugins: PluginRegistry,
    /// Parent of per-invocation scratch directories.
    pub scratch_root: Option<PathBuf>,
}

impl std::fmt::Debug for PipelinePorts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelinePorts")
            .field("org", &self.config.org)
            .field("source_name", &self.config.source_name)
            .field("objects", &self.objects)
            .field("params", &self.params)
            .field("readers", &self.readers)
            .field("plugins", &self.plugins)
            .field("scratch_root", &self.scratch_root)
            .finish()
    }
}

impl PipelinePorts {
    /// Validates the configuration and compiles its filename rules.
    pub fn new(
        config: PipelineConfig,
        objects: Arc<dyn ObjectStoreClient>,
        params: Arc<dyn ParameterStore>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let filename_meta = Arc::new(FilenameMetaReader::new(&config.filename_rules)?);
        Ok(Self {
            config: Arc::new(config),
            objects,
            params,
            filename_meta,
            readers: ReaderRegistry::new(),
            plugins: PluginRegistry::new(),
            scratch_root: None,
        })
    }

    /// Sets the reader registry.
    #[must_use]
    pub fn with_readers(mut self, readers: ReaderRegistry) -> Self {
        self.readers = readers;
        self
    }

    /// Sets the plugin registry.
    #[must_use]
    pub fn with_plugins(mut self, plugins: PluginRegistry) -> Self {
        self.plugins = plugins;
        self
    }

    /// Sets the scratch root.
    #[must_use]
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    /// The key stage metadata travels under.
    #[must_use]
    pub fn meta_key(&self) -> &str {
        &self.config.event_meta_key
    }

    /// Listing page size.
    #[must_use]
    pub fn page_size(&self) -> usize {
        self.config.listing_page_size
    }

    /// The high-water mark record.
    #[must_use]
    pub fn high_water_marks(&self) -> MarkStore {
        MarkStore::new(
            Arc::clone(&self.params),
            self.config.markers.high_water_mark_param.clone(),
        )
    }

    /// The latest-available mark record.
    #[must_use]
    pub fn latest_available_marks(&self) -> MarkStore {
        MarkStore::new(
            Arc::clone(&self.params),
            self.config.markers.latest_available_param.clone(),
        )
    }

    /// Creates a scratch directory for one invocation.
    pub fn scratch(&self) -> std::io::Result<ScratchDir> {
        ScratchDir::new(self.scratch_root.as_deref())
    }
}
