//! Pipeline configuration.
//!
//! Everything a stage needs is carried by [`PipelineConfig`], loaded once at
//! startup from JSON and validated before any stage logic runs.

use crate::errors::ConfigError;
use crate::naming::{FilenameMetaReader, FilenameRules, PollLayout};
use crate::plugins::PluginConfig;
use crate::storage::{BucketWriteSettings, StoreLocation};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

/// Environment variable holding a path to the JSON configuration.
pub const CONFIG_PATH_ENV: &str = "SATFLOW_CONFIG";
/// Environment variable holding inline JSON configuration.
pub const CONFIG_JSON_ENV: &str = "SATFLOW_CONFIG_JSON";

/// Immutable description of one data service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataServiceDescriptor {
    /// Service name (`rad`, `clm`, ...); also the filename-rule file type.
    pub name: String,
    /// Folder in the source bucket that the service lands in.
    pub source_folder: String,
    /// Substring a source filename must contain to be polled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename_filter: Option<String>,
    /// Minimum number of files required for a timestamp.
    #[serde(default = "default_required_file_count")]
    pub required_file_count: usize,
    /// Name of a registered file reader used by the availability gate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reader_hint: Option<String>,
}

fn default_required_file_count() -> usize {
    1
}

impl DataServiceDescriptor {
    /// Creates a descriptor requiring one file.
    #[must_use]
    pub fn new(name: impl Into<String>, source_folder: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source_folder: source_folder.into(),
            filename_filter: None,
            required_file_count: default_required_file_count(),
            reader_hint: None,
        }
    }

    /// Sets the filename filter.
    #[must_use]
    pub fn with_filename_filter(mut self, filter: impl Into<String>) -> Self {
        self.filename_filter = Some(filter.into());
        self
    }

    /// Sets the required file count.
    #[must_use]
    pub fn with_required_file_count(mut self, count: usize) -> Self {
        self.required_file_count = count;
        self
    }

    /// Sets the reader hint.
    #[must_use]
    pub fn with_reader_hint(mut self, hint: impl Into<String>) -> Self {
        self.reader_hint = Some(hint.into());
        self
    }

    /// Returns true if a source filename passes the filter.
    #[must_use]
    pub fn accepts(&self, filename: &str) -> bool {
        self.filename_filter
            .as_deref()
            .map_or(true, |f| filename.contains(f))
    }
}

/// Names of the marker parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerConfig {
    /// Parameter holding the high-water mark.
    #[serde(default = "default_high_water_mark_param")]
    pub high_water_mark_param: String,
    /// Parameter holding the latest-available mark.
    #[serde(default = "default_latest_available_param")]
    pub latest_available_param: String,
}

fn default_high_water_mark_param() -> String {
    "/satflow/latest-start-time".to_string()
}

fn default_latest_available_param() -> String {
    "/satflow/latest-available-start-time".to_string()
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            high_water_mark_param: default_high_water_mark_param(),
            latest_available_param: default_latest_available_param(),
        }
    }
}

/// Buckets shared by several stages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketConfig {
    /// Bucket holding the canonical per-service layout.
    pub canonical: String,
    /// Bucket holding combined artifacts (`csa/...`).
    #[serde(default)]
    pub artifacts: String,
    /// Bucket holding static grids.
    #[serde(default)]
    pub static_grids: String,
    /// Bucket receiving parameter files.
    #[serde(default)]
    pub params: String,
}

/// Poll stage settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollConfig {
    /// Bucket the instrument files land in.
    #[serde(default)]
    pub source_bucket: String,
    /// Folder layout of the source bucket.
    #[serde(default)]
    pub layout: PollLayout,
    /// Storage class applied to canonical copies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
}

/// Latest stage settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestConfig {
    /// Candidates older than this are rejected.
    #[serde(default = "default_freshness_minutes")]
    pub freshness_minutes: i64,
}

fn default_freshness_minutes() -> i64 {
    60
}

impl Default for LatestConfig {
    fn default() -> Self {
        Self {
            freshness_minutes: default_freshness_minutes(),
        }
    }
}

impl LatestConfig {
    /// Returns the freshness cutoff.
    #[must_use]
    pub fn freshness(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.freshness_minutes)
    }
}

/// Static grid coordinates shared by extraction and processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticGridConfig {
    /// Deployment branch folder.
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Package folder.
    #[serde(default = "default_package")]
    pub package: String,
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_package() -> String {
    "sih_lion".to_string()
}

impl Default for StaticGridConfig {
    fn default() -> Self {
        Self {
            branch: default_branch(),
            package: default_package(),
        }
    }
}

/// Extract stage settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// Sources that are extracted; everything else is skipped.
    #[serde(default)]
    pub allowed_sources: Vec<String>,
    /// Grid kind folder.
    #[serde(default = "default_extract_kind")]
    pub static_grid_kind: String,
    /// Grid code used in grid filenames.
    #[serde(default = "default_grid_code")]
    pub grid_code: String,
}

fn default_extract_kind() -> String {
    "extractor".to_string()
}

fn default_grid_code() -> String {
    "sg".to_string()
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            allowed_sources: Vec::new(),
            static_grid_kind: default_extract_kind(),
            grid_code: default_grid_code(),
        }
    }
}

/// Process stage settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessConfig {
    /// Folder above the per-source grid folders.
    #[serde(default = "default_process_kind")]
    pub static_grid_kind: String,
    /// Grid sub-folders, one grid each.
    #[serde(default = "default_grid_kinds")]
    pub grid_kinds: Vec<String>,
    /// Extension grids must carry.
    #[serde(default = "default_grid_extension")]
    pub grid_extension: String,
    /// Key prefix for uploaded parameter files.
    #[serde(default = "default_param_prefix")]
    pub param_prefix: String,
}

fn default_process_kind() -> String {
    "satellite".to_string()
}

fn default_grid_kinds() -> Vec<String> {
    ["geolocation", "scan_time_offset", "vaa", "vza"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_grid_extension() -> String {
    ".npy".to_string()
}

fn default_param_prefix() -> String {
    "params".to_string()
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            static_grid_kind: default_process_kind(),
            grid_kinds: default_grid_kinds(),
            grid_extension: default_grid_extension(),
            param_prefix: default_param_prefix(),
        }
    }
}

/// Archive stage settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Cold-storage bucket.
    #[serde(default)]
    pub destination_bucket: String,
    /// Storage class of archived copies.
    #[serde(default = "default_archive_storage_class")]
    pub storage_class: String,
}

fn default_archive_storage_class() -> String {
    "GLACIER_IR".to_string()
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            destination_bucket: String::new(),
            storage_class: default_archive_storage_class(),
        }
    }
}

/// Checksum attached to uploads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChecksumAlgorithm {
    /// SHA-256.
    #[default]
    Sha256,
    /// MD5.
    Md5,
}

impl std::fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sha256 => write!(f, "SHA256"),
            Self::Md5 => write!(f, "MD5"),
        }
    }
}

/// Upload settings for artifacts and parameter files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Checksum algorithm.
    #[serde(default)]
    pub checksum_algorithm: ChecksumAlgorithm,
    /// Tags applied to every upload.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// KMS key for server-side encryption of uploads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kms_key_id: Option<String>,
    /// Whether KMS encryption uses an S3 bucket key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket_key: Option<bool>,
    /// Account that must own the upload buckets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_bucket_owner: Option<String>,
}

impl UploadConfig {
    /// Server-side settings for the buckets uploads land in.
    #[must_use]
    pub fn write_settings(&self) -> BucketWriteSettings {
        BucketWriteSettings {
            kms_key_id: self.kms_key_id.clone(),
            bucket_key: self.bucket_key,
            expected_bucket_owner: self.expected_bucket_owner.clone(),
        }
    }
}

/// Per-stage settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageConfigs {
    /// Poll stage.
    #[serde(default)]
    pub poll: PollConfig,
    /// Latest stage.
    #[serde(default)]
    pub latest: LatestConfig,
    /// Extract stage.
    #[serde(default)]
    pub extract: ExtractConfig,
    /// Process stage.
    #[serde(default)]
    pub process: ProcessConfig,
    /// Archive stage.
    #[serde(default)]
    pub archive: ArchiveConfig,
}

/// Where the binary finds its collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Object storage location.
    #[serde(default)]
    pub storage: StoreLocation,
    /// Directory of the file-backed parameter store.
    #[serde(default = "default_parameters_dir")]
    pub parameters_dir: PathBuf,
    /// Parent of scratch directories; the system temp dir when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<PathBuf>,
    /// Command plugins.
    #[serde(default)]
    pub plugins: PluginConfig,
}

fn default_parameters_dir() -> PathBuf {
    PathBuf::from(".satflow/params")
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            storage: StoreLocation::default(),
            parameters_dir: default_parameters_dir(),
            scratch_dir: None,
            plugins: PluginConfig::default(),
        }
    }
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Organisation prefix of canonical keys.
    pub org: String,
    /// Source (satellite) name.
    pub source_name: String,
    /// Deployment environment used in artifact keys.
    #[serde(default = "default_deploy_env")]
    pub deploy_env: String,
    /// Key under which stage metadata travels in pipeline events.
    #[serde(default = "default_event_meta_key")]
    pub event_meta_key: String,
    /// Data services, in configuration order.
    pub data_services: Vec<DataServiceDescriptor>,
    /// Filename rules by group and file type.
    #[serde(default)]
    pub filename_rules: FilenameRules,
    /// Marker parameter names.
    #[serde(default)]
    pub markers: MarkerConfig,
    /// Shared buckets.
    pub buckets: BucketConfig,
    /// Static grid coordinates.
    #[serde(default)]
    pub static_grids: StaticGridConfig,
    /// Per-stage settings.
    #[serde(default)]
    pub stages: StageConfigs,
    /// Upload settings.
    #[serde(default)]
    pub upload: UploadConfig,
    /// Maximum keys per listing page.
    #[serde(default = "default_page_size")]
    pub listing_page_size: usize,
    /// Collaborator wiring for the binary.
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

fn default_deploy_env() -> String {
    "dev".to_string()
}

fn default_event_meta_key() -> String {
    "satflow".to_string()
}

fn default_page_size() -> usize {
    1000
}

impl PipelineConfig {
    /// Creates a configuration with defaults for everything optional.
    #[must_use]
    pub fn new(
        org: impl Into<String>,
        source_name: impl Into<String>,
        canonical_bucket: impl Into<String>,
    ) -> Self {
        Self {
            org: org.into(),
            source_name: source_name.into(),
            deploy_env: default_deploy_env(),
            event_meta_key: default_event_meta_key(),
            data_services: Vec::new(),
            filename_rules: FilenameRules::new(),
            markers: MarkerConfig::default(),
            buckets: BucketConfig {
                canonical: canonical_bucket.into(),
                ..BucketConfig::default()
            },
            static_grids: StaticGridConfig::default(),
            stages: StageConfigs::default(),
            upload: UploadConfig::default(),
            listing_page_size: default_page_size(),
            runtime: RuntimeConfig::default(),
        }
    }

    /// Adds a data service.
    #[must_use]
    pub fn with_data_service(mut self, service: DataServiceDescriptor) -> Self {
        self.data_services.push(service);
        self
    }

    /// Sets the filename rules.
    #[must_use]
    pub fn with_filename_rules(mut self, rules: FilenameRules) -> Self {
        self.filename_rules = rules;
        self
    }

    /// Sets the deployment environment.
    #[must_use]
    pub fn with_deploy_env(mut self, env: impl Into<String>) -> Self {
        self.deploy_env = env.into();
        self
    }

    /// Sets the event meta key.
    #[must_use]
    pub fn with_event_meta_key(mut self, key: impl Into<String>) -> Self {
        self.event_meta_key = key.into();
        self
    }

    /// Sets the stage settings.
    #[must_use]
    pub fn with_stages(mut self, stages: StageConfigs) -> Self {
        self.stages = stages;
        self
    }

    /// Sets the listing page size.
    #[must_use]
    pub fn with_listing_page_size(mut self, size: usize) -> Self {
        self.listing_page_size = size;
        self
    }

    /// Sets the runtime wiring.
    #[must_use]
    pub fn with_runtime(mut self, runtime: RuntimeConfig) -> Self {
        self.runtime = runtime;
        self
    }

    /// Looks up a data service by name.
    #[must_use]
    pub fn data_service(&self, name: &str) -> Option<&DataServiceDescriptor> {
        self.data_services.iter().find(|s| s.name == name)
    }

    /// Parses and validates JSON configuration.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    /// Loads configuration from `SATFLOW_CONFIG` or `SATFLOW_CONFIG_JSON`.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Self::from_file(path);
        }
        if let Ok(json) = std::env::var(CONFIG_JSON_ENV) {
            return Self::from_json(&json);
        }
        Err(ConfigError::Missing(format!(
            "set {CONFIG_PATH_ENV} or {CONFIG_JSON_ENV}"
        )))
    }

    /// Checks the configuration for settings no stage can run without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.org.trim().is_empty() {
            return Err(ConfigError::Missing("org".to_string()));
        }
        if self.source_name.trim().is_empty() {
            return Err(ConfigError::Missing("source_name".to_string()));
        }
        if self.event_meta_key.trim().is_empty() {
            return Err(ConfigError::Missing("event_meta_key".to_string()));
        }
        if self.buckets.canonical.trim().is_empty() {
            return Err(ConfigError::Missing("buckets.canonical".to_string()));
        }
        if self.data_services.is_empty() {
            return Err(ConfigError::Missing("data_services".to_string()));
        }
        if self.listing_page_size == 0 {
            return Err(ConfigError::invalid("listing_page_size", "must be positive"));
        }
        if self.stages.latest.freshness_minutes <= 0 {
            return Err(ConfigError::invalid(
                "stages.latest.freshness_minutes",
                "must be positive",
            ));
        }

        let mut seen = HashSet::new();
        for service in &self.data_services {
            if service.name.trim().is_empty() {
                return Err(ConfigError::Missing("data_services[].name".to_string()));
            }
            if !seen.insert(service.name.as_str()) {
                return Err(ConfigError::invalid(
                    "data_services",
                    format!("duplicate service '{}'", service.name),
                ));
            }
            if service.required_file_count == 0 {
                return Err(ConfigError::invalid(
                    format!("data_services.{}.required_file_count", service.name),
                    "must be at least 1",
                ));
            }
        }

        self.validate_upload()?;
        FilenameMetaReader::new(&self.filename_rules)?;
        Ok(())
    }

    fn validate_upload(&self) -> Result<(), ConfigError> {
        let upload = &self.upload;
        if self.runtime.storage.is_s3() && upload.checksum_algorithm != ChecksumAlgorithm::Sha256 {
            return Err(ConfigError::invalid(
                "upload.checksum_algorithm",
                format!(
                    "{} is not supported by S3 storage; use SHA256",
                    upload.checksum_algorithm
                ),
            ));
        }
        if upload.kms_key_id.as_deref().is_some_and(|k| k.trim().is_empty()) {
            return Err(ConfigError::invalid("upload.kms_key_id", "must not be empty"));
        }
        if upload.bucket_key.is_some() && upload.kms_key_id.is_none() {
            return Err(ConfigError::invalid("upload.bucket_key", "requires upload.kms_key_id"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::FilenamePattern;
    use pretty_assertions::assert_eq;

    fn sample_json() -> &'static str {
        r#"{
            "org": "acme",
            "source_name": "goes16",
            "buckets": {"canonical": "sat-data"},
            "data_services": [
                {"name": "rad", "source_folder": "ABI-L1b-RadF", "required_file_count": 3},
                {"name": "clm", "source_folder": "ABI-L2-ACMF", "filename_filter": "ACM"}
            ],
            "stages": {
                "poll": {"source_bucket": "noaa-goes16", "layout": {"type": "day_of_year_hourly", "hours": 2}}
            },
            "upload": {"checksum_algorithm": "MD5", "tags": {"team": "sat"}},
            "runtime": {"storage": {"type": "local", "root": "/srv/buckets"}}
        }"#
    }

    #[test]
    fn test_parse_with_defaults() {
        let config = PipelineConfig::from_json(sample_json()).unwrap();

        assert_eq!(config.deploy_env, "dev");
        assert_eq!(config.event_meta_key, "satflow");
        assert_eq!(config.listing_page_size, 1000);
        assert_eq!(config.stages.latest.freshness_minutes, 60);
        assert_eq!(config.stages.archive.storage_class, "GLACIER_IR");
        assert_eq!(config.stages.process.grid_kinds.len(), 4);
        assert_eq!(config.upload.checksum_algorithm, ChecksumAlgorithm::Md5);
        assert_eq!(config.data_service("clm").unwrap().required_file_count, 1);
        assert_eq!(config.data_service("rad").unwrap().required_file_count, 3);
    }

    #[test]
    fn test_runtime_section() {
        let mut value: serde_json::Value = serde_json::from_str(sample_json()).unwrap();
        value["runtime"] = serde_json::json!({
            "storage": {"type": "local", "root": "/srv/buckets"},
            "plugins": {"processors": {"goes16": {"program": "goes-process"}}}
        });
        let config = PipelineConfig::from_json(&value.to_string()).unwrap();

        assert_eq!(
            config.runtime.storage,
            StoreLocation::Local {
                root: PathBuf::from("/srv/buckets")
            }
        );
        assert_eq!(config.runtime.parameters_dir, PathBuf::from(".satflow/params"));
        assert_eq!(config.runtime.plugins.processors["goes16"].program, "goes-process");
        let defaults = PipelineConfig::from_json(sample_json()).unwrap();
        assert!(defaults.runtime.plugins.processors.is_empty());
    }

    #[test]
    fn test_descriptor_filter() {
        let service = DataServiceDescriptor::new("clm", "f").with_filename_filter("ACM");
        assert!(service.accepts("OR_ABI-L2-ACMF-M6_G16.nc"));
        assert!(!service.accepts("OR_ABI-L1b-RadF.nc"));
        assert!(DataServiceDescriptor::new("rad", "f").accepts("anything"));
    }

    #[test]
    fn test_validate_rejects_missing_services() {
        let config = PipelineConfig::new("acme", "goes16", "sat-data");
        assert!(matches!(config.validate(), Err(ConfigError::Missing(_))));
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let config = PipelineConfig::new("acme", "goes16", "sat-data")
            .with_data_service(DataServiceDescriptor::new("rad", "a"))
            .with_data_service(DataServiceDescriptor::new("rad", "b"));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate service 'rad'"));
    }

    #[test]
    fn test_validate_rejects_zero_count() {
        let config = PipelineConfig::new("acme", "goes16", "sat-data")
            .with_data_service(DataServiceDescriptor::new("rad", "a").with_required_file_count(0));
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_validate_rejects_bad_pattern() {
        let mut rules = FilenameRules::new();
        rules
            .entry("goes16".to_string())
            .or_default()
            .insert("rad".to_string(), vec![FilenamePattern::new("[")]);
        let config = PipelineConfig::new("acme", "goes16", "sat-data")
            .with_data_service(DataServiceDescriptor::new("rad", "a"))
            .with_filename_rules(rules);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_md5_on_s3() {
        let mut value: serde_json::Value = serde_json::from_str(sample_json()).unwrap();
        value["runtime"] = serde_json::json!({"storage": {"type": "s3"}});

        let err = PipelineConfig::from_json(&value.to_string()).unwrap_err();

        assert!(err.to_string().contains("upload.checksum_algorithm"));
        value["upload"]["checksum_algorithm"] = serde_json::json!("SHA256");
        assert!(PipelineConfig::from_json(&value.to_string()).is_ok());
    }

    #[test]
    fn test_upload_encryption_settings() {
        let mut value: serde_json::Value = serde_json::from_str(sample_json()).unwrap();
        value["upload"] = serde_json::json!({
            "kms_key_id": "arn:aws:kms:us-east-1:123456789012:key/abc",
            "bucket_key": true,
            "expected_bucket_owner": "123456789012"
        });
        let config = PipelineConfig::from_json(&value.to_string()).unwrap();

        let settings = config.upload.write_settings();
        assert_eq!(
            settings.kms_key_id.as_deref(),
            Some("arn:aws:kms:us-east-1:123456789012:key/abc")
        );
        assert_eq!(settings.bucket_key, Some(true));
        assert_eq!(settings.expected_bucket_owner.as_deref(), Some("123456789012"));

        value["upload"] = serde_json::json!({"bucket_key": true});
        let err = PipelineConfig::from_json(&value.to_string()).unwrap_err();
        assert!(err.to_string().contains("upload.bucket_key"));
    }

    #[test]
    fn test_from_file_missing() {
        let err = PipelineConfig::from_file("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, sample_json().as_bytes()).unwrap();
        let config = PipelineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.org, "acme");
    }

    #[test]
    fn test_malformed_json() {
        let err = PipelineConfig::from_json("{").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
