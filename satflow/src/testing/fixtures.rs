//! Sample configuration, stores and contexts for stage tests.
//!
//! The sample pipeline ingests `goes16` with two data services:
//!
//! | service | folder         | files                          | required |
//! |---------|----------------|--------------------------------|----------|
//! | `rad`   | `ABI-L1b-RadF` | `goes16_rad_{ts}_c{part}.nc`   | 3        |
//! | `clm`   | `ABI-L2-ACMF`  | `goes16_clm_{ts}.nc`           | 1        |
//!
//! The clock is pinned at 2024-01-01 00:15 UTC.

use crate::config::{DataServiceDescriptor, PipelineConfig};
use crate::context::StageContext;
use crate::core::{PipelineEvent, StageMeta, StageOutcome, UriProps};
use crate::naming::{FilenamePattern, FilenameRules};
use crate::params::InMemoryParameterStore;
use crate::stages::PipelinePorts;
use crate::storage::MemoryObjectStore;
use crate::utils::{FixedClock, MarkTimestamp};
use bytes::Bytes;
use chrono::Duration;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Organisation.
pub const ORG: &str = "acme";
/// Source name.
pub const SOURCE: &str = "goes16";
/// Event meta key.
pub const META_KEY: &str = "satflow";
/// Bucket instrument files land in.
pub const SOURCE_BUCKET: &str = "noaa-goes16";
/// Canonical bucket.
pub const CANONICAL_BUCKET: &str = "sat-canonical";
/// Combined-artifact bucket.
pub const ARTIFACTS_BUCKET: &str = "sat-artifacts";
/// Static-grid bucket.
pub const GRIDS_BUCKET: &str = "sat-grids";
/// Parameter-file bucket.
pub const PARAMS_BUCKET: &str = "sat-params";
/// Cold-storage bucket.
pub const COLD_BUCKET: &str = "sat-cold";
/// High-water mark parameter.
pub const HIGH_WATER_MARK: &str = "/satflow/latest-start-time";
/// Latest-available mark parameter.
pub const LATEST_AVAILABLE: &str = "/satflow/latest-available-start-time";
/// The pinned clock, as a mark.
pub const NOW: &str = "202401010015";

/// Filename rules of the sample pipeline.
#[must_use]
pub fn filename_rules() -> FilenameRules {
    let source = BTreeMap::from([
        (
            "rad".to_string(),
            vec![FilenamePattern::new(r"^goes16_rad_(?P<start_time>\d{12})_c\d+\.nc$")],
        ),
        (
            "clm".to_string(),
            vec![FilenamePattern::new(r"^goes16_clm_(?P<start_time>\d{12})\.nc$")],
        ),
    ]);
    let extractor = BTreeMap::from([(
        "raw".to_string(),
        vec![FilenamePattern::new(
            r"^(?P<source_name>[a-z0-9]+)_(?P<param>[a-z]+)_(?P<start_time>\d{12})(?:_c\d+)?(?P<ext>\.[a-z]+)$",
        )],
    )]);
    BTreeMap::from([
        (SOURCE.to_string(), source),
        ("extractor".to_string(), extractor),
    ])
}

/// The sample configuration.
#[must_use]
pub fn config() -> PipelineConfig {
    let mut config = PipelineConfig::new(ORG, SOURCE, CANONICAL_BUCKET)
        .with_event_meta_key(META_KEY)
        .with_filename_rules(filename_rules())
        .with_data_service(
            DataServiceDescriptor::new("rad", "ABI-L1b-RadF").with_required_file_count(3),
        )
        .with_data_service(
            DataServiceDescriptor::new("clm", "ABI-L2-ACMF").with_filename_filter("_clm_"),
        );
    config.buckets.artifacts = ARTIFACTS_BUCKET.to_string();
    config.buckets.static_grids = GRIDS_BUCKET.to_string();
    config.buckets.params = PARAMS_BUCKET.to_string();
    config.stages.poll.source_bucket = SOURCE_BUCKET.to_string();
    config.stages.extract.allowed_sources = vec![SOURCE.to_string()];
    config.stages.archive.destination_bucket = COLD_BUCKET.to_string();
    config
}

/// The pinned clock.
#[must_use]
pub fn clock() -> FixedClock {
    FixedClock::at_mark(NOW, Duration::zero())
        .unwrap_or_else(|e| panic!("bad fixture clock: {e}"))
}

/// A context for `stage` at the pinned time.
#[must_use]
pub fn context(stage: &str, input: PipelineEvent) -> StageContext {
    StageContext::new(stage, input, &clock())
}

/// Ports over fresh in-memory stores, returned alongside the stores.
#[must_use]
pub fn memory_ports() -> (PipelinePorts, Arc<MemoryObjectStore>, Arc<InMemoryParameterStore>) {
    let store = Arc::new(MemoryObjectStore::new());
    let params = Arc::new(InMemoryParameterStore::new());
    let ports = PipelinePorts::new(config(), store.clone(), params.clone())
        .unwrap_or_else(|e| panic!("bad fixture config: {e}"));
    (ports, store, params)
}

/// Ports over fresh in-memory stores.
#[must_use]
pub fn ports() -> PipelinePorts {
    memory_ports().0
}

/// Canonical key of a `rad` file.
#[must_use]
pub fn rad_key(ts: &str, part: u32) -> String {
    format!("{ORG}/{SOURCE}/rad/goes16_rad_{ts}_c{part}.nc")
}

/// Canonical key of a `clm` file.
#[must_use]
pub fn clm_key(ts: &str) -> String {
    format!("{ORG}/{SOURCE}/clm/goes16_clm_{ts}.nc")
}

/// Puts a `rad` file into the canonical bucket.
pub fn seed_rad(store: &MemoryObjectStore, ts: &str, part: u32) {
    store.insert(CANONICAL_BUCKET, &rad_key(ts, part), Bytes::from_static(b"rad"));
}

/// Puts a `clm` file into the canonical bucket.
pub fn seed_clm(store: &MemoryObjectStore, ts: &str) {
    store.insert(CANONICAL_BUCKET, &clm_key(ts), Bytes::from_static(b"clm"));
}

/// The wire output of a successful reconciliation at `ts`.
#[must_use]
pub fn latest_output(ts: &str) -> serde_json::Value {
    let timestamp: MarkTimestamp = ts
        .parse()
        .unwrap_or_else(|e| panic!("bad fixture timestamp {ts}: {e}"));
    let mut meta = StageMeta {
        csa_timestamp: Some(timestamp.clone()),
        ..StageMeta::default()
    };
    for service in ["rad", "clm"] {
        meta.data_service_s3_uri_props.insert(
            service.to_string(),
            UriProps(
                format!("s3://{CANONICAL_BUCKET}/{ORG}/{SOURCE}/{service}/"),
                timestamp.clone(),
            ),
        );
    }
    PipelineEvent {
        status: Some(StageOutcome::Success),
        event: serde_json::json!({}),
        meta: Some(meta),
        message: None,
        responses: None,
    }
    .to_value(META_KEY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_config_validates() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_latest_output_decodes() {
        let event = PipelineEvent::from_value(latest_output("202401010010"), META_KEY).unwrap();
        let meta = event.require_meta(META_KEY).unwrap();
        assert_eq!(meta.data_service_s3_uri_props.len(), 2);
    }
}
