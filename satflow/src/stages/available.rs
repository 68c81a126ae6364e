//! Availability gating.
//!
//! The gate runs in three steps:
//!
//! 1. **Bomb-out check**: if the latest-available mark already records a
//!    newer timestamp for any participating service, a newer batch has
//!    overtaken this execution and it stops for good.
//! 2. **Claim**: the candidate is written to the latest-available mark
//!    before any file is counted.
//! 3. **Verify**: each service must show at least its required number of
//!    files for the exact candidate timestamp. A shortfall returns `FAILED`
//!    for the orchestrator to retry; the claim stays in place.
//!
//! Claiming first means that of two racing executions the older one sees
//! the newer claim on its next attempt and bombs out instead of waiting on
//! files that will never be processed.

use super::{finish, PipelinePorts, Stage};
use crate::context::StageContext;
use crate::core::{StageMeta, StageOutput, UriProps};
use crate::errors::SatflowError;
use crate::events::NotificationKind;
use crate::params::Marks;
use crate::readers::{list_matching_files, FileReader};
use crate::storage::S3Uri;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Gates downstream work on a minimum file count per service.
#[derive(Debug, Clone)]
pub struct AvailabilityGate {
    ports: Arc<PipelinePorts>,
}

#[derive(Debug)]
struct Shortfall {
    service: String,
    found: usize,
    required: usize,
}

impl AvailabilityGate {
    /// Creates the stage.
    #[must_use]
    pub fn new(ports: Arc<PipelinePorts>) -> Self {
        Self { ports }
    }

    fn reader_for(&self, service: &str) -> Result<Option<Arc<dyn FileReader>>, SatflowError> {
        let Some(descriptor) = self.ports.config.data_service(service) else {
            return Err(SatflowError::InvalidEvent(format!(
                "unknown data service '{service}'"
            )));
        };
        match descriptor.reader_hint.as_deref() {
            None => Ok(None),
            Some(hint) => self.ports.readers.get(hint).map(Some).ok_or_else(|| {
                SatflowError::MissingResource(format!("no reader registered as '{hint}'"))
            }),
        }
    }

    async fn find_files(
        &self,
        service: &str,
        props: &UriProps,
        reader: Option<&Arc<dyn FileReader>>,
    ) -> Result<Vec<String>, SatflowError> {
        let uri: S3Uri = props.uri().parse()?;
        let files = match reader {
            Some(reader) => reader.find_files(&uri, service, props.timestamp()).await?,
            None => {
                list_matching_files(
                    self.ports.objects.as_ref(),
                    &self.ports.filename_meta,
                    &self.ports.config.source_name,
                    &uri,
                    service,
                    props.timestamp(),
                    self.ports.page_size(),
                )
                .await?
            }
        };
        Ok(files)
    }

    async fn run(&self, ctx: &StageContext) -> Result<StageOutput, SatflowError> {
        let meta = ctx.input().require_meta(self.ports.meta_key())?;
        let props = &meta.data_service_s3_uri_props;
        if props.is_empty() {
            return Err(SatflowError::InvalidEvent(
                "no data_service_s3_uri_props to gate on".to_string(),
            ));
        }
        let candidate = match meta.csa_timestamp.clone() {
            Some(ts) => ts,
            None => props
                .values()
                .map(|p| p.timestamp().clone())
                .max()
                .ok_or_else(|| SatflowError::InvalidEvent("no candidate timestamp".to_string()))?,
        };

        let readers = props
            .keys()
            .map(|service| Ok((service.clone(), self.reader_for(service)?)))
            .collect::<Result<BTreeMap<_, _>, SatflowError>>()?;

        let marks_store = self.ports.latest_available_marks();
        let claimed = marks_store.load().await?;
        if let Some((service, mark)) = props.iter().find_map(|(service, p)| {
            claimed
                .get(service)
                .filter(|mark| *mark > p.timestamp())
                .map(|mark| (service, mark))
        }) {
            let message = format!(
                "'{service}' already claimed {mark}, newer than candidate {candidate}"
            );
            info!(%candidate, %service, %mark, "Bombing out, superseded by a newer batch");
            ctx.notify(
                NotificationKind::BombOut,
                serde_json::json!({"service": service, "claimed": mark, "candidate": candidate}),
            )
            .await;
            return Err(SatflowError::Stale(message));
        }

        let updates: Marks = props
            .iter()
            .map(|(service, p)| (service.clone(), p.timestamp().clone()))
            .collect();
        let advance = marks_store.advance(&updates).await?;
        if advance.changed {
            info!(%candidate, "Claimed candidate timestamp");
            ctx.notify(
                NotificationKind::TimestampClaimed,
                serde_json::json!({"parameter": marks_store.name(), "timestamp": candidate}),
            )
            .await;
        } else {
            debug!(%candidate, "Candidate already claimed");
        }

        let mut files = BTreeMap::new();
        let mut shortfalls = Vec::new();
        for (service, p) in props {
            let found = self.find_files(service, p, readers[service].as_ref()).await?;
            let required = self
                .ports
                .config
                .data_service(service)
                .map_or(1, |d| d.required_file_count);
            debug!(service, found = found.len(), required, "Counted files");
            if found.len() < required {
                shortfalls.push(Shortfall {
                    service: service.clone(),
                    found: found.len(),
                    required,
                });
            }
            files.insert(service.clone(), found);
        }

        if !shortfalls.is_empty() {
            for reader in readers.values().flatten() {
                reader.invalidate_cache();
            }
            let summary: Vec<String> = shortfalls
                .iter()
                .map(|s| format!("{}: {} of {}", s.service, s.found, s.required))
                .collect();
            warn!(%candidate, shortfalls = ?summary, "Files not yet available");
            let counts: BTreeMap<&str, usize> = files
                .iter()
                .map(|(service, found)| (service.as_str(), found.len()))
                .collect();
            return Ok(StageOutput::retryable(format!(
                "files not yet available for {candidate}: {}",
                summary.join(", ")
            ))
            .add_detail("file_counts", serde_json::to_value(counts)?));
        }

        info!(%candidate, services = files.len(), "All files available");
        Ok(StageOutput::success(StageMeta {
            data_service_files: files,
            csa_timestamp: Some(candidate),
            ..StageMeta::default()
        }))
    }
}

#[async_trait]
impl Stage for AvailabilityGate {
    fn name(&self) -> &str {
        "available"
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        finish(self.name(), self.run(ctx).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{PipelineEvent, StageOutcome};
    use crate::events::CollectingEventSink;
    use crate::readers::{ListingReader, ReaderRegistry};
    use crate::testing::assert_bombed_out;
    use crate::testing::fixtures::{self, CANONICAL_BUCKET};
    use pretty_assertions::assert_eq;

    fn gate_input(ts: &str) -> PipelineEvent {
        PipelineEvent::from_value(fixtures::latest_output(ts), fixtures::META_KEY).unwrap()
    }

    #[tokio::test]
    async fn test_claims_then_succeeds() {
        let (ports, store, params) = fixtures::memory_ports();
        for part in 1..=3 {
            fixtures::seed_rad(&store, "202401010010", part);
        }
        fixtures::seed_clm(&store, "202401010010");
        fixtures::seed_clm(&store, "202401010000");
        let gate = AvailabilityGate::new(Arc::new(ports));
        let sink = Arc::new(CollectingEventSink::new());
        let ctx =
            fixtures::context("available", gate_input("202401010010")).with_events(sink.clone());

        let output = gate.execute(&ctx).await;

        assert_eq!(output.outcome, StageOutcome::Success);
        let meta = output.meta.unwrap();
        assert_eq!(meta.data_service_files["rad"].len(), 3);
        assert_eq!(
            meta.data_service_files["clm"],
            vec![format!("{CANONICAL_BUCKET}/acme/goes16/clm/goes16_clm_202401010010.nc")]
        );
        assert_eq!(meta.csa_timestamp.unwrap().as_str(), "202401010010");
        assert_eq!(
            params.value(fixtures::LATEST_AVAILABLE).unwrap(),
            r#"{"clm":"202401010010","rad":"202401010010"}"#
        );
        assert_eq!(sink.of_kind(NotificationKind::TimestampClaimed).len(), 1);
    }

    #[tokio::test]
    async fn test_shortfall_claims_once() {
        let (ports, store, params) = fixtures::memory_ports();
        fixtures::seed_rad(&store, "202401010010", 1);
        fixtures::seed_clm(&store, "202401010010");
        let gate = AvailabilityGate::new(Arc::new(ports));
        let ctx = fixtures::context("available", gate_input("202401010010"));

        let first = gate.execute(&ctx).await;
        let second = gate.execute(&ctx).await;

        assert_eq!(first.outcome, StageOutcome::Retryable);
        assert_eq!(second.outcome, StageOutcome::Retryable);
        assert_eq!(params.write_count(fixtures::LATEST_AVAILABLE), 1);
        assert_eq!(first.detail("file_counts").unwrap()["rad"], 1);
        assert!(first.message.unwrap().contains("rad: 1 of 3"));
    }

    #[tokio::test]
    async fn test_bombs_out_when_superseded() {
        let (ports, _, params) = fixtures::memory_ports();
        params.seed(fixtures::LATEST_AVAILABLE, r#"{"rad":"202401010020"}"#);
        let gate = AvailabilityGate::new(Arc::new(ports));
        let sink = Arc::new(CollectingEventSink::new());
        let ctx =
            fixtures::context("available", gate_input("202401010010")).with_events(sink.clone());

        let output = gate.execute(&ctx).await;

        assert_bombed_out(&output);
        assert_eq!(output.error_code.as_deref(), Some("STALENESS_DETECTED"));
        assert_eq!(params.write_count(fixtures::LATEST_AVAILABLE), 0);
        assert_eq!(sink.of_kind(NotificationKind::BombOut).len(), 1);
    }

    #[tokio::test]
    async fn test_equal_claim_is_not_a_bomb_out() {
        let (ports, store, params) = fixtures::memory_ports();
        params.seed(
            fixtures::LATEST_AVAILABLE,
            r#"{"clm":"202401010010","rad":"202401010010"}"#,
        );
        for part in 1..=3 {
            fixtures::seed_rad(&store, "202401010010", part);
        }
        fixtures::seed_clm(&store, "202401010010");
        let gate = AvailabilityGate::new(Arc::new(ports));

        let output = gate
            .execute(&fixtures::context("available", gate_input("202401010010")))
            .await;

        assert!(output.is_success());
        assert_eq!(params.write_count(fixtures::LATEST_AVAILABLE), 0);
    }

    #[tokio::test]
    async fn test_reader_cache_invalidated_on_shortfall() {
        let (ports, store, _) = fixtures::memory_ports();
        let reader = Arc::new(ListingReader::new(
            "listing",
            store.clone(),
            Arc::clone(&ports.filename_meta),
            fixtures::SOURCE,
            100,
        ));
        let mut config = ports.config.as_ref().clone();
        for service in &mut config.data_services {
            service.reader_hint = Some("listing".to_string());
        }
        let ports = PipelinePorts {
            config: Arc::new(config),
            ..ports
        }
        .with_readers(ReaderRegistry::new().with_reader(reader.clone()));
        fixtures::seed_rad(&store, "202401010010", 1);
        fixtures::seed_clm(&store, "202401010010");
        let gate = AvailabilityGate::new(Arc::new(ports));
        let ctx = fixtures::context("available", gate_input("202401010010"));

        let output = gate.execute(&ctx).await;
        assert!(output.is_retryable());
        assert_eq!(reader.cached_listings(), 0);

        fixtures::seed_rad(&store, "202401010010", 2);
        fixtures::seed_rad(&store, "202401010010", 3);
        let output = gate.execute(&ctx).await;
        assert!(output.is_success());
        assert_eq!(reader.cached_listings(), 2);
    }

    #[tokio::test]
    async fn test_missing_meta_is_invalid() {
        let (ports, _, _) = fixtures::memory_ports();
        let gate = AvailabilityGate::new(Arc::new(ports));

        let output = gate
            .execute(&fixtures::context("available", PipelineEvent::default()))
            .await;

        assert_eq!(output.error_code.as_deref(), Some("INVALID_EVENT"));
    }

    #[tokio::test]
    async fn test_parameter_failure_is_retryable() {
        let (ports, _, params) = fixtures::memory_ports();
        params.set_fail_reads(true);
        let gate = AvailabilityGate::new(Arc::new(ports));

        let output = gate
            .execute(&fixtures::context("available", gate_input("202401010010")))
            .await;

        assert_eq!(output.outcome, StageOutcome::Retryable);
        assert_eq!(output.error_code.as_deref(), Some("TRANSIENT_STORE"));
    }
}
