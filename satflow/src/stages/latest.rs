//! High-water-mark reconciliation.

use super::{finish, PipelinePorts, Stage};
use crate::context::StageContext;
use crate::core::{StageMeta, StageOutput, UriProps};
use crate::errors::SatflowError;
use crate::events::NotificationKind;
use crate::naming::canonical_prefix;
use crate::params::Marks;
use crate::storage::{list_keys, S3Uri};
use crate::utils::MarkTimestamp;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Returns the greatest timestamp present in every set.
///
/// `None` when there are no sets or their intersection is empty.
#[must_use]
pub fn reconcile(sets: &[BTreeSet<MarkTimestamp>]) -> Option<MarkTimestamp> {
    let smallest = sets.iter().min_by_key(|s| s.len())?;
    smallest
        .iter()
        .rev()
        .find(|ts| sets.iter().all(|set| set.contains(*ts)))
        .cloned()
}

/// Picks the newest timestamp every data service has fresh data for and
/// advances the high-water mark to it.
///
/// Nothing is written unless a candidate survives every check: each service
/// has timestamps newer than its mark, the sets intersect, the candidate is
/// newer than every stored mark, and it is within the freshness cutoff.
#[derive(Debug, Clone)]
pub struct LatestStage {
    ports: Arc<PipelinePorts>,
}

impl LatestStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(ports: Arc<PipelinePorts>) -> Self {
        Self { ports }
    }

    async fn qualifying(
        &self,
        service: &str,
        mark: Option<&MarkTimestamp>,
    ) -> Result<BTreeSet<MarkTimestamp>, SatflowError> {
        let config = &self.ports.config;
        let prefix = canonical_prefix(&config.org, &config.source_name, service);
        let keys = list_keys(
            self.ports.objects.as_ref(),
            &config.buckets.canonical,
            &prefix,
            self.ports.page_size(),
        )
        .await?;

        let set: BTreeSet<MarkTimestamp> = keys
            .iter()
            .filter_map(|key| {
                self.ports
                    .filename_meta
                    .start_time(&config.source_name, key, service)
            })
            .filter(|ts| mark.map_or(true, |m| ts > m))
            .collect();
        debug!(
            service,
            listed = keys.len(),
            qualifying = set.len(),
            ?mark,
            "Qualifying timestamps"
        );
        Ok(set)
    }

    async fn run(&self, ctx: &StageContext) -> Result<StageOutput, SatflowError> {
        let config = &self.ports.config;
        let marks_store = self.ports.high_water_marks();
        let stored = marks_store.load().await?;

        let mut sets = Vec::with_capacity(config.data_services.len());
        for service in &config.data_services {
            let set = self.qualifying(&service.name, stored.get(&service.name)).await?;
            if set.is_empty() {
                return Err(SatflowError::Reconciliation(format!(
                    "'{}' has no timestamps newer than {}",
                    service.name,
                    stored
                        .get(&service.name)
                        .map_or("the start", MarkTimestamp::as_str)
                )));
            }
            sets.push(set);
        }

        let candidate = reconcile(&sets).ok_or_else(|| {
            SatflowError::Reconciliation("no timestamp common to every data service".to_string())
        })?;

        if let Some((service, mark)) = config
            .data_services
            .iter()
            .find_map(|s| stored.get(&s.name).filter(|m| *m >= &candidate).map(|m| (&s.name, m)))
        {
            return Err(SatflowError::Reconciliation(format!(
                "candidate {candidate} is not newer than the mark {mark} of '{service}'"
            )));
        }

        let age = candidate.age(&ctx.now());
        if age > config.stages.latest.freshness() {
            return Err(SatflowError::Reconciliation(format!(
                "candidate {candidate} is {} minutes old, past the {} minute cutoff",
                age.num_minutes(),
                config.stages.latest.freshness_minutes
            )));
        }

        let updates: Marks = config
            .data_services
            .iter()
            .map(|s| (s.name.clone(), candidate.clone()))
            .collect();
        let advance = marks_store.advance(&updates).await?;
        info!(%candidate, changed = advance.changed, "High-water mark advanced");
        ctx.notify(
            NotificationKind::MarkAdvanced,
            serde_json::json!({"parameter": marks_store.name(), "timestamp": candidate}),
        )
        .await;

        let mut meta = StageMeta {
            csa_timestamp: Some(candidate.clone()),
            ..StageMeta::default()
        };
        for service in &config.data_services {
            let uri = S3Uri {
                bucket: config.buckets.canonical.clone(),
                key: canonical_prefix(&config.org, &config.source_name, &service.name),
            };
            meta.data_service_s3_uri_props
                .insert(service.name.clone(), UriProps(uri.to_string(), candidate.clone()));
        }

        Ok(StageOutput::success(meta))
    }
}

#[async_trait]
impl Stage for LatestStage {
    fn name(&self) -> &str {
        "latest"
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        finish(self.name(), self.run(ctx).await)
    }
}
