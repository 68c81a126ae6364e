//! Copies newly landed source objects into the canonical layout.

use super::{finish, PipelinePorts, Stage};
use crate::config::DataServiceDescriptor;
use crate::context::StageContext;
use crate::core::StageOutput;
use crate::errors::SatflowError;
use crate::events::NotificationKind;
use crate::naming::{basename, canonical_key};
use crate::storage::{list_all, CopyOptions};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What one poll run did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollStats {
    /// Canonical keys copied.
    pub copied: Vec<String>,
    /// Canonical keys already present.
    pub skipped: Vec<String>,
    /// Canonical keys whose existence probe was inconclusive.
    pub ambiguous: Vec<String>,
    /// Objects rejected by a filename filter.
    pub filtered: usize,
    /// Listings and copies that failed.
    pub failures: Vec<String>,
}

/// Scans recent source prefixes and copies objects not yet in the
/// canonical layout.
///
/// The canonical object is the only idempotency token: an object is copied
/// when a probe definitely reports it absent, and left alone otherwise.
#[derive(Debug, Clone)]
pub struct PollStage {
    ports: Arc<PipelinePorts>,
}

impl PollStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(ports: Arc<PipelinePorts>) -> Self {
        Self { ports }
    }

    async fn poll_service(
        &self,
        ctx: &StageContext,
        service: &DataServiceDescriptor,
        stats: &mut PollStats,
    ) {
        let config = &self.ports.config;
        let poll = &config.stages.poll;
        let prefixes = poll.layout.prefixes(&service.source_folder, &ctx.now());
        debug!(service = %service.name, ?prefixes, "Scanning source prefixes");

        for prefix in prefixes {
            let objects = match list_all(
                self.ports.objects.as_ref(),
                &poll.source_bucket,
                &prefix,
                self.ports.page_size(),
            )
            .await
            {
                Ok(objects) => objects,
                Err(e) => {
                    warn!(service = %service.name, %prefix, error = %e, "Listing failed");
                    stats.failures.push(format!("list {}/{prefix}: {e}", poll.source_bucket));
                    continue;
                }
            };

            for object in objects {
                if !service.accepts(basename(&object.key)) {
                    stats.filtered += 1;
                    continue;
                }
                let destination =
                    canonical_key(&config.org, &config.source_name, &service.name, &object.key);
                self.copy_if_absent(ctx, &object.key, destination, stats).await;
            }
        }
    }

    async fn copy_if_absent(
        &self,
        ctx: &StageContext,
        source_key: &str,
        destination: String,
        stats: &mut PollStats,
    ) {
        let poll = &self.ports.config.stages.poll;
        let canonical = &self.ports.config.buckets.canonical;

        match self.ports.objects.exists(canonical, &destination).await {
            Ok(true) => {
                info!(key = %destination, "Skipping, already present");
                stats.skipped.push(destination);
            }
            Ok(false) => {
                let options = CopyOptions::with_storage_class(poll.storage_class.clone());
                match self
                    .ports
                    .objects
                    .copy(&poll.source_bucket, source_key, canonical, &destination, &options)
                    .await
                {
                    Ok(()) => {
                        info!(source = %source_key, key = %destination, "Copied");
                        ctx.notify(
                            NotificationKind::ObjectCopied,
                            serde_json::json!({"source": source_key, "destination": destination}),
                        )
                        .await;
                        stats.copied.push(destination);
                    }
                    Err(e) => {
                        warn!(source = %source_key, key = %destination, error = %e, "Copy failed");
                        stats.failures.push(format!("copy {destination}: {e}"));
                    }
                }
            }
            Err(e) => {
                error!(key = %destination, error = %e, "Existence probe inconclusive, not copying");
                stats.ambiguous.push(destination);
            }
        }
    }

    async fn run(&self, ctx: &StageContext) -> Result<StageOutput, SatflowError> {
        let mut stats = PollStats::default();
        for service in &self.ports.config.data_services {
            self.poll_service(ctx, service, &mut stats).await;
        }

        info!(
            copied = stats.copied.len(),
            skipped = stats.skipped.len(),
            ambiguous = stats.ambiguous.len(),
            filtered = stats.filtered,
            failures = stats.failures.len(),
            "Poll finished"
        );

        let output = if stats.failures.is_empty() {
            StageOutput::success_empty()
        } else {
            StageOutput::retryable(format!("{} listing or copy failures", stats.failures.len()))
        };
        Ok(output.add_detail("poll", serde_json::to_value(&stats)?))
    }
}

#[async_trait]
impl Stage for PollStage {
    fn name(&self) -> &str {
        "poll"
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        finish(self.name(), self.run(ctx).await)
    }
}
