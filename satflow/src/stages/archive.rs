//! Migration of yesterday's combined artifact to cold storage.

use super::{finish, PipelinePorts, Stage};
use crate::context::StageContext;
use crate::core::StageOutput;
use crate::errors::SatflowError;
use crate::events::NotificationKind;
use crate::naming::{artifact_prefix, select_latest};
use crate::storage::{list_keys, CopyOptions};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info};

/// Copies the lexicographically latest artifact of yesterday's folder into
/// the cold-storage bucket under the same key.
#[derive(Debug, Clone)]
pub struct ArchiveStage {
    ports: Arc<PipelinePorts>,
}

impl ArchiveStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(ports: Arc<PipelinePorts>) -> Self {
        Self { ports }
    }

    async fn run(&self, ctx: &StageContext) -> Result<StageOutput, SatflowError> {
        let config = &self.ports.config;
        let settings = &config.stages.archive;
        let date = StageContext::folder_date(ctx.yesterday());
        let prefix = artifact_prefix(&config.deploy_env, &config.source_name, &date);

        let keys = list_keys(
            self.ports.objects.as_ref(),
            &config.buckets.artifacts,
            &prefix,
            self.ports.page_size(),
        )
        .await?;
        let Some(key) = select_latest(keys.iter().map(String::as_str), None, None) else {
            info!(%prefix, "Nothing to archive");
            return Ok(StageOutput::skipped(format!("no artifact under {prefix}")));
        };

        match self
            .ports
            .objects
            .exists(&settings.destination_bucket, key)
            .await
        {
            Ok(true) => {
                info!(key, "Already archived");
                return Ok(StageOutput::skipped(format!("{key} already archived")));
            }
            Ok(false) => {}
            Err(e) => {
                error!(key, error = %e, "Archive existence check inconclusive, not copying");
                return Ok(StageOutput::skipped(format!(
                    "could not tell whether {key} is archived: {e}"
                )));
            }
        }

        self.ports
            .objects
            .copy(
                &config.buckets.artifacts,
                key,
                &settings.destination_bucket,
                key,
                &CopyOptions::with_storage_class(Some(settings.storage_class.clone())),
            )
            .await?;
        info!(key, bucket = %settings.destination_bucket, storage_class = %settings.storage_class, "Archived");
        ctx.notify(
            NotificationKind::ArtifactArchived,
            serde_json::json!({"bucket": settings.destination_bucket, "key": key}),
        )
        .await;

        Ok(StageOutput::success_empty().add_detail("archived", serde_json::json!(key)))
    }
}

#[async_trait]
impl Stage for ArchiveStage {
    fn name(&self) -> &str {
        "archive"
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        finish(self.name(), self.run(ctx).await)
    }
}
