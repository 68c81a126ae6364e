//! Collection of externally sourced parameter files.

use super::{finish, PipelinePorts, Stage, UploadItem, Uploader};
use crate::context::StageContext;
use crate::core::StageOutput;
use crate::errors::SatflowError;
use crate::plugins::Collector;
use crate::scratch::ScratchDir;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Runs the source's collector and uploads every file it returns to the
/// parameter bucket.
#[derive(Debug, Clone)]
pub struct CollectStage {
    ports: Arc<PipelinePorts>,
}

impl CollectStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(ports: Arc<PipelinePorts>) -> Self {
        Self { ports }
    }

    async fn collect(
        &self,
        ctx: &StageContext,
        collector: &dyn Collector,
        scratch: &ScratchDir,
    ) -> Result<StageOutput, SatflowError> {
        let config = &self.ports.config;
        let names = collector.get_data(scratch.path()).await?;
        if names.is_empty() {
            return Ok(StageOutput::retryable("collector returned no parameter files"));
        }

        let prefix = config.stages.process.param_prefix.trim_end_matches('/');
        let items: Vec<UploadItem> = names
            .iter()
            .map(|name| UploadItem {
                path: scratch.file(name),
                bucket: config.buckets.params.clone(),
                key: format!("{prefix}/{name}"),
            })
            .collect();
        let report = Uploader::new(self.ports.objects.as_ref(), &config.upload)
            .upload_all(ctx, &items)
            .await;

        let output = if report.is_complete() {
            info!(files = items.len(), "Collected parameter files");
            StageOutput::success_empty()
        } else {
            StageOutput::retryable(format!(
                "{} of {} uploads failed",
                report.failed.len(),
                items.len()
            ))
        };
        Ok(output.add_detail("uploads", report.to_value()))
    }

    async fn run(&self, ctx: &StageContext) -> Result<StageOutput, SatflowError> {
        let collector = self.ports.plugins.collector(&self.ports.config.source_name)?;
        let scratch = self.ports.scratch()?;
        let result = self.collect(ctx, collector.as_ref(), &scratch).await;
        scratch.clear();
        result
    }
}

#[async_trait]
impl Stage for CollectStage {
    fn name(&self) -> &str {
        "collect"
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        finish(self.name(), self.run(ctx).await)
    }
}
