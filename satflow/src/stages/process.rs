//! Processing of a gated batch into a combined artifact.

use super::{finish, PipelinePorts, Stage, UploadItem, Uploader};
use crate::context::StageContext;
use crate::core::{StageMeta, StageOutput};
use crate::errors::{CollaboratorError, SatflowError};
use crate::naming::{artifact_prefix, select_latest, StaticGridLocation};
use crate::plugins::{PriorArtifacts, ProcessInput, Processor};
use crate::scratch::ScratchDir;
use crate::storage::{download, list_keys, parse_bucket_key};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Downloads a gated batch with its static grids and prior artifacts, runs
/// the processor and uploads what it produced.
///
/// Nothing is uploaded unless the processor succeeds and names an artifact.
/// Scratch storage is cleared whatever the outcome.
#[derive(Debug, Clone)]
pub struct ProcessStage {
    ports: Arc<PipelinePorts>,
}

impl ProcessStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(ports: Arc<PipelinePorts>) -> Self {
        Self { ports }
    }

    async fn download_data(
        &self,
        files: &BTreeMap<String, Vec<String>>,
        scratch: &ScratchDir,
    ) -> Result<BTreeMap<String, Vec<PathBuf>>, SatflowError> {
        let mut data_files = BTreeMap::new();
        for (service, references) in files {
            let dir = scratch.subdir(&format!("data/{service}"))?;
            let mut paths = Vec::with_capacity(references.len());
            for reference in references {
                let (bucket, key) = parse_bucket_key(reference)?;
                paths.push(download(self.ports.objects.as_ref(), bucket, key, &dir).await?);
            }
            data_files.insert(service.clone(), paths);
        }
        Ok(data_files)
    }

    async fn download_grids(
        &self,
        scratch: &ScratchDir,
    ) -> Result<BTreeMap<String, PathBuf>, SatflowError> {
        let config = &self.ports.config;
        let settings = &config.stages.process;
        let location = StaticGridLocation {
            branch: &config.static_grids.branch,
            package: &config.static_grids.package,
            kind: &settings.static_grid_kind,
            source_name: &config.source_name,
        };

        let mut grids = BTreeMap::new();
        for kind in &settings.grid_kinds {
            let prefix = format!("{}{kind}/", location.prefix());
            let keys = list_keys(
                self.ports.objects.as_ref(),
                &config.buckets.static_grids,
                &prefix,
                self.ports.page_size(),
            )
            .await?;
            let key = select_latest(
                keys.iter().map(String::as_str),
                None,
                Some(&settings.grid_extension),
            )
            .ok_or_else(|| {
                SatflowError::MissingResource(format!(
                    "no {} static grid under {prefix}",
                    settings.grid_extension
                ))
            })?;
            debug!(kind = %kind, grid = key, "Selected static grid");
            let dir = scratch.subdir(&format!("grids/{kind}"))?;
            let path = download(
                self.ports.objects.as_ref(),
                &config.buckets.static_grids,
                key,
                &dir,
            )
            .await?;
            grids.insert(kind.clone(), path);
        }
        Ok(grids)
    }

    async fn download_prior(
        &self,
        date: NaiveDate,
        label: &str,
        scratch: &ScratchDir,
    ) -> Result<Option<PathBuf>, SatflowError> {
        let config = &self.ports.config;
        let prefix = artifact_prefix(
            &config.deploy_env,
            &config.source_name,
            &StageContext::folder_date(date),
        );
        let keys = list_keys(
            self.ports.objects.as_ref(),
            &config.buckets.artifacts,
            &prefix,
            self.ports.page_size(),
        )
        .await?;
        let Some(key) = select_latest(keys.iter().map(String::as_str), None, None) else {
            debug!(%prefix, "No prior artifact");
            return Ok(None);
        };
        let dir = scratch.subdir(&format!("prior/{label}"))?;
        let path = download(
            self.ports.objects.as_ref(),
            &config.buckets.artifacts,
            key,
            &dir,
        )
        .await?;
        Ok(Some(path))
    }

    async fn process(
        &self,
        ctx: &StageContext,
        meta: &StageMeta,
        processor: &dyn Processor,
        scratch: &ScratchDir,
    ) -> Result<StageOutput, SatflowError> {
        let config = &self.ports.config;
        let input = ProcessInput {
            data_files: self.download_data(&meta.data_service_files, scratch).await?,
            static_grids: self.download_grids(scratch).await?,
            prior_artifacts: PriorArtifacts {
                today: self.download_prior(ctx.today(), "today", scratch).await?,
                yesterday: self.download_prior(ctx.yesterday(), "yesterday", scratch).await?,
            },
            work_dir: scratch.subdir("out")?,
        };

        let produced = processor.get_data(&input).await?;
        let artifact = produced.artifact.ok_or_else(|| {
            CollaboratorError::invalid_output("processor", "no combined artifact produced")
        })?;

        let mut items = vec![UploadItem {
            path: input.work_dir.join(&artifact),
            bucket: config.buckets.artifacts.clone(),
            key: format!(
                "{}{artifact}",
                artifact_prefix(
                    &config.deploy_env,
                    &config.source_name,
                    &StageContext::folder_date(ctx.today())
                )
            ),
        }];
        items.extend(produced.params.iter().map(|name| UploadItem {
            path: input.work_dir.join(name),
            bucket: config.buckets.params.clone(),
            key: format!(
                "{}/{name}",
                config.stages.process.param_prefix.trim_end_matches('/')
            ),
        }));

        let report = Uploader::new(self.ports.objects.as_ref(), &config.upload)
            .upload_all(ctx, &items)
            .await;
        let output = if report.is_complete() {
            info!(%artifact, params = produced.params.len(), "Processed batch");
            StageOutput::success(StageMeta {
                csa_timestamp: meta.csa_timestamp.clone(),
                ..StageMeta::default()
            })
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
        let meta = ctx.input().require_meta(self.ports.meta_key())?;
        if meta.data_service_files.is_empty() {
            return Err(SatflowError::InvalidEvent(
                "no data_service_files to process".to_string(),
            ));
        }
        let processor = self.ports.plugins.processor(&self.ports.config.source_name)?;

        let scratch = self.ports.scratch()?;
        let result = self.process(ctx, meta, processor.as_ref(), &scratch).await;
        scratch.clear();
        result
    }
}

#[async_trait]
impl Stage for ProcessStage {
    fn name(&self) -> &str {
        "process"
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        finish(self.name(), self.run(ctx).await)
    }
}
