//! Static-grid lookup and extraction of a single raw object.

use super::{finish, PipelinePorts, Stage};
use crate::context::StageContext;
use crate::core::StageOutput;
use crate::errors::SatflowError;
use crate::naming::{select_latest, StaticGridLocation};
use crate::plugins::Extractor;
use crate::scratch::ScratchDir;
use crate::storage::{download, list_keys};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// Filename-rule group used to parse incoming raw object keys.
pub const EXTRACT_RULE_GROUP: &str = "extractor";

/// Runs the extractor for one newly arrived raw object.
///
/// The object's key names the source, parameter and extension; the grid is
/// the lexicographically greatest key under the source's static-grid folder
/// that starts with `{code}_{param}_{source}_` and carries that extension.
#[derive(Debug, Clone)]
pub struct ExtractStage {
    ports: Arc<PipelinePorts>,
}

struct RawObject {
    bucket: String,
    key: String,
}

impl ExtractStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(ports: Arc<PipelinePorts>) -> Self {
        Self { ports }
    }

    fn raw_object(event: &serde_json::Value) -> Result<RawObject, SatflowError> {
        let field = |pointer: &str| {
            event
                .pointer(pointer)
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| SatflowError::InvalidEvent(format!("missing {pointer}")))
        };
        Ok(RawObject {
            bucket: field("/detail/bucket/name")?,
            key: field("/detail/object/key")?,
        })
    }

    async fn extract(
        &self,
        raw: &RawObject,
        grid_key: &str,
        extractor: &dyn Extractor,
        scratch: &ScratchDir,
    ) -> Result<(), SatflowError> {
        let objects = self.ports.objects.as_ref();
        let raw_path = download(objects, &raw.bucket, &raw.key, &scratch.subdir("raw")?).await?;
        let grid_path = download(
            objects,
            &self.ports.config.buckets.static_grids,
            grid_key,
            &scratch.subdir("grid")?,
        )
        .await?;
        let work_dir = scratch.subdir("out")?;
        extractor.extract(&raw_path, &grid_path, &work_dir).await?;
        Ok(())
    }

    async fn run(&self, ctx: &StageContext) -> Result<StageOutput, SatflowError> {
        let config = &self.ports.config;
        let settings = &config.stages.extract;
        let raw = Self::raw_object(&ctx.input().event)?;

        let Some(meta) = self
            .ports
            .filename_meta
            .find(EXTRACT_RULE_GROUP, &raw.key, None)
        else {
            return Ok(StageOutput::skipped(format!("unrecognised filename {}", raw.key)));
        };
        let (Some(source), Some(param), Some(extension)) =
            (meta.source_name, meta.param_short, meta.extension)
        else {
            return Ok(StageOutput::skipped(format!(
                "filename {} lacks a source, parameter or extension",
                raw.key
            )));
        };
        if !settings.allowed_sources.iter().any(|s| *s == source) {
            info!(%source, key = %raw.key, "Source not extracted, skipping");
            return Ok(StageOutput::skipped(format!("source '{source}' is not extracted")));
        }

        let location = StaticGridLocation {
            branch: &config.static_grids.branch,
            package: &config.static_grids.package,
            kind: &settings.static_grid_kind,
            source_name: &source,
        };
        let keys = list_keys(
            self.ports.objects.as_ref(),
            &config.buckets.static_grids,
            &location.prefix(),
            self.ports.page_size(),
        )
        .await?;
        let name_prefix = location.name_prefix(&settings.grid_code, &param);
        let Some(grid_key) = select_latest(
            keys.iter().map(String::as_str),
            Some(&name_prefix),
            Some(&extension),
        ) else {
            info!(%source, prefix = %name_prefix, %extension, "No static grid, skipping");
            return Ok(StageOutput::skipped(format!(
                "no static grid matching {}{name_prefix}*{extension}",
                location.prefix()
            )));
        };
        debug!(grid = grid_key, "Selected static grid");

        let extractor = self.ports.plugins.extractor(&source)?;
        let scratch = self.ports.scratch()?;
        let result = self.extract(&raw, grid_key, extractor.as_ref(), &scratch).await;
        scratch.clear();
        result?;

        info!(key = %raw.key, grid = grid_key, "Extracted");
        Ok(StageOutput::success_empty()
            .add_detail("raw", serde_json::json!(format!("{}/{}", raw.bucket, raw.key)))
            .add_detail("grid", serde_json::json!(grid_key)))
    }
}

#[async_trait]
impl Stage for ExtractStage {
    fn name(&self) -> &str {
        "extract"
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        finish(self.name(), self.run(ctx).await)
    }
}
