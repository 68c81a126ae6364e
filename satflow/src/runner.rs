//! Runs one stage invocation from a wire event to a wire event.
//!
//! The orchestrator hands every invocation a JSON payload and branches on the
//! `status` of the payload it gets back. [`StageRunner`] decodes the payload,
//! builds the [`StageContext`], runs the stage inside its span and encodes
//! the outcome. A payload that cannot be decoded still produces a `FAILED`
//! event rather than an error.

use crate::config::PipelineConfig;
use crate::context::StageContext;
use crate::core::{PipelineEvent, StageOutput};
use crate::errors::{ConfigError, ParameterError};
use crate::events::{EventSink, LoggingEventSink, NoOpEventSink, NotificationKind};
use crate::observability::{stage_span, SpanTimer, StageSpanAttributes};
use crate::params::FileParameterStore;
use crate::readers::{ListingReader, ReaderRegistry};
use crate::stages::{PipelinePorts, StageKind};
use crate::storage::{ObjectStoreBackend, ObjectStoreClient};
use crate::utils::{Clock, SystemClock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn, Instrument};

/// Which marker parameters a bootstrap created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapReport {
    /// The high-water mark parameter was created.
    pub high_water_mark_created: bool,
    /// The latest-available parameter was created.
    pub latest_available_created: bool,
}

/// Runs stages over shared ports.
#[derive(Debug, Clone)]
pub struct StageRunner {
    ports: Arc<PipelinePorts>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventSink>,
}

impl StageRunner {
    /// Creates a runner on the system clock with no event sink.
    #[must_use]
    pub fn new(ports: PipelinePorts) -> Self {
        Self {
            ports: Arc::new(ports),
            clock: Arc::new(SystemClock),
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Wires production collaborators from the configuration's runtime
    /// section: `object_store` buckets, a file-backed parameter store,
    /// command plugins and one listing reader per reader hint. Upload
    /// encryption and ownership settings apply to the artifact and
    /// parameter buckets.
    pub fn from_config(config: PipelineConfig) -> Result<Self, ConfigError> {
        let runtime = config.runtime.clone();
        let mut backend = ObjectStoreBackend::new(runtime.storage);
        let write_settings = config.upload.write_settings();
        if !write_settings.is_empty() {
            for bucket in [&config.buckets.artifacts, &config.buckets.params] {
                if !bucket.is_empty() {
                    backend =
                        backend.with_write_settings(bucket.as_str(), write_settings.clone());
                }
            }
        }
        let objects: Arc<dyn ObjectStoreClient> = Arc::new(backend);
        let params = FileParameterStore::new(&runtime.parameters_dir)
            .map_err(|e| ConfigError::invalid("runtime.parameters_dir", e.to_string()))?;

        let mut ports = PipelinePorts::new(config, Arc::clone(&objects), Arc::new(params))?
            .with_plugins(runtime.plugins.into_registry());
        let readers = listing_readers(&ports, &objects);
        ports = ports.with_readers(readers);
        if let Some(dir) = runtime.scratch_dir {
            ports = ports.with_scratch_root(dir);
        }

        Ok(Self::new(ports).with_events(Arc::new(LoggingEventSink::default())))
    }

    /// Sets the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Returns the ports.
    #[must_use]
    pub fn ports(&self) -> &PipelinePorts {
        &self.ports
    }

    /// Checks that `kind` has everything it needs configured.
    pub fn validate_for(&self, kind: StageKind) -> Result<(), ConfigError> {
        kind.validate(&self.ports)
    }

    /// Runs a stage on a raw payload.
    pub async fn run(&self, kind: StageKind, payload: serde_json::Value) -> serde_json::Value {
        let meta_key = self.ports.meta_key();
        match PipelineEvent::from_value(payload.clone(), meta_key) {
            Ok(input) => self.run_event(kind, input).await.to_value(meta_key),
            Err(e) => {
                warn!(stage = %kind, error = %e, "Rejecting undecodable payload");
                StageOutput::from_error(&e)
                    .into_pipeline_event(payload)
                    .to_value(meta_key)
            }
        }
    }

    /// Runs a stage on a decoded event.
    ///
    /// A successful output carries the input's own passthrough forward. Any
    /// other outcome wraps the whole input, metadata included, so that the
    /// orchestrator can hand the output straight back on its next attempt.
    pub async fn run_event(&self, kind: StageKind, input: PipelineEvent) -> PipelineEvent {
        let meta_key = self.ports.meta_key();
        let retry_envelope = input
            .meta
            .is_some()
            .then(|| input.as_passthrough(meta_key));
        let passthrough = input.event.clone();
        let stage = kind.build(Arc::clone(&self.ports));
        let ctx = StageContext::new(kind.as_str(), input, self.clock.as_ref())
            .with_events(Arc::clone(&self.events));
        let span = stage_span(kind.as_str(), &ctx.execution_id().to_string());
        let timer = SpanTimer::start(kind.as_str());

        let output = async {
            info!("Stage started");
            ctx.notify(NotificationKind::StageStarted, serde_json::json!({}))
                .await;

            let output = stage.execute(&ctx).await;

            let duration_ms = timer.finish();
            let attributes = StageSpanAttributes::new(kind.as_str())
                .with_status(output.outcome.as_str())
                .with_duration_ms(duration_ms)
                .with_error_code(output.error_code.clone());
            info!(
                status = %output.outcome,
                duration_ms,
                message = output.message.as_deref().unwrap_or_default(),
                "Stage finished"
            );
            ctx.notify(
                NotificationKind::StageCompleted,
                serde_json::to_value(attributes.to_attributes()).unwrap_or_default(),
            )
            .await;
            output
        }
        .instrument(span)
        .await;

        let passthrough = match retry_envelope {
            Some(envelope) if !output.is_success() => envelope,
            _ => passthrough,
        };
        output.into_pipeline_event(passthrough)
    }

    /// Creates both marker parameters as empty mappings where absent.
    pub async fn bootstrap(&self) -> Result<BootstrapReport, ParameterError> {
        let high_water = self.ports.high_water_marks();
        let latest_available = self.ports.latest_available_marks();
        let (high_water_mark_created, latest_available_created) =
            futures::try_join!(high_water.bootstrap(), latest_available.bootstrap())?;
        Ok(BootstrapReport {
            high_water_mark_created,
            latest_available_created,
        })
    }
}

fn listing_readers(ports: &PipelinePorts, objects: &Arc<dyn ObjectStoreClient>) -> ReaderRegistry {
    let config = &ports.config;
    let mut readers = ReaderRegistry::new();
    for hint in config
        .data_services
        .iter()
        .filter_map(|s| s.reader_hint.as_deref())
    {
        if readers.get(hint).is_none() {
            readers.register(Arc::new(ListingReader::new(
                hint,
                Arc::clone(objects),
                Arc::clone(&ports.filename_meta),
                config.source_name.clone(),
                ports.page_size(),
            )));
        }
    }
    readers
}
