//! # Satflow
//!
//! Retry-safe stages of a satellite-data ingestion pipeline.
//!
//! An external orchestrator invokes each stage independently and branches on
//! the status of the event it returns:
//!
//! - **poll** copies newly landed instrument files into a canonical layout
//! - **latest** reconciles a timestamp common to every data service and
//!   advances the high-water mark
//! - **available** claims that timestamp and waits until enough files exist
//! - **extract** pairs one raw object with its static grid
//! - **process** runs the source's processor and uploads its outputs
//! - **archive** moves yesterday's combined artifact to cold storage
//! - **collect** uploads externally sourced parameter files
//!
//! Progress markers live in a parameter store so that retried and redriven
//! executions stay correct.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use satflow::prelude::*;
//!
//! let config = PipelineConfig::from_env()?;
//! let runner = StageRunner::from_config(config)?;
//! let output = runner.run(StageKind::Latest, serde_json::json!({})).await;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod naming;
pub mod observability;
pub mod params;
pub mod plugins;
pub mod readers;
pub mod runner;
pub mod scratch;
pub mod stages;
pub mod storage;
pub mod utils;

#[cfg(test)]
mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{DataServiceDescriptor, PipelineConfig};
    pub use crate::context::StageContext;
    pub use crate::core::{PipelineEvent, StageMeta, StageOutcome, StageOutput};
    pub use crate::errors::{
        CollaboratorError, ConfigError, ParameterError, SatflowError, StoreError,
    };
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::params::{MarkStore, ParameterStore};
    pub use crate::plugins::{Collector, Extractor, PluginRegistry, Processor};
    pub use crate::runner::StageRunner;
    pub use crate::stages::{PipelinePorts, Stage, StageKind};
    pub use crate::storage::ObjectStoreClient;
    pub use crate::utils::{Clock, MarkTimestamp, SystemClock};
}
