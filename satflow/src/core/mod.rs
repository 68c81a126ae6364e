//! Core domain model types for satflow.
//!
//! This module contains the types every stage speaks:
//! - The tagged stage outcome
//! - Stage output with factory methods
//! - The pipeline event payload and its stage metadata

mod event;
mod output;
mod status;

pub use event::{
    unwrap_redrive, PipelineEvent, StageMeta, UriProps, EVENT_KEY, MESSAGE_KEY, RESPONSES_KEY,
    STATUS_KEY,
};
pub use output::StageOutput;
pub use status::StageOutcome;
