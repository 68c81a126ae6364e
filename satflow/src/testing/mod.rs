//! Shared test support: sample configuration, stores, plugins and
//! assertions on stage outputs.

pub mod assertions;
pub mod fixtures;
pub mod mocks;

pub use assertions::{
    assert_bombed_out, assert_error_code, assert_retryable, assert_skipped, assert_succeeded,
    assert_wire_status,
};
pub use mocks::{FailingCollector, FixedProcessor, RecordingExtractor};
