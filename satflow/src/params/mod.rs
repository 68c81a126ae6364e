//! Durable key-value parameters and the typed marker records kept in them.

mod file;
mod marks;
mod memory;

pub use file::FileParameterStore;
pub use marks::{Advance, MarkStore, Marks};
pub use memory::InMemoryParameterStore;

use crate::errors::ParameterError;
use async_trait::async_trait;

/// A durable key-value parameter client.
#[async_trait]
pub trait ParameterStore: Send + Sync + std::fmt::Debug {
    /// Reads a parameter. `Ok(None)` if it does not exist.
    async fn get(&self, name: &str) -> Result<Option<String>, ParameterError>;

    /// Writes a parameter, replacing any existing value.
    async fn put_overwrite(&self, name: &str, value: &str) -> Result<(), ParameterError>;
}
