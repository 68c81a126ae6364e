//! In-memory parameter store.

use super::ParameterStore;
use crate::errors::ParameterError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// Thread-safe in-memory parameter store.
///
/// Keeps a write history so tests can assert on exactly what was written.
#[derive(Debug, Default)]
pub struct InMemoryParameterStore {
    values: Mutex<HashMap<String, String>>,
    writes: Mutex<Vec<(String, String)>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl InMemoryParameterStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a value without recording a write.
    pub fn seed(&self, name: &str, value: &str) {
        self.values.lock().insert(name.to_string(), value.to_string());
    }

    /// Returns a value without going through the trait.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<String> {
        self.values.lock().get(name).cloned()
    }

    /// Number of writes to a parameter.
    #[must_use]
    pub fn write_count(&self, name: &str) -> usize {
        self.writes.lock().iter().filter(|(n, _)| n == name).count()
    }

    /// Every value written to a parameter, oldest first.
    #[must_use]
    pub fn history(&self, name: &str) -> Vec<String> {
        self.writes
            .lock()
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
            .collect()
    }

    /// Makes every read fail.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Makes every write fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ParameterStore for InMemoryParameterStore {
    async fn get(&self, name: &str) -> Result<Option<String>, ParameterError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(ParameterError::backend(name, "injected read failure"));
        }
        Ok(self.value(name))
    }

    async fn put_overwrite(&self, name: &str, value: &str) -> Result<(), ParameterError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ParameterError::backend(name, "injected write failure"));
        }
        self.values.lock().insert(name.to_string(), value.to_string());
        self.writes.lock().push((name.to_string(), value.to_string()));
        Ok(())
    }
}
