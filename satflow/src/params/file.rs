//! File-backed parameter store: one JSON document per parameter.

use super::ParameterStore;
use crate::errors::ParameterError;
use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Stores each parameter as a file under a directory.
///
/// Writes go to a temporary file in the same directory that is then
/// renamed over the target, so readers never observe a partial value.
#[derive(Debug, Clone)]
pub struct FileParameterStore {
    directory: PathBuf,
}

impl FileParameterStore {
    /// Creates a store rooted at `directory`, creating it if needed.
    pub fn new(directory: impl Into<PathBuf>) -> Result<Self, ParameterError> {
        let directory = directory.into();
        std::fs::create_dir_all(&directory)
            .map_err(|e| ParameterError::backend(directory.display().to_string(), e.to_string()))?;
        Ok(Self { directory })
    }

    /// Returns the file a parameter lives in.
    #[must_use]
    pub fn path_for(&self, name: &str) -> PathBuf {
        let file = name.trim_start_matches('/').replace('/', "__");
        self.directory.join(format!("{file}.json"))
    }
}

fn write_atomic(directory: &Path, path: &Path, value: &str) -> std::io::Result<()> {
    let mut tmp = tempfile::NamedTempFile::new_in(directory)?;
    tmp.write_all(value.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[async_trait]
impl ParameterStore for FileParameterStore {
    async fn get(&self, name: &str) -> Result<Option<String>, ParameterError> {
        match tokio::fs::read_to_string(self.path_for(name)).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ParameterError::backend(name, e.to_string())),
        }
    }

    async fn put_overwrite(&self, name: &str, value: &str) -> Result<(), ParameterError> {
        let directory = self.directory.clone();
        let path = self.path_for(name);
        let value = value.to_string();

        tokio::task::spawn_blocking(move || write_atomic(&directory, &path, &value))
            .await
            .map_err(|e| ParameterError::backend(name, e.to_string()))?
            .map_err(|e| ParameterError::backend(name, e.to_string()))?;

        debug!(parameter = name, "Parameter written");
        Ok(())
    }
}
