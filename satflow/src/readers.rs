//! File readers used by the availability gate.
//!
//! A data service may name a reader (`reader_hint`). A reader enumerates the
//! files of a service for one exact timestamp and may cache listings between
//! calls; the gate invalidates that cache whenever a count falls short so
//! the next attempt sees fresh data.

use crate::errors::{ConfigError, StoreError};
use crate::naming::FilenameMetaReader;
use crate::storage::{list_all, ObjectStoreClient, S3Uri};
use crate::utils::MarkTimestamp;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Enumerates the files of a data service for an exact timestamp.
#[async_trait]
pub trait FileReader: Send + Sync + std::fmt::Debug {
    /// Reader name, matched against `reader_hint`.
    fn name(&self) -> &str;

    /// Returns `bucket/key` references of every file under `uri` whose
    /// embedded timestamp equals `timestamp`.
    async fn find_files(
        &self,
        uri: &S3Uri,
        service: &str,
        timestamp: &MarkTimestamp,
    ) -> Result<Vec<String>, StoreError>;

    /// Drops any cached listing.
    fn invalidate_cache(&self);
}

/// Lists `uri` to exhaustion and keeps the files whose filename start time,
/// parsed with the `service` rules of `group`, equals `timestamp`.
pub async fn list_matching_files(
    client: &dyn ObjectStoreClient,
    meta: &FilenameMetaReader,
    group: &str,
    uri: &S3Uri,
    service: &str,
    timestamp: &MarkTimestamp,
    page_size: usize,
) -> Result<Vec<String>, StoreError> {
    let objects = list_all(client, &uri.bucket, &uri.key, page_size).await?;
    Ok(filter_by_timestamp(
        meta,
        group,
        objects.iter().map(|o| o.key.as_str()),
        &uri.bucket,
        service,
        timestamp,
    ))
}

fn filter_by_timestamp<'a>(
    meta: &FilenameMetaReader,
    group: &str,
    keys: impl Iterator<Item = &'a str>,
    bucket: &str,
    service: &str,
    timestamp: &MarkTimestamp,
) -> Vec<String> {
    keys.filter(|key| meta.start_time(group, key, service).as_ref() == Some(timestamp))
        .map(|key| format!("{bucket}/{key}"))
        .collect()
}

/// A reader that lists the object store and caches listings per prefix.
#[derive(Debug)]
pub struct ListingReader {
    name: String,
    client: Arc<dyn ObjectStoreClient>,
    meta: Arc<FilenameMetaReader>,
    group: String,
    page_size: usize,
    cache: DashMap<String, Vec<String>>,
}

impl ListingReader {
    /// Creates a listing reader parsing filenames with the rules of `group`.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        client: Arc<dyn ObjectStoreClient>,
        meta: Arc<FilenameMetaReader>,
        group: impl Into<String>,
        page_size: usize,
    ) -> Self {
        Self {
            name: name.into(),
            client,
            meta,
            group: group.into(),
            page_size,
            cache: DashMap::new(),
        }
    }

    /// Number of cached listings.
    #[must_use]
    pub fn cached_listings(&self) -> usize {
        self.cache.len()
    }
}

#[async_trait]
impl FileReader for ListingReader {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find_files(
        &self,
        uri: &S3Uri,
        service: &str,
        timestamp: &MarkTimestamp,
    ) -> Result<Vec<String>, StoreError> {
        let cache_key = uri.to_string();
        let cached = self.cache.get(&cache_key).map(|keys| keys.value().clone());
        let keys = if let Some(keys) = cached {
            debug!(reader = %self.name, uri = %cache_key, "Using cached listing");
            keys
        } else {
            let keys: Vec<String> =
                list_all(self.client.as_ref(), &uri.bucket, &uri.key, self.page_size)
                    .await?
                    .into_iter()
                    .map(|o| o.key)
                    .collect();
            self.cache.insert(cache_key, keys.clone());
            keys
        };

        Ok(filter_by_timestamp(
            &self.meta,
            &self.group,
            keys.iter().map(String::as_str),
            &uri.bucket,
            service,
            timestamp,
        ))
    }

    fn invalidate_cache(&self) {
        debug!(reader = %self.name, entries = self.cache.len(), "Invalidating listing cache");
        self.cache.clear();
    }
}

/// Readers by name.
#[derive(Debug, Default, Clone)]
pub struct ReaderRegistry {
    readers: HashMap<String, Arc<dyn FileReader>>,
}

impl ReaderRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a reader under its own name.
    pub fn register(&mut self, reader: Arc<dyn FileReader>) {
        self.readers.insert(reader.name().to_string(), reader);
    }

    /// Registers a reader, builder style.
    #[must_use]
    pub fn with_reader(mut self, reader: Arc<dyn FileReader>) -> Self {
        self.register(reader);
        self
    }

    /// Looks up a reader.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn FileReader>> {
        self.readers.get(name).cloned()
    }

    /// Fails if any hint names an unregistered reader.
    pub fn ensure_registered<'a>(
        &self,
        hints: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), ConfigError> {
        for hint in hints {
            if !self.readers.contains_key(hint) {
                return Err(ConfigError::invalid(
                    "data_services.reader_hint",
                    format!("no reader registered as '{hint}'"),
                ));
            }
        }
        Ok(())
    }
}
