//! In-memory object store with fault injection.

use super::{CopyOptions, ListPage, ObjectChecksum, ObjectStoreClient, ObjectSummary, PutOptions};
use crate::errors::StoreError;
use async_trait::async_trait;
use bytes::Bytes;
use md5::{Digest as _, Md5};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// An object held by [`MemoryObjectStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Payload.
    pub data: Bytes,
    /// Hex MD5 of the payload.
    pub etag: String,
    /// Storage class, if one was requested.
    pub storage_class: Option<String>,
    /// Checksum supplied on upload.
    pub checksum: Option<ObjectChecksum>,
    /// Tags supplied on upload.
    pub tags: BTreeMap<String, String>,
}

impl StoredObject {
    fn new(data: Bytes) -> Self {
        let etag = hex::encode(Md5::digest(&data));
        Self {
            data,
            etag,
            storage_class: None,
            checksum: None,
            tags: BTreeMap::new(),
        }
    }
}

/// Thread-safe in-memory object store.
///
/// Buckets are created on first write. Faults can be injected per key
/// (probe, read and write failures) or per listing prefix.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    buckets: Mutex<BTreeMap<String, BTreeMap<String, StoredObject>>>,
    page_size: Option<usize>,
    failing_probes: Mutex<HashSet<String>>,
    failing_gets: Mutex<HashSet<String>>,
    failing_puts: Mutex<HashSet<String>>,
    failing_listings: Mutex<HashSet<String>>,
    drop_tokens: AtomicBool,
    list_calls: AtomicUsize,
    copy_calls: AtomicUsize,
    put_calls: AtomicUsize,
}

fn location(bucket: &str, key: &str) -> String {
    format!("{bucket}/{key}")
}

impl MemoryObjectStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps every listing page at `size` keys.
    #[must_use]
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = Some(size.max(1));
        self
    }

    /// Inserts an object directly.
    pub fn insert(&self, bucket: &str, key: &str, data: Bytes) {
        self.buckets
            .lock()
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), StoredObject::new(data));
    }

    /// Returns a stored object.
    #[must_use]
    pub fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.buckets
            .lock()
            .get(bucket)
            .and_then(|b| b.get(key))
            .cloned()
    }

    /// Returns true if an object exists.
    #[must_use]
    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.object(bucket, key).is_some()
    }

    /// Returns every key in a bucket.
    #[must_use]
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.buckets
            .lock()
            .get(bucket)
            .map(|b| b.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Makes existence probes of an object fail ambiguously.
    pub fn fail_probe(&self, bucket: &str, key: &str) {
        self.failing_probes.lock().insert(location(bucket, key));
    }

    /// Makes reads of an object fail.
    pub fn fail_get(&self, bucket: &str, key: &str) {
        self.failing_gets.lock().insert(location(bucket, key));
    }

    /// Makes writes (and copies) to an object fail.
    pub fn fail_put(&self, bucket: &str, key: &str) {
        self.failing_puts.lock().insert(location(bucket, key));
    }

    /// Makes listings of a prefix fail.
    pub fn fail_listing(&self, bucket: &str, prefix: &str) {
        self.failing_listings.lock().insert(location(bucket, prefix));
    }

    /// Removes every injected fault.
    pub fn clear_faults(&self) {
        self.failing_probes.lock().clear();
        self.failing_gets.lock().clear();
        self.failing_puts.lock().clear();
        self.failing_listings.lock().clear();
        self.drop_tokens.store(false, Ordering::SeqCst);
    }

    /// Makes truncated pages omit their continuation token.
    pub fn drop_continuation_tokens(&self) {
        self.drop_tokens.store(true, Ordering::SeqCst);
    }

    /// Number of listing calls served.
    #[must_use]
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Number of successful copies.
    #[must_use]
    pub fn copy_calls(&self) -> usize {
        self.copy_calls.load(Ordering::SeqCst)
    }

    /// Number of successful uploads.
    #[must_use]
    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    fn check_put(&self, bucket: &str, key: &str, operation: &str) -> Result<(), StoreError> {
        if self.failing_puts.lock().contains(&location(bucket, key)) {
            return Err(StoreError::transient(
                operation,
                format!("injected failure writing {bucket}/{key}"),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStoreClient for MemoryObjectStore {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<&str>,
        max_keys: usize,
    ) -> Result<ListPage, StoreError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_listings.lock().contains(&location(bucket, prefix)) {
            return Err(StoreError::transient(
                "list_objects",
                format!("injected failure listing {bucket}/{prefix}"),
            ));
        }

        let limit = self.page_size.map_or(max_keys, |p| p.min(max_keys)).max(1);
        let buckets = self.buckets.lock();
        let Some(objects) = buckets.get(bucket) else {
            return Ok(ListPage::default());
        };

        let mut matching = objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .filter(|(key, _)| continuation_token.map_or(true, |t| key.as_str() > t));

        let page: Vec<ObjectSummary> = matching
            .by_ref()
            .take(limit)
            .map(|(key, obj)| ObjectSummary {
                key: key.clone(),
                size: obj.data.len() as u64,
                last_modified: None,
            })
            .collect();
        let is_truncated = matching.next().is_some();
        let continuation_token = if is_truncated && !self.drop_tokens.load(Ordering::SeqCst) {
            page.last().map(|o| o.key.clone())
        } else {
            None
        };

        Ok(ListPage {
            objects: page,
            is_truncated,
            continuation_token,
        })
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes, StoreError> {
        if self.failing_gets.lock().contains(&location(bucket, key)) {
            return Err(StoreError::transient(
                "get_object",
                format!("injected failure reading {bucket}/{key}"),
            ));
        }
        self.object(bucket, key)
            .map(|o| o.data)
            .ok_or_else(|| StoreError::not_found(bucket, key))
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        options: &PutOptions,
    ) -> Result<(), StoreError> {
        self.check_put(bucket, key, "put_object")?;
        if let Some(ref checksum) = options.checksum {
            let actual = ObjectChecksum::compute(checksum.algorithm, &data);
            if actual.value != checksum.value {
                return Err(StoreError::transient(
                    "put_object",
                    format!("checksum mismatch for {bucket}/{key}"),
                ));
            }
        }

        let mut object = StoredObject::new(data);
        object.storage_class.clone_from(&options.storage_class);
        object.checksum.clone_from(&options.checksum);
        object.tags.clone_from(&options.tags);
        self.buckets
            .lock()
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), object);
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn copy(
        &self,
        source_bucket: &str,
        source_key: &str,
        destination_bucket: &str,
        destination_key: &str,
        options: &CopyOptions,
    ) -> Result<(), StoreError> {
        self.check_put(destination_bucket, destination_key, "copy_object")?;
        let mut object = self
            .object(source_bucket, source_key)
            .ok_or_else(|| StoreError::not_found(source_bucket, source_key))?;
        object.storage_class.clone_from(&options.storage_class);

        self.buckets
            .lock()
            .entry(destination_bucket.to_string())
            .or_default()
            .insert(destination_key.to_string(), object);
        self.copy_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn exists(&self, bucket: &str, key: &str) -> Result<bool, StoreError> {
        if self.failing_probes.lock().contains(&location(bucket, key)) {
            return Err(StoreError::transient(
                "head_object",
                format!("injected 403 probing {bucket}/{key}"),
            ));
        }
        Ok(self.contains(bucket, key))
    }
}
