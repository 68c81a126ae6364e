//! [`ObjectStoreClient`] on top of the `object_store` crate.
//!
//! One `object_store` instance is built lazily per bucket and storage class.
//! S3 has no per-request storage class in `object_store`, so writes into a
//! non-default class go through a client whose default headers carry
//! `x-amz-storage-class`. Full listings are streamed once; single pages
//! resume with `list_with_offset`, using the last key of a page as the
//! continuation token.

use super::{CopyOptions, ListPage, ObjectStoreClient, ObjectSummary, PutOptions};
use crate::config::ChecksumAlgorithm;
use crate::errors::StoreError;
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use futures::{StreamExt, TryStreamExt};
use object_store::aws::{AmazonS3Builder, Checksum};
use object_store::local::LocalFileSystem;
use object_store::path::Path as ObjectPath;
use object_store::{ClientOptions, ObjectMeta, ObjectStore, PutPayload, TagSet, WriteMultipart};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

const STORAGE_CLASS_HEADER: &str = "x-amz-storage-class";
const EXPECTED_BUCKET_OWNER_HEADER: &str = "x-amz-expected-bucket-owner";

/// Parts kept in flight by a streamed copy.
const COPY_CONCURRENCY: usize = 4;

/// Where buckets live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum StoreLocation {
    /// Amazon S3; credentials and region come from the environment.
    S3 {
        /// Region override.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        region: Option<String>,
        /// Endpoint override (S3-compatible stores).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        endpoint: Option<String>,
    },
    /// Local directories, one per bucket, under `root`.
    ///
    /// Local disk has no storage classes, checksums or encryption; those
    /// options are accepted and have no effect.
    Local {
        /// Root directory.
        root: std::path::PathBuf,
    },
}

impl Default for StoreLocation {
    fn default() -> Self {
        Self::S3 {
            region: None,
            endpoint: None,
        }
    }
}

impl StoreLocation {
    /// Returns true for Amazon S3.
    #[must_use]
    pub fn is_s3(&self) -> bool {
        matches!(self, Self::S3 { .. })
    }
}

/// Server-side settings for every request into one bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BucketWriteSettings {
    /// KMS key used for SSE-KMS encryption of new objects.
    pub kms_key_id: Option<String>,
    /// Whether SSE-KMS uses an S3 bucket key.
    pub bucket_key: Option<bool>,
    /// Account that must own the bucket.
    pub expected_bucket_owner: Option<String>,
}

impl BucketWriteSettings {
    /// Returns true when nothing is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.kms_key_id.is_none()
            && self.bucket_key.is_none()
            && self.expected_bucket_owner.is_none()
    }
}

/// Object storage backed by the `object_store` crate.
#[derive(Debug)]
pub struct ObjectStoreBackend {
    location: StoreLocation,
    write_settings: HashMap<String, BucketWriteSettings>,
    stores: DashMap<(String, Option<String>), Arc<dyn ObjectStore>>,
}

fn store_error(operation: &str, error: &object_store::Error) -> StoreError {
    StoreError::transient(operation, error.to_string())
}

/// Splits a listing prefix into the directory `object_store` can list and
/// the full string prefix keys must carry.
fn listing_root(prefix: &str) -> Option<ObjectPath> {
    let dir = prefix.rsplit_once('/').map_or("", |(dir, _)| dir);
    if dir.is_empty() {
        None
    } else {
        Some(ObjectPath::from(dir))
    }
}

fn summary(meta: ObjectMeta) -> ObjectSummary {
    ObjectSummary {
        key: meta.location.to_string(),
        size: meta.size as u64,
        last_modified: Some(meta.last_modified),
    }
}

fn header_value(value: &str) -> Result<HeaderValue, StoreError> {
    HeaderValue::from_str(value).map_err(|e| {
        StoreError::unsupported("create_client", format!("invalid header value '{value}': {e}"))
    })
}

/// Default headers of a client writing into `storage_class`.
fn request_headers(
    storage_class: Option<&str>,
    settings: Option<&BucketWriteSettings>,
) -> Result<HeaderMap, StoreError> {
    let mut headers = HeaderMap::new();
    if let Some(class) = storage_class {
        headers.insert(HeaderName::from_static(STORAGE_CLASS_HEADER), header_value(class)?);
    }
    if let Some(owner) = settings.and_then(|s| s.expected_bucket_owner.as_deref()) {
        headers.insert(
            HeaderName::from_static(EXPECTED_BUCKET_OWNER_HEADER),
            header_value(owner)?,
        );
    }
    Ok(headers)
}

impl ObjectStoreBackend {
    /// Creates a backend.
    #[must_use]
    pub fn new(location: StoreLocation) -> Self {
        Self {
            location,
            write_settings: HashMap::new(),
            stores: DashMap::new(),
        }
    }

    /// Applies server-side settings to every request into `bucket`.
    #[must_use]
    pub fn with_write_settings(
        mut self,
        bucket: impl Into<String>,
        settings: BucketWriteSettings,
    ) -> Self {
        self.write_settings.insert(bucket.into(), settings);
        self
    }

    fn store(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>, StoreError> {
        self.store_for(bucket, None)
    }

    fn store_for(
        &self,
        bucket: &str,
        storage_class: Option<&str>,
    ) -> Result<Arc<dyn ObjectStore>, StoreError> {
        let storage_class = storage_class.filter(|_| self.location.is_s3());
        let cache_key = (bucket.to_string(), storage_class.map(str::to_string));
        if let Some(store) = self.stores.get(&cache_key) {
            return Ok(Arc::clone(store.value()));
        }

        let store: Arc<dyn ObjectStore> = match &self.location {
            StoreLocation::S3 { region, endpoint } => {
                info!(bucket, storage_class, "Creating S3 client");
                let settings = self.write_settings.get(bucket);
                let mut builder = AmazonS3Builder::from_env()
                    .with_bucket_name(bucket)
                    .with_checksum_algorithm(Checksum::SHA256);
                if let Some(region) = region {
                    builder = builder.with_region(region);
                }
                if let Some(settings) = settings {
                    if let Some(key) = &settings.kms_key_id {
                        builder = builder.with_sse_kms_encryption(key);
                    }
                    if let Some(enabled) = settings.bucket_key {
                        builder = builder.with_bucket_key(enabled);
                    }
                }
                let headers = request_headers(storage_class, settings)?;
                if !headers.is_empty() {
                    let options = ClientOptions::new().with_default_headers(headers);
                    builder = builder.with_client_options(options);
                }
                if let Some(endpoint) = endpoint {
                    builder = builder
                        .with_endpoint(endpoint)
                        .with_allow_http(endpoint.starts_with("http://"));
                }
                Arc::new(
                    builder
                        .build()
                        .map_err(|e| store_error("create_client", &e))?,
                )
            }
            StoreLocation::Local { root } => {
                let dir = root.join(bucket);
                std::fs::create_dir_all(&dir)?;
                info!(bucket, path = %dir.display(), "Creating local store");
                Arc::new(
                    LocalFileSystem::new_with_prefix(&dir)
                        .map_err(|e| store_error("create_client", &e))?,
                )
            }
        };

        self.stores.insert(cache_key, Arc::clone(&store));
        Ok(store)
    }

    /// S3 lists in key order; other backends do not promise any order.
    fn lists_in_key_order(&self) -> bool {
        self.location.is_s3()
    }

    /// The S3 client only computes SHA256 checksums.
    fn check_checksum(
        &self,
        bucket: &str,
        key: &str,
        options: &PutOptions,
    ) -> Result<(), StoreError> {
        match &options.checksum {
            Some(checksum)
                if self.location.is_s3() && checksum.algorithm != ChecksumAlgorithm::Sha256 =>
            {
                Err(StoreError::unsupported(
                    "put_object",
                    format!(
                        "{} checksum for {bucket}/{key}; S3 uploads are verified with SHA256",
                        checksum.algorithm
                    ),
                ))
            }
            _ => Ok(()),
        }
    }

    async fn head(&self, bucket: &str, key: &str) -> Result<bool, StoreError> {
        match self.store(bucket)?.head(&ObjectPath::from(key)).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(store_error("head_object", &e)),
        }
    }

    /// Copies across buckets by streaming the source into a multipart upload.
    async fn stream_copy(
        &self,
        source_bucket: &str,
        source_key: &str,
        destination_bucket: &str,
        destination_key: &str,
        storage_class: Option<&str>,
    ) -> Result<(), StoreError> {
        let source_path = ObjectPath::from(source_key);
        let source = match self.store(source_bucket)?.get(&source_path).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => {
                return Err(StoreError::not_found(source_bucket, source_key))
            }
            Err(e) => return Err(store_error("copy_object", &e)),
        };
        let upload = self
            .store_for(destination_bucket, storage_class)?
            .put_multipart(&ObjectPath::from(destination_key))
            .await
            .map_err(|e| store_error("copy_object", &e))?;

        let mut writer = WriteMultipart::new(upload);
        let mut chunks = source.into_stream();
        let copied = async {
            let mut bytes = 0usize;
            while let Some(chunk) = chunks.try_next().await? {
                writer.wait_for_capacity(COPY_CONCURRENCY).await?;
                writer.write(&chunk);
                bytes += chunk.len();
            }
            Ok::<_, object_store::Error>(bytes)
        }
        .await;

        match copied {
            Ok(bytes) => {
                writer
                    .finish()
                    .await
                    .map_err(|e| store_error("copy_object", &e))?;
                debug!(
                    source_bucket,
                    source_key,
                    destination_bucket,
                    destination_key,
                    bytes,
                    "Streamed copy"
                );
                Ok(())
            }
            Err(e) => {
                if let Err(abort) = writer.abort().await {
                    warn!(
                        destination_bucket,
                        destination_key,
                        error = %abort,
                        "Failed to abort upload"
                    );
                }
                Err(store_error("copy_object", &e))
            }
        }
    }
}

#[async_trait]
impl ObjectStoreClient for ObjectStoreBackend {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<&str>,
        max_keys: usize,
    ) -> Result<ListPage, StoreError> {
        let store = self.store(bucket)?;
        let root = listing_root(prefix);
        let stream = match continuation_token {
            Some(token) => store.list_with_offset(root.as_ref(), &ObjectPath::from(token)),
            None => store.list(root.as_ref()),
        };
        let matching = stream
            .try_filter(|meta| futures::future::ready(meta.location.as_ref().starts_with(prefix)));

        let limit = max_keys.max(1);
        // One key of lookahead tells whether the page is truncated. Unordered
        // backends must be read to the end before a page can be cut.
        let metas: object_store::Result<Vec<ObjectMeta>> = if self.lists_in_key_order() {
            matching.take(limit + 1).try_collect().await
        } else {
            matching.try_collect().await
        };
        let mut metas = metas.map_err(|e| store_error("list_objects", &e))?;
        metas.sort_by(|a, b| a.location.cmp(&b.location));

        let is_truncated = metas.len() > limit;
        metas.truncate(limit);
        let objects: Vec<ObjectSummary> = metas.into_iter().map(summary).collect();
        let continuation_token = if is_truncated {
            objects.last().map(|o| o.key.clone())
        } else {
            None
        };

        debug!(bucket, prefix, count = objects.len(), is_truncated, "Listed page");
        Ok(ListPage {
            objects,
            is_truncated,
            continuation_token,
        })
    }

    async fn list_prefix(
        &self,
        bucket: &str,
        prefix: &str,
        _page_size: usize,
    ) -> Result<Vec<ObjectSummary>, StoreError> {
        let store = self.store(bucket)?;
        let root = listing_root(prefix);
        let mut objects: Vec<ObjectSummary> = store
            .list(root.as_ref())
            .try_filter(|meta| futures::future::ready(meta.location.as_ref().starts_with(prefix)))
            .map_ok(summary)
            .try_collect()
            .await
            .map_err(|e| store_error("list_objects", &e))?;
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes, StoreError> {
        let result = match self.store(bucket)?.get(&ObjectPath::from(key)).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => {
                return Err(StoreError::not_found(bucket, key))
            }
            Err(e) => return Err(store_error("get_object", &e)),
        };
        result.bytes().await.map_err(|e| store_error("get_object", &e))
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        options: &PutOptions,
    ) -> Result<(), StoreError> {
        self.check_checksum(bucket, key, options)?;
        let mut tags = TagSet::default();
        for (k, v) in &options.tags {
            tags.push(k, v);
        }
        let put_options = object_store::PutOptions {
            tags,
            ..object_store::PutOptions::default()
        };

        self.store_for(bucket, options.storage_class.as_deref())?
            .put_opts(&ObjectPath::from(key), PutPayload::from(data), put_options)
            .await
            .map_err(|e| store_error("put_object", &e))?;
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
        let storage_class = options.storage_class.as_deref();
        if source_bucket != destination_bucket {
            return self
                .stream_copy(
                    source_bucket,
                    source_key,
                    destination_bucket,
                    destination_key,
                    storage_class,
                )
                .await;
        }

        match self
            .store_for(destination_bucket, storage_class)?
            .copy(&ObjectPath::from(source_key), &ObjectPath::from(destination_key))
            .await
        {
            Ok(()) => Ok(()),
            Err(object_store::Error::NotFound { .. }) => {
                Err(StoreError::not_found(source_bucket, source_key))
            }
            Err(e) => Err(store_error("copy_object", &e)),
        }
    }

    async fn exists(&self, bucket: &str, key: &str) -> Result<bool, StoreError> {
        self.head(bucket, key).await
    }
}
