//! Object storage abstraction.
//!
//! Stages talk to object storage only through [`ObjectStoreClient`]. Two
//! backends are provided:
//!
//! - [`MemoryObjectStore`] for tests and local runs, with fault injection
//! - [`ObjectStoreBackend`] on top of the `object_store` crate (S3 or local disk)
//!
//! ## Pagination
//!
//! Listings are paged. [`list_all`] defers to
//! [`ObjectStoreClient::list_prefix`], which by default follows continuation
//! tokens to exhaustion; a page that reports truncation without a token is
//! an error, never a complete listing. Backends that can read a listing in
//! one pass override `list_prefix`.

mod backend;
mod memory;
mod uri;

pub use backend::{BucketWriteSettings, ObjectStoreBackend, StoreLocation};
pub use memory::{MemoryObjectStore, StoredObject};
pub use uri::{parse_bucket_key, S3Uri};

use crate::config::ChecksumAlgorithm;
use crate::errors::StoreError;
use crate::utils::Timestamp;
use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use md5::{Digest as _, Md5};
use sha2::Sha256;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A listed object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    /// Object key.
    pub key: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time, when the backend reports one.
    pub last_modified: Option<Timestamp>,
}

/// One page of a listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Objects on this page, in key order.
    pub objects: Vec<ObjectSummary>,
    /// Whether more objects follow.
    pub is_truncated: bool,
    /// Token for the next page.
    pub continuation_token: Option<String>,
}

/// Checksum attached to an upload, base64 encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectChecksum {
    /// Algorithm.
    pub algorithm: ChecksumAlgorithm,
    /// Base64 digest.
    pub value: String,
}

impl ObjectChecksum {
    /// Computes the checksum of a payload.
    #[must_use]
    pub fn compute(algorithm: ChecksumAlgorithm, data: &[u8]) -> Self {
        let digest = match algorithm {
            ChecksumAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
            ChecksumAlgorithm::Md5 => Md5::digest(data).to_vec(),
        };
        Self {
            algorithm,
            value: base64::engine::general_purpose::STANDARD.encode(digest),
        }
    }
}

/// Options for uploads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutOptions {
    /// Storage class.
    pub storage_class: Option<String>,
    /// Checksum the store should verify.
    pub checksum: Option<ObjectChecksum>,
    /// Object tags.
    pub tags: BTreeMap<String, String>,
}

/// Options for copies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopyOptions {
    /// Storage class of the copy.
    pub storage_class: Option<String>,
}

impl CopyOptions {
    /// Copy into a given storage class.
    #[must_use]
    pub fn with_storage_class(storage_class: Option<String>) -> Self {
        Self { storage_class }
    }
}

/// Object-store client consumed by every stage.
#[async_trait]
pub trait ObjectStoreClient: Send + Sync + std::fmt::Debug {
    /// Lists one page of objects whose keys start with `prefix`.
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<&str>,
        max_keys: usize,
    ) -> Result<ListPage, StoreError>;

    /// Reads an object.
    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes, StoreError>;

    /// Writes an object.
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        options: &PutOptions,
    ) -> Result<(), StoreError>;

    /// Copies an object, possibly across buckets.
    async fn copy(
        &self,
        source_bucket: &str,
        source_key: &str,
        destination_bucket: &str,
        destination_key: &str,
        options: &CopyOptions,
    ) -> Result<(), StoreError>;

    /// Probes for an object.
    ///
    /// `Ok(false)` means definitely absent. An `Err` means the probe was
    /// ambiguous and the caller must not assume absence.
    async fn exists(&self, bucket: &str, key: &str) -> Result<bool, StoreError>;

    /// Lists every object under `prefix`, in key order.
    async fn list_prefix(
        &self,
        bucket: &str,
        prefix: &str,
        page_size: usize,
    ) -> Result<Vec<ObjectSummary>, StoreError> {
        paginate(self, bucket, prefix, page_size).await
    }
}

/// Lists every object under `prefix`.
pub async fn list_all(
    client: &dyn ObjectStoreClient,
    bucket: &str,
    prefix: &str,
    page_size: usize,
) -> Result<Vec<ObjectSummary>, StoreError> {
    let objects = client.list_prefix(bucket, prefix, page_size).await?;
    debug!(bucket, prefix, objects = objects.len(), "Listed objects");
    Ok(objects)
}

/// Follows continuation tokens through [`ObjectStoreClient::list_page`].
async fn paginate<C>(
    client: &C,
    bucket: &str,
    prefix: &str,
    page_size: usize,
) -> Result<Vec<ObjectSummary>, StoreError>
where
    C: ObjectStoreClient + ?Sized,
{
    let mut objects = Vec::new();
    let mut token: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = client
            .list_page(bucket, prefix, token.as_deref(), page_size)
            .await?;
        pages += 1;
        objects.extend(page.objects);

        if !page.is_truncated {
            break;
        }
        match page.continuation_token {
            Some(next) => token = Some(next),
            None => {
                return Err(StoreError::TruncatedListing {
                    bucket: bucket.to_string(),
                    prefix: prefix.to_string(),
                })
            }
        }
    }

    debug!(bucket, prefix, pages, "Followed listing pages");
    Ok(objects)
}

/// Lists every key under `prefix`.
pub async fn list_keys(
    client: &dyn ObjectStoreClient,
    bucket: &str,
    prefix: &str,
    page_size: usize,
) -> Result<Vec<String>, StoreError> {
    Ok(list_all(client, bucket, prefix, page_size)
        .await?
        .into_iter()
        .map(|o| o.key)
        .collect())
}

/// Downloads an object into `directory`, named after its basename.
pub async fn download(
    client: &dyn ObjectStoreClient,
    bucket: &str,
    key: &str,
    directory: &Path,
) -> Result<PathBuf, StoreError> {
    let data = client.get(bucket, key).await?;
    let path = directory.join(crate::naming::basename(key));
    tokio::fs::write(&path, &data).await?;
    debug!(bucket, key, path = %path.display(), bytes = data.len(), "Downloaded object");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_all_follows_tokens() {
        let store = MemoryObjectStore::new().with_page_size(2);
        for i in 0..5 {
            store.insert("b", &format!("p/{i}.nc"), Bytes::from_static(b"x"));
        }
        store.insert("b", "q/other.nc", Bytes::from_static(b"x"));

        let keys = list_keys(&store, "b", "p/", 1000).await.unwrap();
        assert_eq!(keys.len(), 5);
        assert_eq!(store.list_calls(), 3);
    }

    /// Serves listings in one pass and refuses single pages.
    #[derive(Debug)]
    struct SinglePassStore(MemoryObjectStore);

    #[async_trait]
    impl ObjectStoreClient for SinglePassStore {
        async fn list_page(
            &self,
            _bucket: &str,
            _prefix: &str,
            _continuation_token: Option<&str>,
            _max_keys: usize,
        ) -> Result<ListPage, StoreError> {
            Err(StoreError::unsupported("list_objects", "paged listing"))
        }

        async fn list_prefix(
            &self,
            bucket: &str,
            prefix: &str,
            _page_size: usize,
        ) -> Result<Vec<ObjectSummary>, StoreError> {
            paginate(&self.0, bucket, prefix, usize::MAX).await
        }

        async fn get(&self, bucket: &str, key: &str) -> Result<Bytes, StoreError> {
            self.0.get(bucket, key).await
        }

        async fn put(
            &self,
            bucket: &str,
            key: &str,
            data: Bytes,
            options: &PutOptions,
        ) -> Result<(), StoreError> {
            self.0.put(bucket, key, data, options).await
        }

        async fn copy(
            &self,
            source_bucket: &str,
            source_key: &str,
            destination_bucket: &str,
            destination_key: &str,
            options: &CopyOptions,
        ) -> Result<(), StoreError> {
            self.0
                .copy(source_bucket, source_key, destination_bucket, destination_key, options)
                .await
        }

        async fn exists(&self, bucket: &str, key: &str) -> Result<bool, StoreError> {
            self.0.exists(bucket, key).await
        }
    }

    #[tokio::test]
    async fn test_list_all_uses_single_pass_listing() {
        let inner = MemoryObjectStore::new().with_page_size(2);
        for i in 0..5 {
            inner.insert("b", &format!("p/{i}.nc"), Bytes::from_static(b"x"));
        }
        let store = SinglePassStore(inner);

        let keys = list_keys(&store, "b", "p/", 2).await.unwrap();

        assert_eq!(keys.len(), 5);
        assert_eq!(store.0.list_calls(), 3);
        assert!(store.list_page("b", "p/", None, 2).await.is_err());
    }

    #[tokio::test]
    async fn test_truncated_without_token_is_error() {
        let store = MemoryObjectStore::new().with_page_size(1);
        store.insert("b", "p/1", Bytes::from_static(b"x"));
        store.insert("b", "p/2", Bytes::from_static(b"x"));
        store.drop_continuation_tokens();

        let err = list_all(&store, "b", "p/", 1000).await.unwrap_err();
        assert!(matches!(err, StoreError::TruncatedListing { .. }));
    }

    #[tokio::test]
    async fn test_download() {
        let store = MemoryObjectStore::new();
        store.insert("b", "p/file.nc", Bytes::from_static(b"payload"));
        let dir = tempfile::tempdir().unwrap();

        let path = download(&store, "b", "p/file.nc", dir.path()).await.unwrap();
        assert_eq!(path.file_name().unwrap(), "file.nc");
        assert_eq!(std::fs::read(path).unwrap(), b"payload");
    }

    #[test]
    fn test_checksums() {
        let sha = ObjectChecksum::compute(ChecksumAlgorithm::Sha256, b"abc");
        assert_eq!(sha.value, "ungWv48Bz+pBQUDeXa4iI7ADYaOWF3qctBD/YfIAFa0=");
        let md5 = ObjectChecksum::compute(ChecksumAlgorithm::Md5, b"abc");
        assert_eq!(md5.value, "kAFQmDzST7DWlj99KOF/cg==");
    }
}
