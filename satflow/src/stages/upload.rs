//! Uploading stage outputs with checksum and tags.

use crate::config::{ChecksumAlgorithm, UploadConfig};
use crate::context::StageContext;
use crate::errors::SatflowError;
use crate::events::NotificationKind;
use crate::storage::{ObjectChecksum, ObjectStoreClient, PutOptions};
use bytes::Bytes;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// One file to upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadItem {
    /// Local file.
    pub path: PathBuf,
    /// Destination bucket.
    pub bucket: String,
    /// Destination key.
    pub key: String,
}

/// A completed upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadReceipt {
    /// Destination bucket.
    pub bucket: String,
    /// Destination key.
    pub key: String,
    /// Checksum algorithm.
    pub checksum_algorithm: ChecksumAlgorithm,
    /// Base64 checksum.
    pub checksum: String,
}

/// A failed upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadFailure {
    /// Destination key.
    pub key: String,
    /// What went wrong.
    pub error: String,
}

/// Outcome of a batch of uploads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UploadReport {
    /// Completed uploads.
    pub uploaded: Vec<UploadReceipt>,
    /// Failed uploads.
    pub failed: Vec<UploadFailure>,
}

impl UploadReport {
    /// Returns true if every upload succeeded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Returns the report as a JSON value.
    #[must_use]
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Uploads files with the configured checksum and tags.
#[derive(Debug, Clone, Copy)]
pub struct Uploader<'a> {
    objects: &'a dyn ObjectStoreClient,
    settings: &'a UploadConfig,
}

impl<'a> Uploader<'a> {
    /// Creates an uploader.
    #[must_use]
    pub fn new(objects: &'a dyn ObjectStoreClient, settings: &'a UploadConfig) -> Self {
        Self { objects, settings }
    }

    /// Uploads one file.
    pub async fn upload_file(
        &self,
        path: &Path,
        bucket: &str,
        key: &str,
    ) -> Result<UploadReceipt, SatflowError> {
        let data = tokio::fs::read(path).await?;
        let checksum = ObjectChecksum::compute(self.settings.checksum_algorithm, &data);
        let options = PutOptions {
            storage_class: None,
            checksum: Some(checksum.clone()),
            tags: self.settings.tags.clone(),
        };
        self.objects
            .put(bucket, key, Bytes::from(data), &options)
            .await?;
        Ok(UploadReceipt {
            bucket: bucket.to_string(),
            key: key.to_string(),
            checksum_algorithm: checksum.algorithm,
            checksum: checksum.value,
        })
    }

    /// Uploads every item, continuing past failures.
    pub async fn upload_all(&self, ctx: &StageContext, items: &[UploadItem]) -> UploadReport {
        let mut report = UploadReport::default();
        for item in items {
            match self.upload_file(&item.path, &item.bucket, &item.key).await {
                Ok(receipt) => {
                    info!(bucket = %item.bucket, key = %item.key, "Uploaded");
                    ctx.notify(
                        NotificationKind::ArtifactUploaded,
                        serde_json::json!({"bucket": item.bucket, "key": item.key}),
                    )
                    .await;
                    report.uploaded.push(receipt);
                }
                Err(e) => {
                    error!(bucket = %item.bucket, key = %item.key, error = %e, "Upload failed");
                    report.failed.push(UploadFailure {
                        key: item.key.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }
        report
    }
}
