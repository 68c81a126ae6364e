//! Object URIs.

use crate::errors::StoreError;
use std::fmt;
use std::str::FromStr;

/// An `s3://bucket/key` URI. The key may be empty or a prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct S3Uri {
    /// Bucket name.
    pub bucket: String,
    /// Key or prefix.
    pub key: String,
}

impl S3Uri {
    /// Creates a URI.
    #[must_use]
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl FromStr for S3Uri {
    type Err = StoreError;

    fn from_str(uri: &str) -> Result<Self, Self::Err> {
        let rest = uri
            .strip_prefix("s3://")
            .ok_or_else(|| StoreError::InvalidUri(format!("expected 's3://' prefix in '{uri}'")))?;
        let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(StoreError::InvalidUri(format!("missing bucket in '{uri}'")));
        }
        Ok(Self::new(bucket, key))
    }
}

impl fmt::Display for S3Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// Splits a `bucket/key` file reference.
pub fn parse_bucket_key(reference: &str) -> Result<(&str, &str), StoreError> {
    match reference.split_once('/') {
        Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => Ok((bucket, key)),
        _ => Err(StoreError::InvalidUri(format!(
            "expected 'bucket/key', got '{reference}'"
        ))),
    }
}
