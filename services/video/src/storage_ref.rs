//! Persisted form of a stored video's location.
//!
//! A reference is `{bucket},{key}`: no URL, no credentials, no expiry. It is
//! expanded into a signed URL on every read.

use std::fmt;
use thiserror::Error;

const DELIMITER: char = ',';

#[derive(Error, Debug, PartialEq, Eq)]
pub enum StorageRefError {
    #[error("bucket name must not be empty")]
    EmptyBucket,

    #[error("object key must not be empty")]
    EmptyKey,

    #[error("{field} contains the reference delimiter ','")]
    ContainsDelimiter { field: &'static str },
}

/// Bucket and key of a stored object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageReference {
    bucket: String,
    key: String,
}

impl StorageReference {
    /// Build a reference, refusing fields that would make it undecodable
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Result<Self, StorageRefError> {
        let bucket = bucket.into();
        let key = key.into();

        if bucket.is_empty() {
            return Err(StorageRefError::EmptyBucket);
        }
        if key.is_empty() {
            return Err(StorageRefError::EmptyKey);
        }
        if bucket.contains(DELIMITER) {
            return Err(StorageRefError::ContainsDelimiter { field: "bucket" });
        }
        if key.contains(DELIMITER) {
            return Err(StorageRefError::ContainsDelimiter { field: "key" });
        }

        Ok(Self { bucket, key })
    }

    /// Split a persisted reference on its first comma.
    ///
    /// `None` means the value holds no usable location; callers treat that as
    /// "no video yet", not as a fault.
    pub fn parse(reference: &str) -> Option<Self> {
        let (bucket, key) = reference.split_once(DELIMITER)?;

        Some(Self {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }

    /// The exact string persisted on the video record
    pub fn encode(&self) -> String {
        self.to_string()
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for StorageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.bucket, DELIMITER, self.key)
    }
}
