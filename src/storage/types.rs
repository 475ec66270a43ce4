//! Storage types

use serde::{Deserialize, Serialize};

/// What to do when the target key already holds an object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverwritePolicy {
    /// Fail with [`BlobWriteError::AlreadyExists`]
    #[default]
    RejectIfExists,
    /// Replace the existing object
    Replace,
}

/// `Cache-Control: max-age=<seconds>` attached to a stored object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheControl {
    pub max_age_seconds: u32,
}

impl CacheControl {
    pub fn max_age(seconds: u32) -> Self {
        Self {
            max_age_seconds: seconds,
        }
    }

    pub fn header_value(&self) -> String {
        format!("max-age={}", self.max_age_seconds)
    }
}

impl Default for CacheControl {
    fn default() -> Self {
        Self::max_age(3600)
    }
}

/// Options for a single put
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    pub cache_control: CacheControl,
    pub overwrite: OverwritePolicy,
    pub content_type: Option<String>,
}

impl PutOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache_control(mut self, cache_control: CacheControl) -> Self {
        self.cache_control = cache_control;
        self
    }

    pub fn with_overwrite(mut self, overwrite: OverwritePolicy) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Reference to an object written by a successful put
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObjectRef {
    pub path: String,
}

/// Blob write failures
#[derive(Debug, thiserror::Error)]
pub enum BlobWriteError {
    #[error("Object already exists: {bucket}/{key}")]
    AlreadyExists { bucket: String, key: String },

    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("Write to bucket {bucket} rejected: {reason}")]
    Rejected { bucket: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
