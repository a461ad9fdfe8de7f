use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{FsError, FsResult};
use crate::upload::DEFAULT_WRITE_SIZE;

/// Scheme served when none is configured.
pub const DEFAULT_SCHEME: &str = "s3a";

/// Largest number of keys a single multi-object delete may carry.
pub const MAX_DELETE_BATCH: usize = 1000;

/// Configuration for a [`BucketFs`](crate::BucketFs).
///
/// Every field has a default, so a TOML file only needs the keys it
/// overrides:
///
/// ```toml
/// scheme = "s3a"
/// write_chunk_size = 8388608
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FsConfig {
    /// URI scheme accepted by the path resolver (matched case-insensitively).
    pub scheme: String,
    /// Size of each chunk written by the upload path.
    pub write_chunk_size: usize,
    /// Keys per multi-object delete request.
    pub delete_batch_size: usize,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            scheme: DEFAULT_SCHEME.to_string(),
            write_chunk_size: DEFAULT_WRITE_SIZE,
            delete_batch_size: MAX_DELETE_BATCH,
        }
    }
}

impl FsConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> FsResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| FsError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: &Path) -> FsResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Serialize to TOML.
    pub fn to_toml_string(&self) -> FsResult<String> {
        toml::to_string(self).map_err(|e| FsError::Config(e.to_string()))
    }

    /// Check that every value is usable.
    pub fn validate(&self) -> FsResult<()> {
        if self.scheme.is_empty() || !self.scheme.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(FsError::Config(format!(
                "scheme must be non-empty ASCII alphanumerics, got {:?}",
                self.scheme
            )));
        }
        if self.write_chunk_size == 0 {
            return Err(FsError::Config("write_chunk_size must be greater than zero".into()));
        }
        if !(1..=MAX_DELETE_BATCH).contains(&self.delete_batch_size) {
            return Err(FsError::Config(format!(
                "delete_batch_size must be between 1 and {MAX_DELETE_BATCH}, got {}",
                self.delete_batch_size
            )));
        }
        Ok(())
    }

    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    pub fn with_write_chunk_size(mut self, size: usize) -> Self {
        self.write_chunk_size = size;
        self
    }

    pub fn with_delete_batch_size(mut self, size: usize) -> Self {
        self.delete_batch_size = size;
        self
    }
}
