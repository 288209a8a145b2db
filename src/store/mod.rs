//! Artifact storage: an opaque put/get blob namespace.
//!
//! Backends:
//! - [`MemoryStore`] for tests and one-shot runs
//! - [`FsStore`] mapping keys to files under a root directory
//! - [`HttpStore`] speaking plain PUT/GET to an object store endpoint

pub mod fs;
pub mod http;
pub mod keys;
pub mod memory;

use std::sync::Arc;

use thiserror::Error;

pub use fs::FsStore;
pub use http::HttpStore;
pub use keys::{ArtifactRole, RunKeys, sanitize_name};
pub use memory::MemoryStore;

use crate::config::StoreSettings;

/// Content type of every image artifact
pub const PNG_CONTENT_TYPE: &str = "image/png";

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid artifact key '{0}'")]
    InvalidKey(String),

    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store request for '{key}' failed: {reason}")]
    Http { key: String, reason: String },
}

/// Blob namespace holding comparison artifacts
pub trait ArtifactStore: Send + Sync {
    /// Persist `bytes` under `key`; visible to `get` once this returns Ok
    fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> StoreResult<()>;

    /// Fetch the bytes stored under `key`, `None` when absent
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Identifier for logs
    fn name(&self) -> &str;
}

/// Keys are relative slash-separated paths without empty or dot segments
pub fn validate_key(key: &str) -> StoreResult<()> {
    let bad = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key
            .split('/')
            .any(|seg| seg.is_empty() || seg == "." || seg == "..");
    if bad {
        Err(StoreError::InvalidKey(key.to_string()))
    } else {
        Ok(())
    }
}

/// Pick the store described by the settings: HTTP when a URL is set, else the filesystem
pub fn from_settings(settings: &StoreSettings) -> Arc<dyn ArtifactStore> {
    match &settings.url {
        Some(url) => Arc::new(HttpStore::new(url.clone()).with_token(settings.token.clone())),
        None => Arc::new(FsStore::new(settings.artifact_dir.clone())),
    }
}
