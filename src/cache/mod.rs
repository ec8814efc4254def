//! Cache store contract and the document cache-aside layer built on it.

mod documents;
mod memory;

pub use documents::DocumentCache;
pub use memory::MemoryCache;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by a cache store or while encoding cached values.
///
/// A miss is not an error; stores report it as `Ok(None)`.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),

    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Key/value store with per-entry TTL and prefix key listing.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;
    /// Removes every listed key. Absent keys are ignored.
    async fn delete(&self, keys: &[String]) -> Result<(), CacheError>;
    /// Live keys starting with `prefix`.
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, CacheError>;
}
