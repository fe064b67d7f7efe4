//! Tiered cache-aside layer.
//!
//! Four logical caches share one physical [`CacheBackend`] and one TTL, each
//! in its own key namespace:
//!
//! | View | Prefix | Keyed by |
//! |------|--------|----------|
//! | [`DocumentCache`] | `doc:` | document id |
//! | [`EmbeddingCache`] | `emb:` | SHA-256 of the source text |
//! | [`SearchCache`] | `search:` | literal `(query, limit)` |
//! | [`ChatCache`] | `chat:` | session id |
//!
//! Backends: [`LruCacheBackend`] (in-process) and [`SqliteCacheBackend`]
//! (shared through the database file). Key and value size limits are
//! checked here, before a backend sees the write.
//!
//! # Failure semantics
//!
//! A miss is `Ok(None)`, never an error. Every `Err` is either a size-limit
//! violation (nothing was cached) or a backend failure; callers treat both
//! as a miss and fall back to the source of truth.

mod chat;
mod document;
mod embedding;
pub mod memory;
mod search;
pub mod sqlite;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::CacheConfig;
use crate::locks::KeyedLocks;

pub use chat::ChatCache;
pub use document::DocumentCache;
pub use embedding::EmbeddingCache;
pub use memory::LruCacheBackend;
pub use search::SearchCache;
pub use sqlite::SqliteCacheBackend;

pub const DOCUMENT_KEY_PREFIX: &str = "doc:";
pub const EMBEDDING_KEY_PREFIX: &str = "emb:";
pub const SEARCH_KEY_PREFIX: &str = "search:";
pub const CHAT_KEY_PREFIX: &str = "chat:";

/// Errors raised by the cache layer.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("key size {size} exceeds maximum of {max} bytes")]
    KeyTooLarge { size: usize, max: usize },

    #[error("value size {size} exceeds maximum of {max} bytes")]
    ValueTooLarge { size: usize, max: usize },

    #[error("cache serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("cache backend error: {0}")]
    Backend(String),
}

impl CacheError {
    /// True for the size-limit variants.
    pub fn is_size_limit(&self) -> bool {
        matches!(
            self,
            CacheError::KeyTooLarge { .. } | CacheError::ValueTooLarge { .. }
        )
    }
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Physical key-value store underneath the tiered cache.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()>;

    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Live keys matching `pattern`; a trailing `*` matches any suffix.
    async fn keys(&self, pattern: &str) -> CacheResult<Vec<String>>;

    /// Liveness probe.
    async fn ping(&self) -> CacheResult<()> {
        Ok(())
    }
}

/// Size limits enforced before anything reaches the backend.
#[derive(Debug, Clone, Copy)]
pub struct CacheLimits {
    pub max_key_bytes: usize,
    pub max_value_bytes: usize,
}

impl From<&CacheConfig> for CacheLimits {
    fn from(config: &CacheConfig) -> Self {
        Self {
            max_key_bytes: config.max_key_bytes,
            max_value_bytes: config.max_value_bytes,
        }
    }
}

/// Entry point to the four cache views.
///
/// Cheap to clone; all clones share the backend and the per-session locks.
#[derive(Clone)]
pub struct TieredCache {
    backend: Arc<dyn CacheBackend>,
    limits: CacheLimits,
    ttl: Duration,
    session_locks: Arc<KeyedLocks>,
}

impl TieredCache {
    pub fn new(backend: Arc<dyn CacheBackend>, limits: CacheLimits, ttl: Duration) -> Self {
        Self {
            backend,
            limits,
            ttl,
            session_locks: Arc::new(KeyedLocks::default()),
        }
    }

    /// Build from configuration over `backend`.
    pub fn from_config(config: &CacheConfig, backend: Arc<dyn CacheBackend>) -> Self {
        Self::new(backend, CacheLimits::from(config), config.ttl())
    }

    pub fn document(&self) -> DocumentCache<'_> {
        DocumentCache::new(self)
    }

    pub fn embedding(&self) -> EmbeddingCache<'_> {
        EmbeddingCache::new(self)
    }

    pub fn search(&self) -> SearchCache<'_> {
        SearchCache::new(self)
    }

    pub fn chat(&self) -> ChatCache<'_> {
        ChatCache::new(self)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn health(&self) -> CacheResult<()> {
        self.backend.ping().await
    }

    fn check_key(&self, key: &str) -> CacheResult<()> {
        if key.len() > self.limits.max_key_bytes {
            return Err(CacheError::KeyTooLarge {
                size: key.len(),
                max: self.limits.max_key_bytes,
            });
        }
        Ok(())
    }

    /// Serialize, validate both limits, then write with the shared TTL.
    async fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> CacheResult<()> {
        self.check_key(key)?;
        let data = serde_json::to_vec(value)?;
        if data.len() > self.limits.max_value_bytes {
            return Err(CacheError::ValueTooLarge {
                size: data.len(),
                max: self.limits.max_value_bytes,
            });
        }
        self.backend.set(key, data, self.ttl).await
    }

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<T>> {
        self.check_key(key)?;
        match self.backend.get(key).await? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    async fn delete_key(&self, key: &str) -> CacheResult<()> {
        self.check_key(key)?;
        self.backend.delete(key).await
    }
}

/// Stable cache key fragment for arbitrary text.
pub fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
