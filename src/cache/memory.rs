//! In-process [`CacheBackend`] with a byte budget, LRU eviction and
//! per-entry expiry.
//!
//! The budget counts key plus value bytes. When a write pushes the total
//! over `max_bytes`, least-recently-used entries are evicted until it fits.
//! Expired entries are dropped lazily on access and skipped by `keys`.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;
use tokio::sync::Mutex;

use super::{CacheBackend, CacheError, CacheResult};

struct Entry {
    value: Vec<u8>,
    /// `None` when the TTL reaches past what `Instant` can represent.
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

struct Inner {
    entries: LruCache<String, Entry>,
    used_bytes: usize,
}

impl Inner {
    fn remove(&mut self, key: &str) {
        if let Some(old) = self.entries.pop(key) {
            self.used_bytes -= key.len() + old.value.len();
        }
    }
}

/// Byte-budgeted LRU cache.
pub struct LruCacheBackend {
    inner: Mutex<Inner>,
    max_bytes: usize,
}

impl LruCacheBackend {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::unbounded(),
                used_bytes: 0,
            }),
            max_bytes,
        }
    }

    /// Bytes currently accounted to live and not-yet-collected entries.
    pub async fn used_bytes(&self) -> usize {
        self.inner.lock().await.used_bytes
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn matches_pattern(key: &str, pattern: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => key.starts_with(prefix),
        None => key == pattern,
    }
}

#[async_trait]
impl CacheBackend for LruCacheBackend {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        let expired = match inner.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            inner.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        let size = key.len() + value.len();
        if size > self.max_bytes {
            return Err(CacheError::Backend(format!(
                "entry of {} bytes exceeds cache budget of {} bytes",
                size, self.max_bytes
            )));
        }

        let mut inner = self.inner.lock().await;
        inner.remove(key);
        inner.entries.put(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now().checked_add(ttl),
            },
        );
        inner.used_bytes += size;

        while inner.used_bytes > self.max_bytes {
            match inner.entries.pop_lru() {
                Some((k, v)) => inner.used_bytes -= k.len() + v.value.len(),
                None => break,
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.inner.lock().await.remove(key);
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> CacheResult<Vec<String>> {
        let inner = self.inner.lock().await;
        let now = Instant::now();
        Ok(inner
            .entries
            .iter()
            .filter(|(k, e)| !e.is_expired(now) && matches_pattern(k, pattern))
            .map(|(k, _)| k.clone())
            .collect())
    }
}
