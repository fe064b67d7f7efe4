use tracing::debug;

use super::{CacheResult, TieredCache, DOCUMENT_KEY_PREFIX};
use crate::models::Document;

/// Documents keyed by id under `doc:`.
pub struct DocumentCache<'a> {
    cache: &'a TieredCache,
}

impl<'a> DocumentCache<'a> {
    pub(super) fn new(cache: &'a TieredCache) -> Self {
        Self { cache }
    }

    fn key(id: &str) -> String {
        format!("{}{}", DOCUMENT_KEY_PREFIX, id)
    }

    pub async fn get(&self, id: &str) -> CacheResult<Option<Document>> {
        self.cache.get_json(&Self::key(id)).await
    }

    pub async fn set(&self, doc: &Document) -> CacheResult<()> {
        self.cache.set_json(&Self::key(&doc.id), doc).await
    }

    pub async fn delete(&self, id: &str) -> CacheResult<()> {
        self.cache.delete_key(&Self::key(id)).await
    }

    /// Drop every cached document whose category equals `category`.
    ///
    /// Scans all of `doc:*`; entries that vanish or fail to decode mid-scan
    /// are skipped. Returns the number of entries removed.
    pub async fn invalidate_by_category(&self, category: &str) -> CacheResult<usize> {
        let pattern = format!("{}*", DOCUMENT_KEY_PREFIX);
        let keys = self.cache.backend.keys(&pattern).await?;

        let mut removed = 0;
        for key in keys {
            let doc: Document = match self.cache.get_json(&key).await {
                Ok(Some(doc)) => doc,
                Ok(None) => continue,
                Err(e) => {
                    debug!(key = %key, error = %e, "Skipping unreadable cache entry");
                    continue;
                }
            };
            if doc.category == category {
                self.cache.backend.delete(&key).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}
