use super::{hash_text, CacheResult, TieredCache, EMBEDDING_KEY_PREFIX};

/// Embedding vectors keyed by a SHA-256 of their source text under `emb:`.
pub struct EmbeddingCache<'a> {
    cache: &'a TieredCache,
}

impl<'a> EmbeddingCache<'a> {
    pub(super) fn new(cache: &'a TieredCache) -> Self {
        Self { cache }
    }

    fn key(text: &str) -> String {
        format!("{}{}", EMBEDDING_KEY_PREFIX, hash_text(text))
    }

    pub async fn get(&self, text: &str) -> CacheResult<Option<Vec<f32>>> {
        self.cache.get_json(&Self::key(text)).await
    }

    pub async fn set(&self, text: &str, embedding: &[f32]) -> CacheResult<()> {
        self.cache.set_json(&Self::key(text), embedding).await
    }

    pub async fn delete(&self, text: &str) -> CacheResult<()> {
        self.cache.delete_key(&Self::key(text)).await
    }
}
