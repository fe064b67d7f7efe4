use super::{CacheResult, TieredCache, SEARCH_KEY_PREFIX};
use crate::models::Document;

/// Search results keyed by the literal `(query, limit)` pair under `search:`.
///
/// Queries are not normalized: `"CSS"` and `"css"` are different entries.
pub struct SearchCache<'a> {
    cache: &'a TieredCache,
}

impl<'a> SearchCache<'a> {
    pub(super) fn new(cache: &'a TieredCache) -> Self {
        Self { cache }
    }

    fn query_prefix(query: &str) -> String {
        format!("{}query:{}:limit:", SEARCH_KEY_PREFIX, query)
    }

    fn key(query: &str, limit: usize) -> String {
        format!("{}{}", Self::query_prefix(query), limit)
    }

    pub async fn get(&self, query: &str, limit: usize) -> CacheResult<Option<Vec<Document>>> {
        self.cache.get_json(&Self::key(query, limit)).await
    }

    pub async fn set(&self, query: &str, limit: usize, docs: &[Document]) -> CacheResult<()> {
        self.cache.set_json(&Self::key(query, limit), docs).await
    }

    /// Drop the cached results for `query` at every limit.
    pub async fn delete(&self, query: &str) -> CacheResult<()> {
        let prefix = Self::query_prefix(query);
        self.cache.check_key(&prefix)?;
        for key in self.cache.backend.keys(&format!("{}*", prefix)).await? {
            self.cache.backend.delete(&key).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::cache::test_support::cache;
    use crate::models::Document;

    #[tokio::test]
    async fn test_keys_are_case_sensitive() {
        let cache = cache();
        let docs = vec![Document::new("d1", "Grid", "body", "CSS")];
        cache.search().set("CSS", 10, &docs).await.unwrap();

        assert_eq!(cache.search().get("CSS", 10).await.unwrap(), Some(docs));
        assert!(cache.search().get("css", 10).await.unwrap().is_none());
        assert!(cache.search().get("CSS", 5).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_drops_all_limits_for_query() {
        let cache = cache();
        cache.search().set("CSS", 5, &[]).await.unwrap();
        cache.search().set("CSS", 10, &[]).await.unwrap();
        cache.search().set("CSS grid", 10, &[]).await.unwrap();

        cache.search().delete("CSS").await.unwrap();
        assert!(cache.search().get("CSS", 5).await.unwrap().is_none());
        assert!(cache.search().get("CSS", 10).await.unwrap().is_none());
        assert!(cache.search().get("CSS grid", 10).await.unwrap().is_some());
    }
}
