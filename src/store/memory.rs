//! In-memory [`DocumentStore`] for tests and single-process use.

use std::collections::HashMap;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::document_matches;
use crate::models::Document;
use crate::traits::DocumentStore;

#[derive(Default)]
pub struct InMemoryDocumentStore {
    docs: RwLock<HashMap<String, Document>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.docs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Snapshot of every stored document, in no particular order.
    pub async fn all(&self) -> Vec<Document> {
        self.docs.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn upsert(&self, doc: &Document) -> Result<()> {
        if doc.id.is_empty() {
            bail!("Document id must not be empty");
        }
        let mut docs = self.docs.write().await;
        let mut stored = doc.clone();
        stored.updated_at = Utc::now();
        if let Some(existing) = docs.get(&doc.id) {
            stored.created_at = existing.created_at;
        }
        docs.insert(doc.id.clone(), stored);
        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Document>> {
        Ok(self.docs.read().await.get(id).cloned())
    }

    async fn search_text(&self, query: &str, limit: usize) -> Result<Vec<Document>> {
        let needle = query.to_lowercase();
        let docs = self.docs.read().await;
        let mut hits: Vec<Document> = docs
            .values()
            .filter(|d| document_matches(d, &needle))
            .cloned()
            .collect();
        hits.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        hits.truncate(limit);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_upsert_preserves_created_at() {
        let store = InMemoryDocumentStore::new();
        let mut doc = Document::new("d1", "Old title", "body", "CSS");
        doc.created_at = Utc::now() - Duration::days(3);
        store.upsert(&doc).await.unwrap();
        let first = store.get_by_id("d1").await.unwrap().unwrap();

        let mut updated = Document::new("d1", "New title", "body", "CSS");
        updated.created_at = Utc::now();
        store.upsert(&updated).await.unwrap();
        let second = store.get_by_id("d1").await.unwrap().unwrap();

        assert_eq!(second.title, "New title");
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at >= first.updated_at);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive_and_newest_first() {
        let store = InMemoryDocumentStore::new();
        let mut old = Document::new("a", "CSS Grid", "layout", "CSS");
        old.created_at = Utc::now() - Duration::hours(1);
        let new = Document::new("b", "Flexbox", "css flex layout", "CSS");
        store.upsert(&old).await.unwrap();
        store.upsert(&new).await.unwrap();
        store
            .upsert(&Document::new("c", "Intro", "python", "Python"))
            .await
            .unwrap();

        let hits = store.search_text("css", 10).await.unwrap();
        let ids: Vec<_> = hits.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(store.search_text("css", 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_search_matches_metadata_values() {
        let store = InMemoryDocumentStore::new();
        let mut doc = Document::new("d1", "Page", "text", "HTML");
        doc.metadata
            .insert("source_url".into(), "https://example.com/x".into());
        store.upsert(&doc).await.unwrap();
        assert_eq!(
            store
                .search_text("https://example.com/x", 1)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_rejects_empty_id() {
        let store = InMemoryDocumentStore::new();
        assert!(store.upsert(&Document::new("", "t", "c", "x")).await.is_err());
    }
}
