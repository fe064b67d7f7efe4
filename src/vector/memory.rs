//! In-memory [`VectorIndex`] using brute-force cosine similarity.

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::embedding::cosine_similarity;
use crate::models::{SearchResult, VectorMetadata, VectorRecord};
use crate::traits::VectorIndex;

struct StoredPoint {
    id: String,
    record: VectorRecord,
}

#[derive(Default)]
pub struct InMemoryVectorIndex {
    points: RwLock<Vec<StoredPoint>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.points.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Metadata of every stored point, in insertion order.
    pub async fn metadata(&self) -> Vec<VectorMetadata> {
        self.points
            .read()
            .await
            .iter()
            .map(|p| p.record.metadata.clone())
            .collect()
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn upsert(&self, vector: &[f32], metadata: VectorMetadata) -> Result<()> {
        if vector.is_empty() {
            bail!("Refusing to store an empty vector");
        }
        self.points.write().await.push(StoredPoint {
            id: uuid::Uuid::new_v4().to_string(),
            record: VectorRecord {
                vector: vector.to_vec(),
                metadata,
            },
        });
        Ok(())
    }

    async fn query(&self, vector: &[f32], limit: usize) -> Result<Vec<SearchResult>> {
        if vector.is_empty() {
            bail!("Refusing to search with an empty vector");
        }
        let points = self.points.read().await;
        let mut scored: Vec<SearchResult> = points
            .iter()
            .map(|p| SearchResult {
                id: p.id.clone(),
                score: cosine_similarity(vector, &p.record.vector),
                metadata: p.record.metadata.clone(),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(id: &str) -> VectorMetadata {
        let mut m = VectorMetadata::new();
        m.insert("document_id".into(), id.into());
        m
    }

    #[tokio::test]
    async fn test_query_orders_by_similarity() {
        let index = InMemoryVectorIndex::new();
        index.upsert(&[1.0, 0.0], meta("x")).await.unwrap();
        index.upsert(&[0.0, 1.0], meta("y")).await.unwrap();
        index.upsert(&[0.7, 0.7], meta("xy")).await.unwrap();

        let hits = index.query(&[1.0, 0.1], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].document_id(), Some("x"));
        assert_eq!(hits[1].document_id(), Some("xy"));
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn test_rejects_empty_vectors() {
        let index = InMemoryVectorIndex::new();
        assert!(index.upsert(&[], meta("x")).await.is_err());
        assert!(index.query(&[], 5).await.is_err());
    }

    #[tokio::test]
    async fn test_points_get_distinct_ids() {
        let index = InMemoryVectorIndex::new();
        index.upsert(&[1.0], meta("a")).await.unwrap();
        index.upsert(&[1.0], meta("a")).await.unwrap();
        let hits = index.query(&[1.0], 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_ne!(hits[0].id, hits[1].id);
    }
}
