//! Process-wide collaborator handles.
//!
//! Built once by the binary with [`Backends::open`] and passed by reference
//! to [`QueryEngine`](crate::engine::QueryEngine) and
//! [`IngestionPipeline`](crate::ingest::IngestionPipeline). Every handle is
//! shared and safe for concurrent use.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use sqlx::SqlitePool;
use tracing::info;

use crate::cache::{CacheBackend, LruCacheBackend, SqliteCacheBackend, TieredCache};
use crate::config::Config;
use crate::db;
use crate::embedding::create_model;
use crate::extract::{HttpFetcher, PageFetcher};
use crate::queue::SqliteJobQueue;
use crate::store::SqliteDocumentStore;
use crate::traits::{DocumentStore, JobQueue, LanguageModel, VectorIndex};
use crate::vector::create_index;

#[derive(Clone)]
pub struct Backends {
    pub model: Arc<dyn LanguageModel>,
    pub vectors: Arc<dyn VectorIndex>,
    pub store: Arc<dyn DocumentStore>,
    pub queue: Arc<dyn JobQueue>,
    pub cache: TieredCache,
    pub fetcher: Arc<dyn PageFetcher>,
    db: Option<SqlitePool>,
}

impl Backends {
    /// Assemble from ready-made handles.
    pub fn new(
        model: Arc<dyn LanguageModel>,
        vectors: Arc<dyn VectorIndex>,
        store: Arc<dyn DocumentStore>,
        queue: Arc<dyn JobQueue>,
        cache: TieredCache,
        fetcher: Arc<dyn PageFetcher>,
    ) -> Self {
        Self {
            model,
            vectors,
            store,
            queue,
            cache,
            fetcher,
            db: None,
        }
    }

    /// Open the database (running migrations), connect the vector index and
    /// build every other handle from `config`.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::open(&config.db).await?;

        let cache_backend: Arc<dyn CacheBackend> = match config.cache.backend.as_str() {
            "memory" => Arc::new(LruCacheBackend::new(config.cache.max_bytes)),
            _ => Arc::new(SqliteCacheBackend::new(pool.clone(), config.cache.max_bytes)),
        };

        let backends = Self {
            model: create_model(&config.model)?,
            vectors: create_index(&config.vector).await?,
            store: Arc::new(SqliteDocumentStore::new(pool.clone())),
            queue: Arc::new(SqliteJobQueue::new(
                pool.clone(),
                config.queue.topic.clone(),
                Duration::from_millis(config.queue.poll_interval_ms),
            )),
            cache: TieredCache::from_config(&config.cache, cache_backend),
            fetcher: Arc::new(HttpFetcher::new(&config.ingest)?),
            db: Some(pool),
        };

        info!(
            db = %config.db.path.display(),
            model = %config.model.provider,
            vectors = %config.vector.provider,
            cache = %config.cache.backend,
            "Backends ready"
        );
        Ok(backends)
    }

    /// Close the database pool, if this instance opened one.
    pub async fn close(self) {
        if let Some(pool) = self.db {
            pool.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_open_with_local_providers() {
        let tmp = TempDir::new().unwrap();
        let toml = format!(
            "[db]\npath = \"{}\"\n[model]\nprovider = \"disabled\"\n[vector]\nprovider = \"memory\"\n",
            tmp.path().join("docsai.sqlite").display()
        );
        let config: Config = toml::from_str(&toml).unwrap();
        let backends = Backends::open(&config).await.unwrap();

        assert!(backends.cache.health().await.is_ok());
        assert!(backends.store.get_by_id("missing").await.unwrap().is_none());
        backends.queue.publish("scrape-jobs", b"{}").await.unwrap();
        assert_eq!(backends.queue.consume().await.unwrap(), b"{}".to_vec());
        backends.close().await;

        assert!(tmp.path().join("docsai.sqlite").exists());
    }
}
