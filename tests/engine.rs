use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tempfile::TempDir;
use url::Url;

use tech_docs_rag::backends::Backends;
use tech_docs_rag::cache::{
    CacheBackend, CacheError, CacheLimits, CacheResult, LruCacheBackend, TieredCache,
};
use tech_docs_rag::config::DbConfig;
use tech_docs_rag::db;
use tech_docs_rag::engine::{ChatError, QueryEngine};
use tech_docs_rag::extract::PageFetcher;
use tech_docs_rag::models::{
    Document, Role, SearchResult, VectorMetadata, AI_RESPONSE_CATEGORY,
};
use tech_docs_rag::queue::InMemoryJobQueue;
use tech_docs_rag::store::{InMemoryDocumentStore, SqliteDocumentStore};
use tech_docs_rag::traits::{DocumentStore, LanguageModel, VectorIndex};
use tech_docs_rag::vector::InMemoryVectorIndex;

// ============ Test collaborators ============

/// Embeds every text to one vector and records every prompt it completes.
#[derive(Default)]
struct ScriptedModel {
    prompts: Mutex<Vec<String>>,
    fail_embed: bool,
    fail_complete: bool,
}

impl ScriptedModel {
    fn last_prompt(&self) -> String {
        self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        if self.fail_embed {
            anyhow::bail!("embedding service unavailable");
        }
        Ok(vec![1.0, 0.0, 0.0])
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        if self.fail_complete {
            anyhow::bail!("completion service unavailable");
        }
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok("# Generated Tutorial".to_string())
    }
}

/// Returns a fixed result list for every query.
struct FixedHitsIndex {
    hits: Vec<SearchResult>,
    fail: bool,
}

#[async_trait]
impl VectorIndex for FixedHitsIndex {
    async fn upsert(&self, _vector: &[f32], _metadata: VectorMetadata) -> Result<()> {
        Ok(())
    }

    async fn query(&self, _vector: &[f32], _limit: usize) -> Result<Vec<SearchResult>> {
        if self.fail {
            anyhow::bail!("vector index unreachable");
        }
        Ok(self.hits.clone())
    }
}

fn hit(document_id: &str, score: f32) -> SearchResult {
    let mut metadata = VectorMetadata::new();
    metadata.insert("document_id".into(), document_id.into());
    SearchResult {
        id: format!("point-{}", document_id),
        score,
        metadata,
    }
}

/// Cache backend whose every call fails.
struct DownCache;

#[async_trait]
impl CacheBackend for DownCache {
    async fn get(&self, _key: &str) -> CacheResult<Option<Vec<u8>>> {
        Err(CacheError::Backend("connection refused".into()))
    }
    async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> CacheResult<()> {
        Err(CacheError::Backend("connection refused".into()))
    }
    async fn delete(&self, _key: &str) -> CacheResult<()> {
        Err(CacheError::Backend("connection refused".into()))
    }
    async fn keys(&self, _pattern: &str) -> CacheResult<Vec<String>> {
        Err(CacheError::Backend("connection refused".into()))
    }
    async fn ping(&self) -> CacheResult<()> {
        Err(CacheError::Backend("connection refused".into()))
    }
}

struct NoFetch;

#[async_trait]
impl PageFetcher for NoFetch {
    async fn fetch(&self, url: &Url) -> Result<String> {
        anyhow::bail!("unexpected fetch of {}", url)
    }
}

fn cache_over(backend: Arc<dyn CacheBackend>, max_value_bytes: usize) -> TieredCache {
    TieredCache::new(
        backend,
        CacheLimits {
            max_key_bytes: 1024,
            max_value_bytes,
        },
        Duration::from_secs(3600),
    )
}

fn lru_cache() -> TieredCache {
    cache_over(Arc::new(LruCacheBackend::new(1024 * 1024)), 5 * 1024 * 1024)
}

fn backends(
    model: Arc<ScriptedModel>,
    vectors: Arc<dyn VectorIndex>,
    store: Arc<dyn DocumentStore>,
    cache: TieredCache,
) -> Backends {
    Backends::new(
        model,
        vectors,
        store,
        Arc::new(InMemoryJobQueue::new("scrape-jobs")),
        cache,
        Arc::new(NoFetch),
    )
}

// ============ Threshold gate ============

#[tokio::test]
async fn test_threshold_excludes_exactly_point_seven() {
    let store = Arc::new(InMemoryDocumentStore::new());
    store
        .upsert(&Document::new("at", "At Threshold", "excluded body", "Test"))
        .await
        .unwrap();
    store
        .upsert(&Document::new("above", "Above Threshold", "included body", "Test"))
        .await
        .unwrap();

    let model = Arc::new(ScriptedModel::default());
    let index = Arc::new(FixedHitsIndex {
        hits: vec![hit("above", 0.70001), hit("at", 0.7)],
        fail: false,
    });
    let engine = QueryEngine::new(
        &backends(model.clone(), index, store, lru_cache()),
        "scrape-jobs",
    );

    engine.chat("threshold question").await.unwrap();
    let prompt = model.last_prompt();
    assert!(prompt.contains("Title: Above Threshold\nContent: included body"));
    assert!(!prompt.contains("At Threshold"));
}

#[tokio::test]
async fn test_below_threshold_and_missing_documents_fall_back_to_general_prompt() {
    let model = Arc::new(ScriptedModel::default());
    let index = Arc::new(FixedHitsIndex {
        hits: vec![hit("ghost", 0.95), hit("weak", 0.2)],
        fail: false,
    });
    let engine = QueryEngine::new(
        &backends(
            model.clone(),
            index,
            Arc::new(InMemoryDocumentStore::new()),
            lru_cache(),
        ),
        "scrape-jobs",
    );

    engine.chat("anything").await.unwrap();
    assert!(model.last_prompt().starts_with("User Question: anything"));
}

// ============ Fatal stages ============

#[tokio::test]
async fn test_fatal_stages_map_to_chat_errors() {
    let store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());

    let engine = QueryEngine::new(
        &backends(
            Arc::new(ScriptedModel {
                fail_embed: true,
                ..Default::default()
            }),
            Arc::new(InMemoryVectorIndex::new()),
            store.clone(),
            lru_cache(),
        ),
        "scrape-jobs",
    );
    assert!(matches!(engine.chat("q").await, Err(ChatError::Embedding(_))));

    let engine = QueryEngine::new(
        &backends(
            Arc::new(ScriptedModel::default()),
            Arc::new(FixedHitsIndex {
                hits: vec![],
                fail: true,
            }),
            store.clone(),
            lru_cache(),
        ),
        "scrape-jobs",
    );
    assert!(matches!(engine.chat("q").await, Err(ChatError::Retrieval(_))));

    let engine = QueryEngine::new(
        &backends(
            Arc::new(ScriptedModel {
                fail_complete: true,
                ..Default::default()
            }),
            Arc::new(InMemoryVectorIndex::new()),
            store,
            lru_cache(),
        ),
        "scrape-jobs",
    );
    assert!(matches!(
        engine.chat_with_history("s1", "q").await,
        Err(ChatError::Completion(_))
    ));
}

// ============ Cache failures are misses ============

#[tokio::test]
async fn test_chat_survives_cache_backend_failure() {
    let store = Arc::new(InMemoryDocumentStore::new());
    store
        .upsert(&Document::new("d1", "Selectors", "Match elements by class.", "CSS"))
        .await
        .unwrap();
    let model = Arc::new(ScriptedModel::default());
    let index = Arc::new(FixedHitsIndex {
        hits: vec![hit("d1", 0.9)],
        fail: false,
    });
    let engine = QueryEngine::new(
        &backends(
            model.clone(),
            index,
            store,
            cache_over(Arc::new(DownCache), 5 * 1024 * 1024),
        ),
        "scrape-jobs",
    );

    let answer = engine.chat("how do selectors work").await.unwrap();
    assert_eq!(answer, "# Generated Tutorial");
    assert!(model.last_prompt().contains("Title: Selectors"));

    let answer = engine
        .chat_with_history("s1", "and pseudo-classes?")
        .await
        .unwrap();
    assert_eq!(answer, "# Generated Tutorial");
    assert!(engine.cache_health().await.is_err());
}

#[tokio::test]
async fn test_oversized_values_skip_caching_but_succeed() {
    let store = Arc::new(InMemoryDocumentStore::new());
    let engine = QueryEngine::new(
        &backends(
            Arc::new(ScriptedModel::default()),
            Arc::new(InMemoryVectorIndex::new()),
            store.clone(),
            cache_over(Arc::new(LruCacheBackend::new(1024 * 1024)), 64),
        ),
        "scrape-jobs",
    );

    let doc = engine
        .add_document(Document::new(
            "big",
            "Big",
            "a body long enough that its serialized form exceeds sixty-four bytes",
            "Misc",
        ))
        .await
        .unwrap();
    assert_eq!(store.get_by_id(&doc.id).await.unwrap(), Some(doc));
}

// ============ Sessions ============

#[tokio::test]
async fn test_history_returns_last_ten_in_order() {
    let engine = QueryEngine::new(
        &backends(
            Arc::new(ScriptedModel::default()),
            Arc::new(InMemoryVectorIndex::new()),
            Arc::new(InMemoryDocumentStore::new()),
            lru_cache(),
        ),
        "scrape-jobs",
    );

    for i in 1..=15 {
        engine
            .add_chat_message("s1", Role::User, &format!("message {}", i))
            .await
            .unwrap();
    }
    let history = engine.get_chat_history("s1", 10).await.unwrap();
    let contents: Vec<String> = history.into_iter().map(|m| m.content).collect();
    let expected: Vec<String> = (6..=15).map(|i| format!("message {}", i)).collect();
    assert_eq!(contents, expected);
}

#[tokio::test]
async fn test_concurrent_appends_keep_every_message() {
    let engine = Arc::new(QueryEngine::new(
        &backends(
            Arc::new(ScriptedModel::default()),
            Arc::new(InMemoryVectorIndex::new()),
            Arc::new(InMemoryDocumentStore::new()),
            lru_cache(),
        ),
        "scrape-jobs",
    ));

    let mut handles = Vec::new();
    for i in 0..25 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine
                .add_chat_message("shared", Role::User, &format!("m{}", i))
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(engine.get_chat_history("shared", 100).await.unwrap().len(), 25);
}

// ============ Learning write-back ============

#[tokio::test]
async fn test_answers_are_written_back_for_learning() {
    let store = Arc::new(InMemoryDocumentStore::new());
    let vectors = Arc::new(InMemoryVectorIndex::new());
    let engine = QueryEngine::new(
        &backends(
            Arc::new(ScriptedModel::default()),
            vectors.clone(),
            store.clone(),
            lru_cache(),
        ),
        "scrape-jobs",
    );

    let answer = engine.chat("what is a closure").await.unwrap();
    assert!(engine.learning().flush(Duration::from_secs(2)).await);
    assert_eq!(engine.learning().completed(), 1);

    let docs = store.all().await;
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].category, AI_RESPONSE_CATEGORY);
    assert_eq!(docs[0].content, answer);
    assert_eq!(docs[0].metadata["user_query"], "what is a closure");

    let metadata = vectors.metadata().await;
    assert_eq!(metadata.len(), 1);
    assert_eq!(metadata[0]["document_id"], docs[0].id.as_str());
    assert_eq!(metadata[0]["learning_data"], true);

    // The learned answer grounds the next matching question.
    engine.chat("what is a closure again").await.unwrap();
}

// ============ Store upsert semantics ============

#[tokio::test]
async fn test_upsert_preserves_created_at() {
    let tmp = TempDir::new().unwrap();
    let pool = db::open(&DbConfig {
        path: tmp.path().join("docsai.sqlite"),
    })
    .await
    .unwrap();
    let store = SqliteDocumentStore::new(pool);

    store
        .upsert(&Document::new("d1", "Original", "body", "HTML"))
        .await
        .unwrap();
    let first = store.get_by_id("d1").await.unwrap().unwrap();

    tokio::time::sleep(Duration::from_millis(10)).await;
    store
        .upsert(&Document::new("d1", "Renamed", "body", "HTML"))
        .await
        .unwrap();
    let second = store.get_by_id("d1").await.unwrap().unwrap();

    assert_eq!(second.title, "Renamed");
    assert_eq!(second.created_at, first.created_at);
    assert!(second.updated_at > first.updated_at);
}
