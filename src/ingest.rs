//! Ingestion pipeline: scrape jobs from the queue into the knowledge base.
//!
//! ```text
//! JobQueue ──consume──► reader ──submit (blocks when full)──► WorkerPool
//!                         │                                      │
//!                  backoff on errors                     JobProcessor::process
//!                                                          dedup → scrape → embed
//!                                                          → DocumentStore → VectorIndex
//! ```
//!
//! Per job: `Dequeued → Deduplication-Checked → Extracted → Embedded →
//! Persisted`. Any failing stage drops the job with an error log; jobs are
//! never retried or re-queued here.
//!
//! Deduplication is a text search of the store for the job's URL. Every
//! ingested document carries the URL verbatim in its `source_url`
//! metadata, so a second delivery of the same job finds the first. Within
//! one process, deliveries of the same URL hold a per-URL lock from the
//! check until the vector is indexed.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::backends::Backends;
use crate::config::IngestConfig;
use crate::extract::{self, dedup_tags, PageFetcher};
use crate::locks::KeyedLocks;
use crate::models::{ScrapeJob, VectorRecord};
use crate::pool::WorkerPool;
use crate::traits::{DocumentStore, JobQueue, LanguageModel, VectorIndex};

/// Capped exponential delay between consecutive queue read failures.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    next: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            next: initial,
        }
    }

    /// Delay to wait now; doubles the following one up to the cap.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = (self.next * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.next = self.initial;
    }
}

/// What happened to one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Ingested { document_id: String },
    /// Content for the URL already exists; nothing was fetched.
    Duplicate,
}

/// Runs a single scrape job end to end.
pub struct JobProcessor {
    model: Arc<dyn LanguageModel>,
    vectors: Arc<dyn VectorIndex>,
    store: Arc<dyn DocumentStore>,
    fetcher: Arc<dyn PageFetcher>,
    url_locks: KeyedLocks,
}

impl JobProcessor {
    pub fn new(backends: &Backends) -> Self {
        Self {
            model: backends.model.clone(),
            vectors: backends.vectors.clone(),
            store: backends.store.clone(),
            fetcher: backends.fetcher.clone(),
            url_locks: KeyedLocks::default(),
        }
    }

    /// Deliveries of one URL are processed one at a time, so a concurrent
    /// duplicate sees the first one's document.
    pub async fn process(&self, job: &ScrapeJob) -> Result<JobOutcome> {
        let _guard = self.url_locks.lock(&job.url).await;

        match self.store.search_text(&job.url, 1).await {
            Ok(existing) if !existing.is_empty() => return Ok(JobOutcome::Duplicate),
            Ok(_) => {}
            Err(e) => warn!(
                job_id = %job.job_id,
                url = %job.url,
                error = %format!("{:#}", e),
                "Duplicate check failed; scraping anyway"
            ),
        }

        let (extractor, mut doc) = extract::scrape(self.fetcher.as_ref(), &job.url).await?;

        if !job.category.is_empty() {
            doc.category = job.category.clone();
        }
        if !job.tags.is_empty() {
            let mut tags = std::mem::take(&mut doc.tags);
            tags.extend(job.tags.iter().cloned());
            doc.tags = dedup_tags(tags);
        }
        doc.metadata
            .insert("source_url".to_string(), job.url.clone());

        let embedding = self
            .model
            .embed(&doc.content)
            .await
            .context("Failed to embed document")?;

        self.store
            .upsert(&doc)
            .await
            .with_context(|| format!("Failed to store document {}", doc.id))?;

        let record = VectorRecord::for_document(embedding, &doc, extractor.source_tag());
        self.vectors
            .upsert(&record.vector, record.metadata)
            .await
            .with_context(|| format!("Failed to index document {}", doc.id))?;

        Ok(JobOutcome::Ingested {
            document_id: doc.id,
        })
    }

    /// [`JobProcessor::process`] with the outcome logged.
    pub async fn run(&self, job: ScrapeJob) {
        match self.process(&job).await {
            Ok(JobOutcome::Ingested { document_id }) => info!(
                job_id = %job.job_id,
                url = %job.url,
                document_id = %document_id,
                "Ingested page"
            ),
            Ok(JobOutcome::Duplicate) => info!(
                job_id = %job.job_id,
                url = %job.url,
                "Content already exists; skipping"
            ),
            Err(e) => error!(
                job_id = %job.job_id,
                url = %job.url,
                error = %format!("{:#}", e),
                "Scrape job failed"
            ),
        }
    }
}

/// Single queue reader feeding a bounded worker pool.
pub struct IngestionPipeline {
    queue: Arc<dyn JobQueue>,
    processor: Arc<JobProcessor>,
    pool: WorkerPool,
    cancel: CancellationToken,
    backoff: Backoff,
}

impl IngestionPipeline {
    /// Must be called inside a Tokio runtime (spawns the workers).
    pub fn new(backends: &Backends, config: &IngestConfig) -> Self {
        let cancel = CancellationToken::new();
        Self {
            queue: backends.queue.clone(),
            processor: Arc::new(JobProcessor::new(backends)),
            pool: WorkerPool::with_token(config.workers, config.queue_capacity(), cancel.clone()),
            cancel,
            backoff: Backoff::new(
                Duration::from_millis(config.backoff_initial_ms),
                Duration::from_millis(config.backoff_max_ms),
            ),
        }
    }

    /// Cancelling this token stops the reader and the workers.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Consume and dispatch jobs until cancelled.
    pub async fn run(&self) {
        let mut backoff = self.backoff.clone();
        info!(workers = self.pool.worker_count(), "Ingestion pipeline started");

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                next = self.queue.consume() => next,
            };

            let payload = match next {
                Ok(payload) => {
                    backoff.reset();
                    payload
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    warn!(error = %format!("{:#}", e), ?delay, "Failed to read from job queue");
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = tokio::time::sleep(delay) => continue,
                    }
                }
            };

            let job: ScrapeJob = match serde_json::from_slice(&payload) {
                Ok(job) => job,
                Err(e) => {
                    warn!(error = %e, "Discarding malformed scrape job");
                    continue;
                }
            };

            let processor = self.processor.clone();
            if self
                .pool
                .submit(async move { processor.run(job).await })
                .await
                .is_err()
            {
                break;
            }
        }

        info!("Ingestion pipeline stopped");
    }

    /// Stop reading and shut the pool down. Jobs still queued in the pool
    /// are discarded; returns how many.
    pub async fn shutdown(self) -> usize {
        self.cancel.cancel();
        self.pool.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::test_support::cache;
    use crate::extract::test_support::StaticFetcher;
    use crate::queue::InMemoryJobQueue;
    use crate::store::InMemoryDocumentStore;
    use crate::vector::InMemoryVectorIndex;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const PAGE: &str = "<html><head><title>Widgets</title></head><body><main>\
        <h1>Widgets</h1><p>Widgets are small reusable parts of a page.</p>\
        </main></body></html>";

    struct UnitModel;

    #[async_trait]
    impl LanguageModel for UnitModel {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![0.0, 1.0])
        }
        async fn complete(&self, _prompt: &str) -> Result<String> {
            Ok(String::new())
        }
    }

    struct Fixture {
        backends: Backends,
        store: Arc<InMemoryDocumentStore>,
        vectors: Arc<InMemoryVectorIndex>,
        fetcher: Arc<StaticFetcher>,
    }

    fn fixture_with_queue(queue: Arc<dyn JobQueue>) -> Fixture {
        fixture_with(queue, StaticFetcher::new(PAGE))
    }

    fn fixture_with(queue: Arc<dyn JobQueue>, fetcher: StaticFetcher) -> Fixture {
        let store = Arc::new(InMemoryDocumentStore::new());
        let vectors = Arc::new(InMemoryVectorIndex::new());
        let fetcher = Arc::new(fetcher);
        let backends = Backends::new(
            Arc::new(UnitModel),
            vectors.clone(),
            store.clone(),
            queue,
            cache(),
            fetcher.clone(),
        );
        Fixture {
            backends,
            store,
            vectors,
            fetcher,
        }
    }

    fn fixture() -> Fixture {
        fixture_with_queue(Arc::new(InMemoryJobQueue::new("scrape-jobs")))
    }

    #[test]
    fn test_backoff_doubles_caps_and_resets() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(350));
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
        assert_eq!(backoff.next_delay(), Duration::from_millis(200));
        assert_eq!(backoff.next_delay(), Duration::from_millis(350));
        assert_eq!(backoff.next_delay(), Duration::from_millis(350));
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_process_applies_job_overrides() {
        let f = fixture();
        let processor = JobProcessor::new(&f.backends);
        let job = ScrapeJob::new("https://example.com/widgets", "HTML", vec!["ui".into()]);

        let document_id = match processor.process(&job).await.unwrap() {
            JobOutcome::Ingested { document_id } => document_id,
            other => panic!("expected ingestion, got {:?}", other),
        };

        let docs = f.store.all().await;
        assert_eq!(docs.len(), 1);
        let doc = &docs[0];
        assert_eq!(doc.id, document_id);
        assert_eq!(doc.category, "HTML");
        assert!(doc.tags.contains(&"ui".to_string()));
        assert_eq!(doc.metadata["source_url"], "https://example.com/widgets");

        let metadata = f.vectors.metadata().await;
        assert_eq!(metadata.len(), 1);
        assert_eq!(metadata[0]["document_id"], document_id.as_str());
        assert_eq!(metadata[0]["source"], "universal");
    }

    #[tokio::test]
    async fn test_duplicate_job_is_skipped_before_fetch() {
        let f = fixture();
        let processor = JobProcessor::new(&f.backends);
        let job = ScrapeJob::new("https://example.com/widgets", "", vec![]);

        assert!(matches!(
            processor.process(&job).await.unwrap(),
            JobOutcome::Ingested { .. }
        ));
        assert_eq!(processor.process(&job).await.unwrap(), JobOutcome::Duplicate);
        assert_eq!(f.fetcher.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(f.store.len().await, 1);
        assert_eq!(f.vectors.len().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_deliveries_of_one_url_ingest_once() {
        let f = fixture_with(
            Arc::new(InMemoryJobQueue::new("scrape-jobs")),
            StaticFetcher::slow(PAGE, Duration::from_millis(50)),
        );
        let processor = Arc::new(JobProcessor::new(&f.backends));
        let job = ScrapeJob::new("https://example.com/widgets", "", vec![]);

        let (a, b) = tokio::join!(processor.process(&job), processor.process(&job));
        let mut outcomes = vec![a.unwrap(), b.unwrap()];
        outcomes.sort_by_key(|o| matches!(o, JobOutcome::Duplicate));
        assert!(matches!(outcomes[0], JobOutcome::Ingested { .. }));
        assert_eq!(outcomes[1], JobOutcome::Duplicate);

        assert_eq!(f.fetcher.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(f.store.len().await, 1);
        assert_eq!(f.vectors.len().await, 1);
    }

    #[tokio::test]
    async fn test_failed_fetch_stores_nothing() {
        let f = fixture();
        let processor = JobProcessor::new(&f.backends);
        let job = ScrapeJob::new("not a url", "", vec![]);
        assert!(processor.process(&job).await.is_err());
        assert!(f.store.is_empty().await);
        assert!(f.vectors.is_empty().await);
    }

    /// Fails the first `failures` reads, then serves one job, then idles.
    struct FlakyQueue {
        failures: usize,
        reads: AtomicUsize,
        payload: Vec<u8>,
    }

    #[async_trait]
    impl JobQueue for FlakyQueue {
        async fn publish(&self, _topic: &str, _payload: &[u8]) -> Result<()> {
            Ok(())
        }

        async fn consume(&self) -> Result<Vec<u8>> {
            let n = self.reads.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                anyhow::bail!("broker unavailable");
            }
            if n == self.failures {
                return Ok(self.payload.clone());
            }
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_reader_recovers_after_queue_errors() {
        let job = ScrapeJob::new("https://example.com/widgets", "", vec![]);
        let queue = Arc::new(FlakyQueue {
            failures: 3,
            reads: AtomicUsize::new(0),
            payload: serde_json::to_vec(&job).unwrap(),
        });
        let f = fixture_with_queue(queue.clone());
        let config = IngestConfig {
            workers: 1,
            backoff_initial_ms: 1,
            backoff_max_ms: 4,
            ..IngestConfig::default()
        };
        let pipeline = Arc::new(IngestionPipeline::new(&f.backends, &config));
        let reader = {
            let pipeline = pipeline.clone();
            tokio::spawn(async move { pipeline.run().await })
        };

        for _ in 0..200 {
            if pipeline.pool().completed() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(pipeline.pool().completed(), 1);
        assert_eq!(f.store.len().await, 1);
        assert!(queue.reads.load(Ordering::SeqCst) >= 4);

        pipeline.cancellation_token().cancel();
        reader.await.unwrap();
    }

    #[tokio::test]
    async fn test_run_skips_malformed_payloads() {
        let queue = Arc::new(InMemoryJobQueue::new("scrape-jobs"));
        queue.publish("scrape-jobs", b"not json").await.unwrap();
        let job = ScrapeJob::new("https://example.com/widgets", "", vec![]);
        queue
            .publish("scrape-jobs", &serde_json::to_vec(&job).unwrap())
            .await
            .unwrap();

        let f = fixture_with_queue(queue.clone());
        let pipeline = Arc::new(IngestionPipeline::new(&f.backends, &IngestConfig::default()));
        let reader = {
            let pipeline = pipeline.clone();
            tokio::spawn(async move { pipeline.run().await })
        };

        for _ in 0..200 {
            if pipeline.pool().completed() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(f.store.len().await, 1);

        pipeline.cancellation_token().cancel();
        reader.await.unwrap();
    }
}
