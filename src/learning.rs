//! Learning write-back: generated answers become new knowledge.
//!
//! ```text
//!  submit() ──► unbounded channel ──► dispatcher ──► spawn(persist) ─┬─► ok
//!                                                                   └─► error channel ──► warn!
//! ```
//!
//! [`LearningWriter::submit`] never blocks and never fails the caller. Each
//! answer is embedded, stored as an `AI_Response` [`Document`], cached, and
//! indexed with `learning_data: true` in its vector metadata. Failures are
//! funnelled into one error channel and logged there.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::cache::TieredCache;
use crate::models::{Document, VectorRecord, AI_RESPONSE_CATEGORY};
use crate::prompt::truncate;
use crate::traits::{DocumentStore, LanguageModel, VectorIndex};

/// Vector metadata `source` for learned answers.
pub const LEARNING_SOURCE: &str = "ai-response";
const LEARNING_AUTHOR: &str = "AI_Assistant";
const TITLE_QUERY_CHARS: usize = 50;

/// One answer waiting to be persisted.
#[derive(Debug, Clone)]
pub struct LearningTask {
    pub user_query: String,
    pub response: String,
    /// Whether the answer was grounded on retrieved documents.
    pub grounded: bool,
}

struct Sinks {
    model: Arc<dyn LanguageModel>,
    vectors: Arc<dyn VectorIndex>,
    store: Arc<dyn DocumentStore>,
    cache: TieredCache,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
}

/// Background executor for learning write-backs.
///
/// Must be created inside a Tokio runtime. Dropping the writer stops intake;
/// tasks already dispatched still run to completion.
pub struct LearningWriter {
    tx: mpsc::UnboundedSender<LearningTask>,
    counters: Arc<Counters>,
}

impl LearningWriter {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        vectors: Arc<dyn VectorIndex>,
        store: Arc<dyn DocumentStore>,
        cache: TieredCache,
    ) -> Self {
        let sinks = Arc::new(Sinks {
            model,
            vectors,
            store,
            cache,
        });
        let counters = Arc::new(Counters::default());
        let (tx, rx) = mpsc::unbounded_channel();
        let (err_tx, err_rx) = mpsc::unbounded_channel();

        tokio::spawn(dispatch(rx, err_tx, sinks, counters.clone()));
        tokio::spawn(drain_errors(err_rx, counters.clone()));

        Self { tx, counters }
    }

    /// Queue an answer for persistence and return immediately.
    pub fn submit(&self, task: LearningTask) {
        self.counters.submitted.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(task).is_err() {
            self.counters.failed.fetch_add(1, Ordering::SeqCst);
            warn!("Learning writer is closed; dropping answer");
        }
    }

    pub fn submitted(&self) -> usize {
        self.counters.submitted.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.counters.completed.load(Ordering::SeqCst)
    }

    pub fn failed(&self) -> usize {
        self.counters.failed.load(Ordering::SeqCst)
    }

    /// Tasks submitted but not yet finished either way.
    pub fn in_flight(&self) -> usize {
        self.submitted()
            .saturating_sub(self.completed() + self.failed())
    }

    /// Wait until nothing is in flight or `timeout` passes. Returns whether
    /// the writer went idle.
    pub async fn flush(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.in_flight() > 0 {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        true
    }
}

async fn dispatch(
    mut rx: mpsc::UnboundedReceiver<LearningTask>,
    err_tx: mpsc::UnboundedSender<anyhow::Error>,
    sinks: Arc<Sinks>,
    counters: Arc<Counters>,
) {
    while let Some(task) = rx.recv().await {
        let sinks = sinks.clone();
        let err_tx = err_tx.clone();
        let counters = counters.clone();
        tokio::spawn(async move {
            match persist(&sinks, task).await {
                Ok(id) => {
                    counters.completed.fetch_add(1, Ordering::SeqCst);
                    debug!(document_id = %id, "Stored answer for learning");
                }
                Err(e) => {
                    // The drain task owns the failure count; fall back to
                    // counting here only if it is gone.
                    if let Err(mpsc::error::SendError(e)) = err_tx.send(e) {
                        counters.failed.fetch_add(1, Ordering::SeqCst);
                        warn!(error = %format!("{:#}", e), "Learning write-back failed");
                    }
                }
            }
        });
    }
}

async fn drain_errors(mut err_rx: mpsc::UnboundedReceiver<anyhow::Error>, counters: Arc<Counters>) {
    while let Some(e) = err_rx.recv().await {
        counters.failed.fetch_add(1, Ordering::SeqCst);
        warn!(error = %format!("{:#}", e), "Learning write-back failed");
    }
}

/// Build the document a learned answer is stored as.
pub fn answer_document(task: &LearningTask) -> Document {
    let mut doc = Document::new(
        format!("response_{}", uuid::Uuid::new_v4().simple()),
        format!(
            "AI Response: {}",
            truncate(&task.user_query, TITLE_QUERY_CHARS)
        ),
        task.response.clone(),
        AI_RESPONSE_CATEGORY,
    );
    doc.tags = vec![
        "ai-response".to_string(),
        "user-generated".to_string(),
        "learning".to_string(),
    ];
    doc.author = LEARNING_AUTHOR.to_string();
    doc.metadata
        .insert("user_query".into(), task.user_query.clone());
    doc.metadata
        .insert("was_based_on_scraped".into(), task.grounded.to_string());
    doc.metadata
        .insert("response_type".into(), "tutorial".into());
    doc
}

async fn persist(sinks: &Sinks, task: LearningTask) -> Result<String> {
    let embedding = sinks
        .model
        .embed(&task.response)
        .await
        .context("Failed to embed answer")?;

    let doc = answer_document(&task);
    sinks
        .store
        .upsert(&doc)
        .await
        .with_context(|| format!("Failed to store answer document {}", doc.id))?;

    if let Err(e) = sinks.cache.document().set(&doc).await {
        debug!(document_id = %doc.id, error = %e, "Failed to cache answer document");
    }

    let record = VectorRecord::for_document(embedding, &doc, LEARNING_SOURCE)
        .with("user_query", task.user_query.as_str())
        .with("response_type", "tutorial")
        .with("learning_data", true);
    sinks
        .vectors
        .upsert(&record.vector, record.metadata)
        .await
        .with_context(|| format!("Failed to index answer document {}", doc.id))?;

    Ok(doc.id)
}
