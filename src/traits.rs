//! Collaborator traits consumed by the query engine and ingestion pipeline.
//!
//! Every external system the core talks to sits behind one of these traits,
//! so that backends are chosen once at process start and passed in as
//! explicit dependencies.
//!
//! ```text
//! ┌─────────────────┐  ┌─────────────┐  ┌───────────────┐  ┌──────────┐
//! │  LanguageModel  │  │ VectorIndex │  │ DocumentStore │  │ JobQueue │
//! │ embed/complete  │  │ upsert/query│  │ upsert/get/   │  │ publish/ │
//! │                 │  │             │  │ search_text   │  │ consume  │
//! └────────┬────────┘  └──────┬──────┘  └───────┬───────┘  └────┬─────┘
//!          └───────────┬──────┴─────────────────┴───────────────┘
//!                      ▼
//!          QueryEngine / IngestionPipeline
//! ```
//!
//! Implementations must be `Send + Sync`: a single handle is shared by every
//! request and worker, and synchronizes internally.

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Document, SearchResult, VectorMetadata};

// ═══════════════════════════════════════════════════════════════════════
// Language model
// ═══════════════════════════════════════════════════════════════════════

/// Embedding and completion service.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Turn `text` into a fixed-length vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Turn `prompt` into free text.
    async fn complete(&self, prompt: &str) -> Result<String>;
}

// ═══════════════════════════════════════════════════════════════════════
// Vector index
// ═══════════════════════════════════════════════════════════════════════

/// Similarity index over `(vector, metadata)` pairs.
///
/// Records are write-once; there is no update or delete path.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Store a vector with its metadata.
    async fn upsert(&self, vector: &[f32], metadata: VectorMetadata) -> Result<()>;

    /// Return up to `limit` nearest records, closest first.
    async fn query(&self, vector: &[f32], limit: usize) -> Result<Vec<SearchResult>>;
}

// ═══════════════════════════════════════════════════════════════════════
// Document store
// ═══════════════════════════════════════════════════════════════════════

/// Durable storage for full [`Document`] records.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert or replace by id. An existing record keeps its `created_at`.
    async fn upsert(&self, doc: &Document) -> Result<()>;

    /// Fetch a document by id; `Ok(None)` when absent.
    async fn get_by_id(&self, id: &str) -> Result<Option<Document>>;

    /// Case-insensitive substring search, newest first.
    async fn search_text(&self, query: &str, limit: usize) -> Result<Vec<Document>>;
}

// ═══════════════════════════════════════════════════════════════════════
// Job queue
// ═══════════════════════════════════════════════════════════════════════

/// At-least-once message transport for scrape jobs.
///
/// Duplicate delivery is possible; consumers must tolerate it. No ordering
/// is assumed.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Append a message to `topic`.
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<()>;

    /// Wait for and return the next message of the queue's topic.
    async fn consume(&self) -> Result<Vec<u8>>;
}
