//! Query engine: turns a user message into a grounded answer.
//!
//! # Chat turn
//!
//! ```text
//! message
//!   │
//!   ├─ 1. embedding   EmbeddingCache ──miss──► LanguageModel::embed ──► cache (best effort)
//!   ├─ 2. retrieval   VectorIndex::query(top 5)                         fatal on error
//!   ├─ 3. context     score > 0.7 → DocumentCache ──miss──► DocumentStore
//!   ├─ 4. prompt      grounded tutorial template │ general template
//!   ├─ 5. completion  LanguageModel::complete                           fatal on error
//!   └─ 6. learning    LearningWriter::submit (detached)
//! ```
//!
//! Cache failures never fail a request: every cache error is logged and
//! treated as a miss. Only the three stages named by [`ChatError`] are fatal.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::backends::Backends;
use crate::cache::TieredCache;
use crate::learning::{LearningTask, LearningWriter};
use crate::models::{ChatMessage, ChatSession, Document, Role, ScrapeJob, VectorRecord};
use crate::prompt;
use crate::traits::{DocumentStore, JobQueue, LanguageModel, VectorIndex};

/// Similarity a search hit must strictly exceed to ground an answer.
pub const RELEVANCE_THRESHOLD: f32 = 0.7;
/// Nearest neighbours retrieved per chat turn.
pub const RETRIEVAL_LIMIT: usize = 5;
/// Prior messages included in a follow-up prompt.
pub const HISTORY_LIMIT: usize = 10;
/// Messages examined by [`QueryEngine::conversation_insights`].
pub const INSIGHTS_HISTORY_LIMIT: usize = 50;

/// Vector metadata `source` for documents added directly by users.
pub const USER_SOURCE: &str = "user";

/// Fatal failures of a chat turn.
///
/// Callers surface every variant as one generic failure; the variant and
/// its cause are for logs.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("failed to embed query: {0:#}")]
    Embedding(anyhow::Error),

    #[error("failed to search vectors: {0:#}")]
    Retrieval(anyhow::Error),

    #[error("failed to generate response: {0:#}")]
    Completion(anyhow::Error),
}

/// Summary of a session's recent messages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationInsights {
    pub total_messages: usize,
    /// Repeated words (longer than 3 chars) from user messages, most
    /// frequent first, at most 5.
    pub topics: Vec<String>,
    pub user_questions: Vec<String>,
    pub ai_responses: Vec<String>,
}

pub struct QueryEngine {
    model: Arc<dyn LanguageModel>,
    vectors: Arc<dyn VectorIndex>,
    store: Arc<dyn DocumentStore>,
    queue: Arc<dyn JobQueue>,
    cache: TieredCache,
    topic: String,
    learning: LearningWriter,
}

impl QueryEngine {
    /// Build an engine over `backends`, publishing scrape jobs to `topic`.
    ///
    /// Must be called inside a Tokio runtime (starts the learning writer).
    pub fn new(backends: &Backends, topic: impl Into<String>) -> Self {
        let learning = LearningWriter::new(
            backends.model.clone(),
            backends.vectors.clone(),
            backends.store.clone(),
            backends.cache.clone(),
        );
        Self {
            model: backends.model.clone(),
            vectors: backends.vectors.clone(),
            store: backends.store.clone(),
            queue: backends.queue.clone(),
            cache: backends.cache.clone(),
            topic: topic.into(),
            learning,
        }
    }

    pub fn learning(&self) -> &LearningWriter {
        &self.learning
    }

    // ─── Chat ──────────────────────────────────────────────────────────

    /// Answer a single message.
    pub async fn chat(&self, message: &str) -> Result<String, ChatError> {
        let context = self.retrieve_context(message).await?;
        let grounded = !context.is_empty();
        let prompt = prompt::chat(&context, message);

        let response = self
            .model
            .complete(&prompt)
            .await
            .map_err(ChatError::Completion)?;

        info!(grounded, context_docs = context.len(), "Answered chat message");
        self.remember(message, &response, grounded);
        Ok(response)
    }

    /// Answer a message in the context of a session's recent history, then
    /// append both sides of the exchange to the session.
    pub async fn chat_with_history(
        &self,
        session_id: &str,
        message: &str,
    ) -> Result<String, ChatError> {
        let history = self.recent_history(session_id).await;
        let context = self.retrieve_context(message).await?;
        let grounded = !context.is_empty();
        let prompt = prompt::follow_up(&history, &context, message);

        let response = self
            .model
            .complete(&prompt)
            .await
            .map_err(ChatError::Completion)?;

        for (role, content) in [(Role::User, message), (Role::Assistant, response.as_str())] {
            if let Err(e) = self.add_chat_message(session_id, role, content).await {
                warn!(session_id, role = %role, error = %format!("{:#}", e), "Failed to record chat message");
            }
        }

        info!(
            session_id,
            grounded,
            history = history.len(),
            context_docs = context.len(),
            "Answered chat message with history"
        );
        self.remember(message, &response, grounded);
        Ok(response)
    }

    /// Steps 1–3: embed, retrieve, and resolve hits above the threshold to
    /// context blocks.
    async fn retrieve_context(&self, message: &str) -> Result<Vec<String>, ChatError> {
        let embedding = self
            .embed_cached(message)
            .await
            .map_err(ChatError::Embedding)?;

        let hits = self
            .vectors
            .query(&embedding, RETRIEVAL_LIMIT)
            .await
            .map_err(ChatError::Retrieval)?;

        let mut context = Vec::new();
        for hit in hits.iter().filter(|h| h.score > RELEVANCE_THRESHOLD) {
            let Some(document_id) = hit.document_id() else {
                continue;
            };
            if let Some(doc) = self.resolve_document(document_id).await {
                context.push(doc.context_block());
            }
        }
        debug!(hits = hits.len(), relevant = context.len(), "Retrieved context");
        Ok(context)
    }

    /// Embedding through the cache-aside path.
    async fn embed_cached(&self, text: &str) -> Result<Vec<f32>> {
        let cache = self.cache.embedding();
        match cache.get(text).await {
            Ok(Some(embedding)) => return Ok(embedding),
            Ok(None) => {}
            Err(e) => debug!(error = %e, "Embedding cache unavailable; treating as miss"),
        }

        let embedding = self.model.embed(text).await?;
        if let Err(e) = cache.set(text, &embedding).await {
            debug!(error = %e, "Failed to cache embedding");
        }
        Ok(embedding)
    }

    /// Document through the cache-aside path. Unresolvable ids are `None`.
    async fn resolve_document(&self, id: &str) -> Option<Document> {
        let cache = self.cache.document();
        match cache.get(id).await {
            Ok(Some(doc)) => return Some(doc),
            Ok(None) => {}
            Err(e) => debug!(document_id = id, error = %e, "Document cache unavailable; treating as miss"),
        }

        match self.store.get_by_id(id).await {
            Ok(Some(doc)) => {
                if let Err(e) = cache.set(&doc).await {
                    debug!(document_id = id, error = %e, "Failed to cache document");
                }
                Some(doc)
            }
            Ok(None) => {
                debug!(document_id = id, "Vector points at a missing document");
                None
            }
            Err(e) => {
                warn!(document_id = id, error = %format!("{:#}", e), "Failed to load document");
                None
            }
        }
    }

    async fn recent_history(&self, session_id: &str) -> Vec<ChatMessage> {
        if let Err(e) = self.get_chat_session(session_id).await {
            debug!(session_id, error = %format!("{:#}", e), "Failed to load chat session");
        }
        match self.get_chat_history(session_id, HISTORY_LIMIT).await {
            Ok(history) => history,
            Err(e) => {
                debug!(session_id, error = %format!("{:#}", e), "Chat history unavailable");
                Vec::new()
            }
        }
    }

    fn remember(&self, user_query: &str, response: &str, grounded: bool) {
        self.learning.submit(LearningTask {
            user_query: user_query.to_string(),
            response: response.to_string(),
            grounded,
        });
    }

    // ─── Documents ─────────────────────────────────────────────────────

    /// Store and index a user-supplied document. Returns it as stored,
    /// with an id assigned when it had none.
    pub async fn add_document(&self, mut doc: Document) -> Result<Document> {
        if doc.id.is_empty() {
            doc.id = format!("doc_{}", uuid::Uuid::new_v4().simple());
        }

        let embedding = self
            .embed_cached(&doc.content)
            .await
            .context("Failed to embed document")?;

        self.store
            .upsert(&doc)
            .await
            .with_context(|| format!("Failed to store document {}", doc.id))?;

        if let Err(e) = self.cache.document().set(&doc).await {
            debug!(document_id = %doc.id, error = %e, "Failed to cache document");
        }

        let record = VectorRecord::for_document(embedding, &doc, USER_SOURCE);
        self.vectors
            .upsert(&record.vector, record.metadata)
            .await
            .with_context(|| format!("Failed to index document {}", doc.id))?;

        if let Err(e) = self.cache.search().delete(&doc.category).await {
            debug!(category = %doc.category, error = %e, "Failed to invalidate search cache");
        }

        info!(document_id = %doc.id, category = %doc.category, "Added document");
        Ok(doc)
    }

    /// Free-text document search through the search cache.
    pub async fn search_documents(&self, query: &str, limit: usize) -> Result<Vec<Document>> {
        let cache = self.cache.search();
        match cache.get(query, limit).await {
            Ok(Some(docs)) => return Ok(docs),
            Ok(None) => {}
            Err(e) => debug!(error = %e, "Search cache unavailable; treating as miss"),
        }

        let docs = self
            .store
            .search_text(query, limit)
            .await
            .context("Failed to search documents")?;

        if let Err(e) = cache.set(query, limit, &docs).await {
            debug!(error = %e, "Failed to cache search results");
        }
        Ok(docs)
    }

    /// Queue `url` for ingestion. Returns the job id.
    pub async fn scrape_document(
        &self,
        url: &str,
        category: &str,
        tags: Vec<String>,
    ) -> Result<String> {
        let job = ScrapeJob::new(url, category, tags);
        let payload = serde_json::to_vec(&job).context("Failed to encode scrape job")?;
        self.queue
            .publish(&self.topic, &payload)
            .await
            .context("Failed to queue scrape job")?;

        info!(job_id = %job.job_id, url, "Queued scrape job");
        Ok(job.job_id)
    }

    // ─── Sessions ──────────────────────────────────────────────────────

    /// The cached session, or a new empty one (cached on a best-effort
    /// basis) when none exists.
    pub async fn get_chat_session(&self, session_id: &str) -> Result<ChatSession> {
        let cache = self.cache.chat();
        match cache.get_session(session_id).await {
            Ok(Some(session)) => return Ok(session),
            Ok(None) => {}
            Err(e) => debug!(session_id, error = %e, "Chat cache unavailable; treating as miss"),
        }

        let session = ChatSession::new(session_id);
        if let Err(e) = cache.set_session(&session).await {
            debug!(session_id, error = %e, "Failed to cache new chat session");
        }
        Ok(session)
    }

    pub async fn add_chat_message(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
    ) -> Result<ChatMessage> {
        let message = ChatMessage::new(role, content);
        self.cache
            .chat()
            .add_message(session_id, message.clone())
            .await
            .with_context(|| format!("Failed to append to session {}", session_id))?;
        Ok(message)
    }

    pub async fn get_chat_history(&self, session_id: &str, limit: usize) -> Result<Vec<ChatMessage>> {
        self.cache
            .chat()
            .get_history(session_id, limit)
            .await
            .with_context(|| format!("Failed to load history for session {}", session_id))
    }

    // ─── Tutorials ─────────────────────────────────────────────────────

    /// Long-form tutorial from already-ingested documents on `topic`, or a
    /// notice that `url` was queued for scraping when there are none.
    pub async fn generate_tutorial_from_scraped_data(&self, url: &str, topic: &str) -> Result<String> {
        let docs = self.topic_documents(topic, 10).await?;
        if docs.is_empty() {
            self.scrape_document(url, topic, tutorial_tags()).await?;
            return Ok(prompt::scrape_queued_notice(topic));
        }

        let context = prompt::context_blocks(&docs);
        self.model
            .complete(&prompt::complete_tutorial(&context, topic))
            .await
            .context("Failed to generate tutorial")
    }

    /// Short tutorial from already-ingested documents on `topic`, or a
    /// notice that scraping of `url` has started.
    pub async fn scrape_and_generate_tutorial(&self, url: &str, topic: &str) -> Result<String> {
        let docs = self.topic_documents(topic, 5).await?;
        if docs.is_empty() {
            self.scrape_document(url, topic, tutorial_tags()).await?;
            return Ok(prompt::scrape_pending_notice(topic));
        }

        let context = prompt::context_blocks(&docs);
        self.model
            .complete(&prompt::quick_tutorial(&context, topic))
            .await
            .context("Failed to generate tutorial")
    }

    /// Stored documents whose title or category mentions `topic`.
    async fn topic_documents(&self, topic: &str, limit: usize) -> Result<Vec<Document>> {
        let needle = topic.to_lowercase();
        let docs = self
            .store
            .search_text(topic, limit)
            .await
            .context("Failed to search for existing documents")?;
        Ok(docs
            .into_iter()
            .filter(|d| {
                d.title.to_lowercase().contains(&needle)
                    || d.category.to_lowercase().contains(&needle)
            })
            .collect())
    }

    // ─── Insights & health ─────────────────────────────────────────────

    pub async fn conversation_insights(&self, session_id: &str) -> Result<ConversationInsights> {
        let history = self
            .get_chat_history(session_id, INSIGHTS_HISTORY_LIMIT)
            .await
            .context("Failed to get conversation history")?;
        Ok(insights_from(&history))
    }

    pub async fn cache_health(&self) -> Result<()> {
        self.cache
            .health()
            .await
            .context("Cache backend is unreachable")
    }
}

fn tutorial_tags() -> Vec<String> {
    vec!["tutorial".to_string(), "documentation".to_string()]
}

fn insights_from(history: &[ChatMessage]) -> ConversationInsights {
    let mut user_questions = Vec::new();
    let mut ai_responses = Vec::new();
    for msg in history {
        match msg.role {
            Role::User => user_questions.push(msg.content.clone()),
            Role::Assistant => ai_responses.push(msg.content.clone()),
        }
    }

    let mut counts: HashMap<String, usize> = HashMap::new();
    for question in &user_questions {
        for word in question.to_lowercase().split_whitespace() {
            if word.chars().count() > 3 {
                *counts.entry(word.to_string()).or_default() += 1;
            }
        }
    }
    let mut repeated: Vec<(String, usize)> = counts.into_iter().filter(|(_, n)| *n > 1).collect();
    repeated.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    ConversationInsights {
        total_messages: history.len(),
        topics: repeated.into_iter().take(5).map(|(w, _)| w).collect(),
        user_questions,
        ai_responses,
    }
}
