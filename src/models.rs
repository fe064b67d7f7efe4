//! Core data models used throughout the assistant.
//!
//! These types represent the documents, vector records, chat sessions and
//! scrape jobs that flow through the query and ingestion paths. All of them
//! serialize to JSON because every one of them crosses a cache or queue
//! boundary at some point.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Category assigned to answers persisted by the learning write-back.
pub const AI_RESPONSE_CATEGORY: &str = "AI_Response";

/// A documentation or tutorial record held by the document store.
///
/// Identity is `id`. Upserting a document whose id already exists replaces
/// every field except `created_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub content: String,
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Document {
    /// Build a document stamped with the current time.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            content: content.into(),
            category: category.into(),
            tags: Vec::new(),
            author: String::new(),
            created_at: now,
            updated_at: now,
            metadata: HashMap::new(),
        }
    }

    /// The `"Title: …\nContent: …"` block used when grounding a prompt.
    pub fn context_block(&self) -> String {
        format!("Title: {}\nContent: {}", self.title, self.content)
    }
}

/// Opaque metadata stored next to a vector. Always carries `document_id`.
pub type VectorMetadata = serde_json::Map<String, serde_json::Value>;

/// A vector plus the metadata that resolves it back to a [`Document`].
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub vector: Vec<f32>,
    pub metadata: VectorMetadata,
}

impl VectorRecord {
    /// Build a record carrying the standard metadata keys for `doc`:
    /// `document_id`, `title`, `category`, `tags`, `author` and `source`.
    pub fn for_document(vector: Vec<f32>, doc: &Document, source: &str) -> Self {
        let mut metadata = VectorMetadata::new();
        metadata.insert("document_id".into(), doc.id.clone().into());
        metadata.insert("title".into(), doc.title.clone().into());
        metadata.insert("category".into(), doc.category.clone().into());
        metadata.insert(
            "tags".into(),
            serde_json::Value::Array(doc.tags.iter().cloned().map(Into::into).collect()),
        );
        metadata.insert("author".into(), doc.author.clone().into());
        metadata.insert("source".into(), source.into());
        Self { vector, metadata }
    }

    /// Attach an extra metadata entry.
    pub fn with(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// A nearest-neighbour hit returned by the vector index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    /// Similarity in `[0, 1]`; higher is closer.
    pub score: f32,
    pub metadata: VectorMetadata,
}

impl SearchResult {
    /// The `document_id` this hit points at, if present and a string.
    pub fn document_id(&self) -> Option<&str> {
        self.metadata.get("document_id").and_then(|v| v.as_str())
    }
}

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable entry in a [`ChatSession`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: format!("msg_{}", uuid::Uuid::new_v4().simple()),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A conversation; messages are kept in append order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    #[serde(default)]
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

impl ChatSession {
    /// An empty session created now.
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            user_id: String::new(),
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
        }
    }

    /// The last `min(len, limit)` messages, oldest first.
    pub fn tail(&self, limit: usize) -> &[ChatMessage] {
        let start = self.messages.len().saturating_sub(limit);
        &self.messages[start..]
    }
}

/// Work item handed from producers to the ingestion pipeline.
///
/// Serialized on the queue as `{url, category, tags, job_id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeJob {
    pub url: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub job_id: String,
}

impl ScrapeJob {
    /// A job with a fresh `job_id`.
    pub fn new(url: impl Into<String>, category: impl Into<String>, tags: Vec<String>) -> Self {
        Self {
            url: url.into(),
            category: category.into(),
            tags,
            job_id: format!("job_{}", uuid::Uuid::new_v4().simple()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tail_returns_last_messages_in_order() {
        let mut session = ChatSession::new("s1");
        for i in 1..=15 {
            session
                .messages
                .push(ChatMessage::new(Role::User, format!("m{}", i)));
        }
        let tail = session.tail(10);
        assert_eq!(tail.len(), 10);
        assert_eq!(tail[0].content, "m6");
        assert_eq!(tail[9].content, "m15");
    }

    #[test]
    fn test_tail_shorter_than_limit() {
        let mut session = ChatSession::new("s1");
        session.messages.push(ChatMessage::new(Role::User, "only"));
        assert_eq!(session.tail(10).len(), 1);
    }

    #[test]
    fn test_scrape_job_wire_shape() {
        let job = ScrapeJob {
            url: "https://example.com/x".into(),
            category: "HTML".into(),
            tags: vec!["a".into()],
            job_id: "job_1".into(),
        };
        let json: serde_json::Value = serde_json::to_value(&job).unwrap();
        assert_eq!(json["url"], "https://example.com/x");
        assert_eq!(json["category"], "HTML");
        assert_eq!(json["tags"][0], "a");
        assert_eq!(json["job_id"], "job_1");
    }

    #[test]
    fn test_vector_record_standard_metadata() {
        let mut doc = Document::new("d1", "Title", "Body", "CSS");
        doc.tags = vec!["css".into()];
        doc.author = "someone".into();
        let rec = VectorRecord::for_document(vec![0.1], &doc, "universal");
        for key in ["document_id", "title", "category", "tags", "author", "source"] {
            assert!(rec.metadata.contains_key(key), "missing {}", key);
        }
        assert_eq!(rec.metadata["document_id"], "d1");
        assert_eq!(rec.metadata["source"], "universal");
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let msg = ChatMessage::new(Role::Assistant, "hi");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "assistant");
    }
}
