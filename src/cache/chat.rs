use chrono::Utc;

use super::{CacheResult, TieredCache, CHAT_KEY_PREFIX};
use crate::models::{ChatMessage, ChatSession};

/// Chat sessions keyed by session id under `chat:`.
pub struct ChatCache<'a> {
    cache: &'a TieredCache,
}

impl<'a> ChatCache<'a> {
    pub(super) fn new(cache: &'a TieredCache) -> Self {
        Self { cache }
    }

    fn key(session_id: &str) -> String {
        format!("{}{}", CHAT_KEY_PREFIX, session_id)
    }

    pub async fn get_session(&self, session_id: &str) -> CacheResult<Option<ChatSession>> {
        self.cache.get_json(&Self::key(session_id)).await
    }

    pub async fn set_session(&self, session: &ChatSession) -> CacheResult<()> {
        self.cache.set_json(&Self::key(&session.id), session).await
    }

    /// Append `message` to the session, creating the session if absent.
    ///
    /// Appends to one session id are serialized in-process, so concurrent
    /// callers never overwrite each other's messages.
    pub async fn add_message(&self, session_id: &str, message: ChatMessage) -> CacheResult<()> {
        let _guard = self.cache.session_locks.lock(session_id).await;

        let mut session = self
            .get_session(session_id)
            .await?
            .unwrap_or_else(|| ChatSession::new(session_id));
        session.messages.push(message);
        session.updated_at = Utc::now();
        self.set_session(&session).await
    }

    /// The last `min(len, limit)` messages in append order; empty when the
    /// session does not exist.
    pub async fn get_history(&self, session_id: &str, limit: usize) -> CacheResult<Vec<ChatMessage>> {
        Ok(match self.get_session(session_id).await? {
            Some(session) => session.tail(limit).to_vec(),
            None => Vec::new(),
        })
    }
}
