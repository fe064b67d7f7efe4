//! In-process [`JobQueue`] for tests and single-process runs.

use std::collections::{HashMap, VecDeque};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use crate::traits::JobQueue;

/// Per-topic FIFO. `consume` reads the topic given at construction and
/// waits on a [`Notify`] while it is empty.
pub struct InMemoryJobQueue {
    topic: String,
    topics: Mutex<HashMap<String, VecDeque<Vec<u8>>>>,
    notify: Notify,
}

impl InMemoryJobQueue {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            topics: Mutex::new(HashMap::new()),
            notify: Notify::new(),
        }
    }

    /// Messages waiting on the consumed topic.
    pub async fn pending(&self) -> usize {
        self.topics
            .lock()
            .await
            .get(&self.topic)
            .map_or(0, VecDeque::len)
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<()> {
        self.topics
            .lock()
            .await
            .entry(topic.to_string())
            .or_default()
            .push_back(payload.to_vec());
        if topic == self.topic {
            self.notify.notify_one();
        }
        Ok(())
    }

    async fn consume(&self) -> Result<Vec<u8>> {
        loop {
            // Register interest before checking, so a publish between the
            // check and the await is not missed.
            let notified = self.notify.notified();
            if let Some(msg) = self
                .topics
                .lock()
                .await
                .get_mut(&self.topic)
                .and_then(VecDeque::pop_front)
            {
                return Ok(msg);
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_fifo_within_topic() {
        let q = InMemoryJobQueue::new("jobs");
        q.publish("jobs", b"1").await.unwrap();
        q.publish("jobs", b"2").await.unwrap();
        assert_eq!(q.consume().await.unwrap(), b"1");
        assert_eq!(q.consume().await.unwrap(), b"2");
    }

    #[tokio::test]
    async fn test_other_topics_are_not_consumed() {
        let q = InMemoryJobQueue::new("jobs");
        q.publish("elsewhere", b"x").await.unwrap();
        assert_eq!(q.pending().await, 0);
        let res = tokio::time::timeout(Duration::from_millis(20), q.consume()).await;
        assert!(res.is_err());
    }

    #[tokio::test]
    async fn test_consume_waits_for_publish() {
        let q = Arc::new(InMemoryJobQueue::new("jobs"));
        let consumer = {
            let q = q.clone();
            tokio::spawn(async move { q.consume().await.unwrap() })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        q.publish("jobs", b"late").await.unwrap();
        let got = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got, b"late");
    }
}
