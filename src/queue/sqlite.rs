//! Durable [`JobQueue`] in the `scrape_jobs` table.
//!
//! `consume` claims and deletes the oldest row of its topic in one
//! transaction, polling while the topic is empty. A consumer that crashes
//! after the commit loses that job; the queue gives no stronger guarantee
//! than at-least-once delivery of what it still holds.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

use crate::store::sqlite::format_ts;
use crate::traits::JobQueue;

pub struct SqliteJobQueue {
    pool: SqlitePool,
    topic: String,
    poll_interval: Duration,
}

impl SqliteJobQueue {
    pub fn new(pool: SqlitePool, topic: impl Into<String>, poll_interval: Duration) -> Self {
        Self {
            pool,
            topic: topic.into(),
            poll_interval,
        }
    }

    /// Claim the oldest message of this queue's topic, if any.
    pub async fn try_consume(&self) -> Result<Option<Vec<u8>>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "SELECT seq, payload FROM scrape_jobs WHERE topic = ? ORDER BY seq ASC LIMIT 1",
        )
        .bind(&self.topic)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };

        let seq: i64 = row.get("seq");
        let payload: Vec<u8> = row.get("payload");

        sqlx::query("DELETE FROM scrape_jobs WHERE seq = ?")
            .bind(seq)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(payload))
    }

    /// Messages waiting on this queue's topic.
    pub async fn pending(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM scrape_jobs WHERE topic = ?")
            .bind(&self.topic)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl JobQueue for SqliteJobQueue {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<()> {
        sqlx::query("INSERT INTO scrape_jobs (topic, payload, enqueued_at) VALUES (?, ?, ?)")
            .bind(topic)
            .bind(payload)
            .bind(format_ts(&Utc::now()))
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to publish to topic {}", topic))?;
        Ok(())
    }

    async fn consume(&self) -> Result<Vec<u8>> {
        loop {
            if let Some(payload) = self
                .try_consume()
                .await
                .context("Failed to read from job queue")?
            {
                return Ok(payload);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
