//! [`CacheBackend`] in the `cache_entries` table.
//!
//! Lets separate `docsai` invocations share sessions and cached lookups.
//! Same budget rules as [`LruCacheBackend`](super::LruCacheBackend): key plus
//! value bytes are counted, and a write that pushes the total over
//! `max_bytes` evicts expired rows first, then least recently read ones.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

use super::{CacheBackend, CacheError, CacheResult};

pub struct SqliteCacheBackend {
    pool: SqlitePool,
    max_bytes: usize,
}

fn backend_err(e: sqlx::Error) -> CacheError {
    CacheError::Backend(e.to_string())
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

impl SqliteCacheBackend {
    pub fn new(pool: SqlitePool, max_bytes: usize) -> Self {
        Self { pool, max_bytes }
    }

    pub async fn used_bytes(&self) -> CacheResult<i64> {
        let (used,): (i64,) = sqlx::query_as("SELECT COALESCE(SUM(size), 0) FROM cache_entries")
            .fetch_one(&self.pool)
            .await
            .map_err(backend_err)?;
        Ok(used)
    }
}

#[async_trait]
impl CacheBackend for SqliteCacheBackend {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let now = now_millis();
        let row = sqlx::query("SELECT value, expires_at FROM cache_entries WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend_err)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let expires_at: i64 = row.get("expires_at");
        if expires_at <= now {
            sqlx::query("DELETE FROM cache_entries WHERE key = ?")
                .bind(key)
                .execute(&self.pool)
                .await
                .map_err(backend_err)?;
            return Ok(None);
        }

        sqlx::query("UPDATE cache_entries SET last_access = ? WHERE key = ?")
            .bind(now)
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(backend_err)?;

        Ok(Some(row.get("value")))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        let size = key.len() + value.len();
        if size > self.max_bytes {
            return Err(CacheError::Backend(format!(
                "entry of {} bytes exceeds cache budget of {} bytes",
                size, self.max_bytes
            )));
        }

        let now = now_millis();
        let expires_at = now.saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX));
        let mut tx = self.pool.begin().await.map_err(backend_err)?;

        sqlx::query(
            r#"
            INSERT INTO cache_entries (key, value, size, expires_at, last_access)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                size = excluded.size,
                expires_at = excluded.expires_at,
                last_access = excluded.last_access
            "#,
        )
        .bind(key)
        .bind(&value)
        .bind(size as i64)
        .bind(expires_at)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(backend_err)?;

        let (used,): (i64,) = sqlx::query_as("SELECT COALESCE(SUM(size), 0) FROM cache_entries")
            .fetch_one(&mut *tx)
            .await
            .map_err(backend_err)?;

        if used as usize > self.max_bytes {
            sqlx::query("DELETE FROM cache_entries WHERE expires_at <= ?")
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(backend_err)?;

            // Oldest reads first; the row just written is never a candidate.
            let rows = sqlx::query(
                "SELECT key, size FROM cache_entries WHERE key != ? ORDER BY last_access ASC, rowid ASC",
            )
            .bind(key)
            .fetch_all(&mut *tx)
            .await
            .map_err(backend_err)?;

            let (mut used,): (i64,) =
                sqlx::query_as("SELECT COALESCE(SUM(size), 0) FROM cache_entries")
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(backend_err)?;

            for row in rows {
                if used as usize <= self.max_bytes {
                    break;
                }
                let victim: String = row.get("key");
                let victim_size: i64 = row.get("size");
                sqlx::query("DELETE FROM cache_entries WHERE key = ?")
                    .bind(&victim)
                    .execute(&mut *tx)
                    .await
                    .map_err(backend_err)?;
                used -= victim_size;
            }
        }

        tx.commit().await.map_err(backend_err)
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        sqlx::query("DELETE FROM cache_entries WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(backend_err)?;
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> CacheResult<Vec<String>> {
        let now = now_millis();
        // LIKE is case-insensitive in SQLite; prefix matching must not be.
        let rows = match pattern.strip_suffix('*') {
            Some(prefix) => sqlx::query(
                "SELECT key FROM cache_entries \
                 WHERE substr(key, 1, length(?1)) = ?1 AND expires_at > ?2",
            )
            .bind(prefix)
            .bind(now)
            .fetch_all(&self.pool)
            .await,
            None => sqlx::query("SELECT key FROM cache_entries WHERE key = ?1 AND expires_at > ?2")
                .bind(pattern)
                .bind(now)
                .fetch_all(&self.pool)
                .await,
        }
        .map_err(backend_err)?;

        Ok(rows.iter().map(|r| r.get("key")).collect())
    }

    async fn ping(&self) -> CacheResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(backend_err)?;
        Ok(())
    }
}
