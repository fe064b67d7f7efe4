//! SQLite-backed [`DocumentStore`].
//!
//! Timestamps are stored as RFC 3339 text with nanosecond precision, so
//! lexical order is chronological and round-trips are exact. Tags and
//! metadata are JSON text columns.

use std::collections::HashMap;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;

use crate::models::Document;
use crate::traits::DocumentStore;

pub struct SqliteDocumentStore {
    pool: SqlitePool,
}

impl SqliteDocumentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

pub(crate) fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("Invalid timestamp in documents table: {}", raw))?
        .with_timezone(&Utc))
}

/// Escape `%`, `_` and `\` so the query is matched literally by `LIKE`.
fn like_pattern(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len() + 2);
    escaped.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

fn row_to_document(row: &SqliteRow) -> Result<Document> {
    let tags_json: String = row.get("tags_json");
    let metadata_json: String = row.get("metadata_json");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(Document {
        id: row.get("id"),
        title: row.get("title"),
        content: row.get("content"),
        category: row.get("category"),
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        author: row.get("author"),
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
        metadata: serde_json::from_str::<HashMap<String, String>>(&metadata_json)
            .unwrap_or_default(),
    })
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn upsert(&self, doc: &Document) -> Result<()> {
        if doc.id.is_empty() {
            bail!("Document id must not be empty");
        }
        let tags_json = serde_json::to_string(&doc.tags)?;
        let metadata_json = serde_json::to_string(&doc.metadata)?;

        sqlx::query(
            r#"
            INSERT INTO documents (id, title, content, category, tags_json, author,
                                   created_at, updated_at, metadata_json)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                content = excluded.content,
                category = excluded.category,
                tags_json = excluded.tags_json,
                author = excluded.author,
                updated_at = excluded.updated_at,
                metadata_json = excluded.metadata_json
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.title)
        .bind(&doc.content)
        .bind(&doc.category)
        .bind(&tags_json)
        .bind(&doc.author)
        .bind(format_ts(&doc.created_at))
        .bind(format_ts(&Utc::now()))
        .bind(&metadata_json)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to store document {}", doc.id))?;

        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_document).transpose()
    }

    async fn search_text(&self, query: &str, limit: usize) -> Result<Vec<Document>> {
        let pattern = like_pattern(query);
        let rows = sqlx::query(
            r#"
            SELECT * FROM documents
            WHERE title LIKE ?1 ESCAPE '\'
               OR content LIKE ?1 ESCAPE '\'
               OR category LIKE ?1 ESCAPE '\'
               OR metadata_json LIKE ?1 ESCAPE '\'
            ORDER BY created_at DESC, id ASC
            LIMIT ?2
            "#,
        )
        .bind(&pattern)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("Document text search failed")?;

        rows.iter().map(row_to_document).collect()
    }
}
