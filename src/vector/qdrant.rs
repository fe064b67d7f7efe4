//! [`VectorIndex`] over the Qdrant REST API.
//!
//! ```text
//! GET  /collections/{c}                → 404 triggers creation
//! PUT  /collections/{c}                {vectors: {size, distance: "Cosine"}}
//! PUT  /collections/{c}/points?wait=true  {points: [{id, vector, payload}]}
//! POST /collections/{c}/points/search  {vector, limit, with_payload: true}
//! ```
//!
//! Point ids are random UUIDs: records are write-once and never addressed
//! by id afterwards.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::VectorConfig;
use crate::models::{SearchResult, VectorMetadata};
use crate::traits::VectorIndex;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct QdrantIndex {
    client: reqwest::Client,
    url: String,
    collection: String,
    dims: usize,
}

#[derive(Serialize)]
struct Point<'a> {
    id: String,
    vector: &'a [f32],
    payload: VectorMetadata,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    points: Vec<Point<'a>>,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    vector: &'a [f32],
    limit: usize,
    with_payload: bool,
    with_vector: bool,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result: Vec<ScoredPoint>,
}

#[derive(Deserialize)]
struct ScoredPoint {
    id: serde_json::Value,
    score: f32,
    #[serde(default)]
    payload: Option<VectorMetadata>,
}

impl QdrantIndex {
    pub fn new(config: &VectorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client for Qdrant")?;
        Ok(Self {
            client,
            url: config.url.trim_end_matches('/').to_string(),
            collection: config.collection.clone(),
            dims: config.dims,
        })
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.url, self.collection)
    }

    /// Create the collection with cosine distance if it does not exist.
    pub async fn ensure_collection(&self) -> Result<()> {
        let url = self.collection_url();
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Qdrant connection error (is Qdrant running at {}?)", self.url))?;

        match resp.status() {
            s if s.is_success() => return Ok(()),
            StatusCode::NOT_FOUND => {}
            s => {
                let body = resp.text().await.unwrap_or_default();
                bail!("Qdrant collection check failed {}: {}", s, body);
            }
        }

        let body = serde_json::json!({
            "vectors": { "size": self.dims, "distance": "Cosine" }
        });
        let resp = self
            .client
            .put(&url)
            .json(&body)
            .send()
            .await
            .context("Failed to create Qdrant collection")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("Qdrant collection create failed {}: {}", status, body);
        }

        info!(collection = %self.collection, dims = self.dims, "Created Qdrant collection");
        Ok(())
    }
}

fn point_id_to_string(id: &serde_json::Value) -> String {
    match id {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn upsert(&self, vector: &[f32], metadata: VectorMetadata) -> Result<()> {
        if vector.is_empty() {
            bail!("Refusing to store an empty vector");
        }
        let req = UpsertRequest {
            points: vec![Point {
                id: uuid::Uuid::new_v4().to_string(),
                vector,
                payload: metadata,
            }],
        };
        let resp = self
            .client
            .put(format!("{}/points?wait=true", self.collection_url()))
            .json(&req)
            .send()
            .await
            .context("Qdrant upsert request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("Qdrant upsert failed {}: {}", status, body);
        }
        Ok(())
    }

    async fn query(&self, vector: &[f32], limit: usize) -> Result<Vec<SearchResult>> {
        if vector.is_empty() {
            bail!("Refusing to search with an empty vector");
        }
        let req = SearchRequest {
            vector,
            limit,
            with_payload: true,
            with_vector: false,
        };
        let resp = self
            .client
            .post(format!("{}/points/search", self.collection_url()))
            .json(&req)
            .send()
            .await
            .context("Qdrant search request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("Qdrant search failed {}: {}", status, body);
        }

        let parsed: SearchResponse = resp
            .json()
            .await
            .context("Invalid Qdrant search response")?;

        Ok(parsed
            .result
            .into_iter()
            .map(|p| SearchResult {
                id: point_id_to_string(&p.id),
                score: p.score,
                metadata: p.payload.unwrap_or_default(),
            })
            .collect())
    }
}
