//! Language model backends and vector utilities.
//!
//! Concrete [`LanguageModel`] implementations:
//! - **[`DisabledModel`]** — returns errors; used when no model is configured.
//! - **[`OllamaClient`]** — calls a local Ollama instance: `/api/embeddings`
//!   for vectors and `/api/generate` for completions.
//!
//! Use [`create_model`] to pick one from configuration.
//!
//! # Retry Strategy
//!
//! Both Ollama endpoints use exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::ModelConfig;
use crate::traits::LanguageModel;

// ============ Disabled Model ============

/// Model that refuses every call.
pub struct DisabledModel;

#[async_trait]
impl LanguageModel for DisabledModel {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        bail!("Language model is disabled. Set [model] provider = \"ollama\" in config.")
    }

    async fn complete(&self, _prompt: &str) -> Result<String> {
        bail!("Language model is disabled. Set [model] provider = \"ollama\" in config.")
    }
}

// ============ Ollama Client ============

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Client for a local Ollama instance.
///
/// Requires Ollama to be running with both models pulled
/// (e.g. `ollama pull nomic-embed-text && ollama pull llama3.2:1b`).
pub struct OllamaClient {
    client: reqwest::Client,
    url: String,
    embedding_model: String,
    chat_model: String,
    max_retries: u32,
}

impl OllamaClient {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client for Ollama")?;

        Ok(Self {
            client,
            url: config.url.trim_end_matches('/').to_string(),
            embedding_model: config.embedding_model.clone(),
            chat_model: config.chat_model.clone(),
            max_retries: config.max_retries,
        })
    }

    async fn post_with_retry<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let endpoint = format!("{}{}", self.url, path);
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                debug!(endpoint = %endpoint, attempt, ?delay, "Retrying Ollama request");
                tokio::time::sleep(delay).await;
            }

            let resp = self.client.post(&endpoint).json(body).send().await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return response
                            .json::<R>()
                            .await
                            .with_context(|| format!("Invalid Ollama response from {}", path));
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(anyhow::anyhow!(
                            "Ollama API error {}: {}",
                            status,
                            body_text
                        ));
                        continue;
                    }

                    bail!("Ollama API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(anyhow::anyhow!(
                        "Ollama connection error (is Ollama running at {}?): {}",
                        self.url,
                        e
                    ));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Ollama request failed after retries")))
    }
}

#[async_trait]
impl LanguageModel for OllamaClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let req = EmbedRequest {
            model: &self.embedding_model,
            prompt: text,
        };
        let resp: EmbedResponse = self.post_with_retry("/api/embeddings", &req).await?;
        if resp.embedding.is_empty() {
            bail!("Ollama returned an empty embedding");
        }
        Ok(resp.embedding)
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let req = GenerateRequest {
            model: &self.chat_model,
            prompt,
            stream: false,
        };
        let resp: GenerateResponse = self.post_with_retry("/api/generate", &req).await?;
        Ok(resp.response)
    }
}

/// Create a language model from configuration.
///
/// | Config Value | Model |
/// |-------------|-------|
/// | `"disabled"` | [`DisabledModel`] |
/// | `"ollama"` | [`OllamaClient`] |
pub fn create_model(config: &ModelConfig) -> Result<Arc<dyn LanguageModel>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledModel)),
        "ollama" => Ok(Arc::new(OllamaClient::new(config)?)),
        other => bail!("Unknown model provider: {}", other),
    }
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors or vectors
/// of different lengths.
///
/// ```text
///            a · b
/// cos(θ) = ─────────
///          ‖a‖ × ‖b‖
/// ```
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
