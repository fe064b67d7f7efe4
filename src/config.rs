use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub vector: VectorConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    /// `"sqlite"` (shared through the database file) or `"memory"`.
    #[serde(default = "default_cache_backend")]
    pub backend: String,
    #[serde(default = "default_cache_max_bytes")]
    pub max_bytes: usize,
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_max_key_bytes")]
    pub max_key_bytes: usize,
    #[serde(default = "default_max_value_bytes")]
    pub max_value_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: default_cache_backend(),
            max_bytes: default_cache_max_bytes(),
            ttl_secs: default_cache_ttl_secs(),
            max_key_bytes: default_max_key_bytes(),
            max_value_bytes: default_max_value_bytes(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

fn default_cache_backend() -> String {
    "sqlite".to_string()
}
fn default_cache_max_bytes() -> usize {
    1024 * 1024 * 1024
}
fn default_cache_ttl_secs() -> u64 {
    24 * 60 * 60
}
fn default_max_key_bytes() -> usize {
    1024
}
fn default_max_value_bytes() -> usize {
    5 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_model_provider")]
    pub provider: String,
    #[serde(default = "default_ollama_url")]
    pub url: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_model_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_model_provider(),
            url: default_ollama_url(),
            embedding_model: default_embedding_model(),
            chat_model: default_chat_model(),
            timeout_secs: default_model_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_model_provider() -> String {
    "ollama".to_string()
}
fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}
fn default_chat_model() -> String {
    "llama3.2:1b".to_string()
}
fn default_model_timeout_secs() -> u64 {
    60
}
fn default_max_retries() -> u32 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct VectorConfig {
    #[serde(default = "default_vector_provider")]
    pub provider: String,
    #[serde(default = "default_qdrant_url")]
    pub url: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            provider: default_vector_provider(),
            url: default_qdrant_url(),
            collection: default_collection(),
            dims: default_dims(),
        }
    }
}

fn default_vector_provider() -> String {
    "qdrant".to_string()
}
fn default_qdrant_url() -> String {
    "http://localhost:6333".to_string()
}
fn default_collection() -> String {
    "tech_docs_knowledge".to_string()
}
fn default_dims() -> usize {
    768
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueueConfig {
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            topic: default_topic(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_topic() -> String {
    "scrape-jobs".to_string()
}
fn default_poll_interval_ms() -> u64 {
    250
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Defaults to twice the worker count when unset.
    #[serde(default)]
    pub queue_capacity: Option<usize>,
    #[serde(default = "default_backoff_initial_ms")]
    pub backoff_initial_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: None,
            backoff_initial_ms: default_backoff_initial_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            user_agent: default_user_agent(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

impl IngestConfig {
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity.unwrap_or(self.workers * 2)
    }
}

fn default_workers() -> usize {
    5
}
fn default_backoff_initial_ms() -> u64 {
    100
}
fn default_backoff_max_ms() -> u64 {
    30_000
}
fn default_user_agent() -> String {
    concat!("docsai/", env!("CARGO_PKG_VERSION")).to_string()
}
fn default_fetch_timeout_secs() -> u64 {
    30
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    // Validate cache
    match config.cache.backend.as_str() {
        "memory" | "sqlite" => {}
        other => anyhow::bail!(
            "Unknown cache backend: '{}'. Must be memory or sqlite.",
            other
        ),
    }
    if config.cache.max_bytes == 0 {
        anyhow::bail!("cache.max_bytes must be > 0");
    }
    if config.cache.max_key_bytes == 0 || config.cache.max_value_bytes == 0 {
        anyhow::bail!("cache.max_key_bytes and cache.max_value_bytes must be > 0");
    }

    match config.model.provider.as_str() {
        "disabled" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown model provider: '{}'. Must be disabled or ollama.",
            other
        ),
    }

    match config.vector.provider.as_str() {
        "memory" | "qdrant" => {}
        other => anyhow::bail!(
            "Unknown vector provider: '{}'. Must be memory or qdrant.",
            other
        ),
    }
    if config.vector.dims == 0 {
        anyhow::bail!("vector.dims must be > 0");
    }

    // Validate ingestion
    if config.ingest.workers == 0 {
        anyhow::bail!("ingest.workers must be >= 1");
    }
    if config.ingest.queue_capacity() == 0 {
        anyhow::bail!("ingest.queue_capacity must be >= 1");
    }
    if config.ingest.backoff_max_ms < config.ingest.backoff_initial_ms {
        anyhow::bail!("ingest.backoff_max_ms must be >= ingest.backoff_initial_ms");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &str) -> Result<Config> {
        let content = format!("[db]\npath = \"/tmp/docsai.sqlite\"\n{}", extra);
        let config: Config = toml::from_str(&content)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config.cache.backend, "sqlite");
        assert_eq!(config.cache.max_bytes, 1024 * 1024 * 1024);
        assert_eq!(config.cache.ttl(), Duration::from_secs(86_400));
        assert_eq!(config.cache.max_key_bytes, 1024);
        assert_eq!(config.cache.max_value_bytes, 5 * 1024 * 1024);
        assert_eq!(config.ingest.workers, 5);
        assert_eq!(config.ingest.queue_capacity(), 10);
        assert_eq!(config.queue.topic, "scrape-jobs");
        assert_eq!(config.model.embedding_model, "nomic-embed-text");
    }

    #[test]
    fn test_queue_capacity_follows_workers() {
        let config = parse("[ingest]\nworkers = 3\n").unwrap();
        assert_eq!(config.ingest.queue_capacity(), 6);
        let config = parse("[ingest]\nworkers = 3\nqueue_capacity = 1\n").unwrap();
        assert_eq!(config.ingest.queue_capacity(), 1);
    }

    #[test]
    fn test_rejects_zero_workers() {
        assert!(parse("[ingest]\nworkers = 0\n").is_err());
    }

    #[test]
    fn test_rejects_unknown_providers() {
        assert!(parse("[model]\nprovider = \"openai\"\n").is_err());
        assert!(parse("[vector]\nprovider = \"pinecone\"\n").is_err());
        assert!(parse("[cache]\nbackend = \"redis\"\n").is_err());
    }

    #[test]
    fn test_rejects_inverted_backoff() {
        assert!(parse("[ingest]\nbackoff_initial_ms = 500\nbackoff_max_ms = 100\n").is_err());
    }
}
