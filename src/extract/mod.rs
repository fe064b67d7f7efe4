//! Page fetching and content extraction for scrape jobs.
//!
//! Extraction is a closed set of variants chosen by URL:
//!
//! | Host contains | Extractor | `source` tag | Id prefix |
//! |---------------|-----------|--------------|-----------|
//! | `w3schools.com` | [`Extractor::W3Schools`] | `w3schools` | `w3s_` |
//! | anything else | [`Extractor::Universal`] | `universal` | `universal_` |
//!
//! Fetching sits behind [`PageFetcher`] so the pipeline can be driven from
//! canned HTML in tests. Parsing is synchronous: `scraper` documents are
//! not `Send` and never live across an `.await`.

mod html;
mod universal;
mod w3schools;

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::redirect::Policy;
use url::Url;

use crate::config::IngestConfig;
use crate::models::Document;

pub(crate) use html::dedup_tags;

/// Retrieves the raw HTML of a page.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<String>;
}

/// [`PageFetcher`] over HTTP(S) with `reqwest`.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: &IngestConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .redirect(Policy::limited(10))
            .timeout(Duration::from_secs(config.fetch_timeout_secs))
            .build()
            .context("Failed to build HTTP client for scraping")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<String> {
        let resp = self
            .client
            .get(url.clone())
            .header(
                reqwest::header::ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", url))?;

        let status = resp.status();
        if !status.is_success() {
            bail!("HTTP error fetching {}: {}", url, status);
        }
        resp.text()
            .await
            .with_context(|| format!("Failed to read body of {}", url))
    }
}

/// Fields pulled out of one page before they become a [`Document`].
#[derive(Debug, Clone)]
pub struct ExtractedPage {
    pub id: String,
    pub title: String,
    pub content: String,
    pub category: String,
    pub tags: Vec<String>,
    pub author: String,
    pub metadata: HashMap<String, String>,
    pub scraped_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extractor {
    W3Schools,
    Universal,
}

impl Extractor {
    pub fn for_url(url: &Url) -> Self {
        match url.host_str() {
            Some(host) if host.to_lowercase().contains("w3schools.com") => Extractor::W3Schools,
            _ => Extractor::Universal,
        }
    }

    /// Value of the `source` key in vector metadata.
    pub fn source_tag(&self) -> &'static str {
        match self {
            Extractor::W3Schools => "w3schools",
            Extractor::Universal => "universal",
        }
    }

    /// Parse `html` fetched from `url` into a document.
    ///
    /// Always sets the `source_url`, `scraped_at` and `extractor` metadata
    /// keys, plus `author` when one is known.
    pub fn extract(&self, url: &Url, html: &str) -> Document {
        let now = Utc::now();
        let page = match self {
            Extractor::W3Schools => w3schools::extract(url, html, now),
            Extractor::Universal => universal::extract(url, html, now),
        };

        let mut metadata = page.metadata;
        metadata.insert("source_url".to_string(), url.to_string());
        metadata.insert(
            "scraped_at".to_string(),
            page.scraped_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        );
        metadata.insert("extractor".to_string(), self.source_tag().to_string());
        if !page.author.is_empty() {
            metadata.insert("author".to_string(), page.author.clone());
        }

        Document {
            id: page.id,
            title: page.title,
            content: page.content,
            category: page.category,
            tags: page.tags,
            author: page.author,
            created_at: page.scraped_at,
            updated_at: page.scraped_at,
            metadata,
        }
    }
}

/// Fetch and extract `raw_url` with the extractor its host selects.
pub async fn scrape(fetcher: &dyn PageFetcher, raw_url: &str) -> Result<(Extractor, Document)> {
    let url = Url::parse(raw_url).with_context(|| format!("Invalid URL: {}", raw_url))?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("Unsupported URL scheme: {}", url.scheme());
    }

    let extractor = Extractor::for_url(&url);
    let html = fetcher.fetch(&url).await?;
    let doc = extractor.extract(&url, &html);
    if doc.content.trim().is_empty() {
        bail!("No content extracted from {}", raw_url);
    }
    Ok((extractor, doc))
}
