//! # docsai
//!
//! A retrieval-augmented tutorial assistant. Questions are answered from a
//! knowledge base of scraped documentation, and every answer is written
//! back into that knowledge base.
//!
//! ## Architecture
//!
//! ```text
//!                   ┌──────────────────── TieredCache ────────────────────┐
//!                   │  doc:      emb:        search:        chat:         │
//!                   └──────▲──────────▲──────────▲─────────────▲──────────┘
//!                          │          │          │             │
//! chat ──────────► QueryEngine ──► LanguageModel / VectorIndex / DocumentStore
//!                          │                          ▲
//!                          └─► LearningWriter ────────┘  (detached)
//!
//! scrape ─► JobQueue ─► IngestionPipeline ─► WorkerPool ─► extract ─► stores
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docsai init
//! docsai scrape https://www.w3schools.com/css/css_grid.asp --category CSS
//! docsai worker                      # ingest queued pages; Ctrl-C to stop
//! docsai chat "how does css grid work?" --session s1
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`traits`] | Collaborator interfaces |
//! | [`backends`] | Collaborator handles built once per process |
//! | [`cache`] | Tiered cache-aside layer |
//! | [`embedding`] | Language model backends (Ollama) |
//! | [`vector`] | Vector index backends (in-memory, Qdrant) |
//! | [`store`] | Document store backends (in-memory, SQLite) |
//! | [`queue`] | Job queue backends (in-memory, SQLite) |
//! | [`db`] | Database connection and schema |
//! | [`engine`] | Chat orchestration and knowledge operations |
//! | [`prompt`] | Prompt templates |
//! | [`learning`] | Background write-back of answers |
//! | [`extract`] | Page fetching and HTML extraction |
//! | [`ingest`] | Scrape job pipeline |
//! | [`pool`] | Bounded async worker pool |
//! | [`logging`] | Tracing subscriber setup |

pub mod backends;
pub mod cache;
pub mod config;
pub mod db;
pub mod embedding;
pub mod engine;
pub mod extract;
pub mod ingest;
pub mod learning;
mod locks;
pub mod logging;
pub mod models;
pub mod pool;
pub mod prompt;
pub mod queue;
pub mod store;
pub mod traits;
pub mod vector;
