//! # docsai CLI
//!
//! ## Usage
//!
//! ```bash
//! docsai --config ./config/docsai.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docsai init` | Create the database and vector collection |
//! | `docsai chat "<message>"` | Ask a question, optionally within a session |
//! | `docsai add <file>` | Add a document from a text file |
//! | `docsai search "<query>"` | Text search over stored documents |
//! | `docsai scrape <url>` | Queue a page for ingestion |
//! | `docsai tutorial <url> <topic>` | Tutorial from scraped pages, queueing a scrape if none |
//! | `docsai history <session>` | Show a session's recent messages |
//! | `docsai insights <session>` | Summarize a session as JSON |
//! | `docsai worker` | Run the ingestion pipeline until Ctrl-C |

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};

use tech_docs_rag::backends::Backends;
use tech_docs_rag::config::{self, Config};
use tech_docs_rag::engine::QueryEngine;
use tech_docs_rag::ingest::IngestionPipeline;
use tech_docs_rag::logging;
use tech_docs_rag::models::Document;

/// How long a one-shot command waits for background write-backs on exit.
const LEARNING_FLUSH_TIMEOUT: Duration = Duration::from_secs(30);

/// docsai: a retrieval-augmented tutorial assistant over scraped
/// documentation.
#[derive(Parser)]
#[command(
    name = "docsai",
    about = "Retrieval-augmented tutorial assistant over scraped documentation",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docsai.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema and vector collection.
    ///
    /// Idempotent; safe to run repeatedly.
    Init,

    /// Ask a question.
    Chat {
        message: String,

        /// Continue (or start) a conversation with this id.
        #[arg(long)]
        session: Option<String>,
    },

    /// Add a document whose content is read from a file.
    Add {
        /// Text or Markdown file with the document body.
        file: PathBuf,

        #[arg(long)]
        title: String,

        #[arg(long)]
        category: String,

        /// May be repeated.
        #[arg(long = "tag")]
        tags: Vec<String>,

        #[arg(long, default_value = "")]
        author: String,
    },

    /// Text search over stored documents.
    Search {
        query: String,

        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Queue a page for ingestion by a worker.
    Scrape {
        url: String,

        /// Category to assign instead of the one inferred from the page.
        #[arg(long, default_value = "")]
        category: String,

        /// Extra tag; may be repeated.
        #[arg(long = "tag")]
        tags: Vec<String>,
    },

    /// Generate a tutorial on a topic from already-scraped pages.
    ///
    /// When nothing on the topic has been ingested yet, queues `url` for
    /// scraping instead.
    Tutorial {
        url: String,
        topic: String,

        /// Short tutorial instead of the full one.
        #[arg(long)]
        quick: bool,
    },

    /// Show a session's most recent messages.
    History {
        session: String,

        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Summarize a session (message counts, repeated topics) as JSON.
    Insights { session: String },

    /// Run the ingestion pipeline until Ctrl-C.
    Worker,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_tracing();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    let backends = Backends::open(&cfg).await?;
    let result = run(cli.command, &cfg, &backends).await;
    backends.close().await;
    result
}

async fn run(command: Commands, cfg: &Config, backends: &Backends) -> Result<()> {
    let engine = QueryEngine::new(backends, cfg.queue.topic.clone());

    match command {
        Commands::Init => {
            engine.cache_health().await?;
            println!("Database initialized successfully.");
        }
        Commands::Chat { message, session } => {
            let answer = match &session {
                Some(id) => engine.chat_with_history(id, &message).await,
                None => engine.chat(&message).await,
            };
            match answer {
                Ok(answer) => println!("{}", answer),
                Err(e) => {
                    error!(error = %e, "Chat failed");
                    bail!("Failed to generate response");
                }
            }
        }
        Commands::Add {
            file,
            title,
            category,
            tags,
            author,
        } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let mut doc = Document::new("", title, content, category);
            doc.tags = tags;
            doc.author = author;
            let doc = engine.add_document(doc).await?;
            println!("{}", doc.id);
        }
        Commands::Search { query, limit } => {
            let docs = engine.search_documents(&query, limit).await?;
            if docs.is_empty() {
                println!("No results.");
            }
            for (i, doc) in docs.iter().enumerate() {
                println!("{}. [{}] {} ({})", i + 1, doc.category, doc.title, doc.id);
                if let Some(url) = doc.metadata.get("source_url") {
                    println!("    {}", url);
                }
            }
        }
        Commands::Scrape {
            url,
            category,
            tags,
        } => {
            let job_id = engine.scrape_document(&url, &category, tags).await?;
            println!("Queued {}", job_id);
        }
        Commands::Tutorial { url, topic, quick } => {
            let text = if quick {
                engine.scrape_and_generate_tutorial(&url, &topic).await?
            } else {
                engine
                    .generate_tutorial_from_scraped_data(&url, &topic)
                    .await?
            };
            println!("{}", text);
        }
        Commands::History { session, limit } => {
            let history = engine.get_chat_history(&session, limit).await?;
            if history.is_empty() {
                println!("No messages.");
            }
            for msg in history {
                println!(
                    "[{}] {}: {}",
                    msg.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    msg.role,
                    msg.content
                );
            }
        }
        Commands::Insights { session } => {
            let insights = engine.conversation_insights(&session).await?;
            println!("{}", serde_json::to_string_pretty(&insights)?);
        }
        Commands::Worker => run_worker(cfg, backends).await?,
    }

    if !engine.learning().flush(LEARNING_FLUSH_TIMEOUT).await {
        info!(
            pending = engine.learning().in_flight(),
            "Exiting with learning write-backs still running"
        );
    }
    Ok(())
}

async fn run_worker(cfg: &Config, backends: &Backends) -> Result<()> {
    let pipeline = IngestionPipeline::new(backends, &cfg.ingest);
    let cancel = pipeline.cancellation_token();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Interrupt received; stopping"),
            Err(e) => error!(error = %e, "Failed to listen for Ctrl-C; stopping"),
        }
        cancel.cancel();
    });

    pipeline.run().await;
    let discarded = pipeline.shutdown().await;
    println!("Worker stopped ({} queued jobs discarded).", discarded);
    Ok(())
}
