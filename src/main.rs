//! # Page Index CLI (`pidx`)
//!
//! Indexes pages, searches them, and serves the index over HTTP.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pidx index <url>` | Index page text from `--file` or stdin |
//! | `pidx search "<query>"` | Search indexed pages |
//! | `pidx get <url>` | Show one indexed page and its chunks |
//! | `pidx list` | List indexed pages |
//! | `pidx delete <url>` | Remove a page |
//! | `pidx clear` | Remove every page |
//! | `pidx history` | Show or clear recent searches |
//! | `pidx serve` | Start the HTTP server |

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use page_index::commands::App;
use page_index::config::{self, Config};
use page_index::server;

/// Page Index: a local retrieval engine for browsed pages.
#[derive(Parser)]
#[command(name = "pidx", version, about)]
struct Cli {
    /// Path to configuration file (TOML). Built-in defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chunk, embed, and store a page, replacing any previous version.
    Index {
        url: String,

        #[arg(long, default_value = "")]
        title: String,

        /// Read page text from this file instead of stdin.
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Search indexed pages.
    Search {
        query: String,

        /// Maximum number of results (defaults to `[retrieval].top_k`).
        #[arg(long)]
        limit: Option<i64>,
    },

    /// Show one page and its chunks.
    Get { url: String },

    /// List indexed pages.
    List,

    /// Remove a page and its vectors.
    Delete { url: String },

    /// Remove every indexed page. Search history is kept.
    Clear,

    /// Show recent searches.
    History {
        #[arg(long, default_value_t = 10)]
        limit: usize,

        /// Clear the history instead of showing it.
        #[arg(long)]
        clear: bool,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => Config::default(),
    };

    run(&config, cli.command).await
}

async fn run(config: &Config, command: Commands) -> Result<()> {
    let app = App::open(config)
        .await
        .context("Failed to open page index")?;

    match command {
        Commands::Index { url, title, file } => {
            let content = match file {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                None => {
                    let mut buf = String::new();
                    std::io::stdin()
                        .read_to_string(&mut buf)
                        .context("Failed to read page text from stdin")?;
                    buf
                }
            };
            let outcome = app.index_page(&url, &title, &content).await?;
            println!(
                "Indexed {}: {} chunks ({} embedded, {} reused, {} skipped)",
                outcome.url,
                outcome.chunks_total,
                outcome.chunks_indexed - outcome.chunks_reused,
                outcome.chunks_reused,
                outcome.chunks_skipped
            );
        }
        Commands::Search { query, limit } => {
            let results = app.search(&query, limit).await?;
            if results.is_empty() {
                println!("No results.");
            }
            for result in &results {
                println!("{}. [{:.2}] {}", result.rank, result.score, result.title);
                println!("    url: {}", result.url);
                println!(
                    "    excerpt: \"{}\"",
                    result.text.replace('\n', " ").trim()
                );
                println!("    chunk: {}", result.chunk_id);
                println!();
            }
        }
        Commands::Get { url } => {
            let doc = app.get_document(&url).await?;
            println!("--- Document ---");
            println!("url:        {}", doc.url);
            println!("title:      {}", doc.title);
            println!("indexed_at: {}", doc.indexed_at.format("%Y-%m-%d %H:%M:%S UTC"));
            println!();
            println!("--- Chunks ({}) ---", doc.chunks.len());
            for chunk in &doc.chunks {
                println!("[chunk {}]", chunk.ordinal);
                println!("{}", chunk.text);
                println!();
            }
        }
        Commands::List => {
            let documents = app.document_map().await;
            if documents.is_empty() {
                println!("No documents indexed.");
            }
            for doc in documents.values() {
                println!(
                    "{}  {:>3} chunks  {}  {}",
                    doc.indexed_at.format("%Y-%m-%d"),
                    doc.chunks.len(),
                    doc.url,
                    doc.title
                );
            }
        }
        Commands::Delete { url } => {
            if app.delete_page(&url).await? {
                println!("Deleted {}", url);
            } else {
                println!("Not indexed: {}", url);
            }
        }
        Commands::Clear => {
            app.clear_all_data().await?;
            println!("Cleared all indexed pages.");
        }
        Commands::History { limit, clear } => {
            if clear {
                app.clear_search_history().await?;
                println!("Search history cleared.");
            } else {
                let entries = app.search_history(Some(limit)).await;
                if entries.is_empty() {
                    println!("No search history yet.");
                }
                for entry in entries {
                    println!(
                        "{}  {:>3} results  {}",
                        entry.timestamp.format("%Y-%m-%d %H:%M"),
                        entry.result_count,
                        entry.query
                    );
                }
            }
        }
        Commands::Serve => server::run_server(Arc::new(app), &config.server.bind).await?,
    }

    Ok(())
}
