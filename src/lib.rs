//! # Page Index
//!
//! A local retrieval engine for browsed pages.
//!
//! Page Index splits page text into sentence-aligned chunks, embeds each
//! chunk as a vector, and answers natural-language queries by ranking
//! chunks by similarity. Everything runs locally: the default embedder is
//! an offline feature-hashing model, and state persists to a JSON file or a
//! SQLite database.
//!
//! ## Architecture
//!
//! ```text
//!                ┌──────────────────────────────┐
//!  page text ──▶ │ DocumentIndex                │
//!                │  Chunker ─▶ Embedder ─▶ VectorStore
//!                │  Document metadata           │ ◀── load / flush ──▶ BackingStore
//!                └──────────────┬───────────────┘                      JSON / SQLite
//!                               │
//!  query ──────▶ SearchEngine ──┘ ─▶ ranked SearchResults
//!                               ▲
//!                ┌──────────────┴──────────────┐
//!                │ App (Command / Response)     │
//!                └──────┬──────────────┬────────┘
//!                       ▼              ▼
//!                  CLI (pidx)     HTTP server
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! pidx index https://example.com/cats --title "Cats" --file cats.txt
//! pidx search "where did the cat sit"
//! pidx serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`chunk`] | Sentence-boundary chunking |
//! | [`commands`] | Host message contract and dispatcher |
//! | [`config`] | TOML configuration parsing |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`error`] | Error type |
//! | [`history`] | Search history log |
//! | [`index`] | Document index (aggregate root) |
//! | [`models`] | Core data types |
//! | [`persist`] | Backing stores |
//! | [`search`] | Query-time retrieval |
//! | [`server`] | HTTP server |
//! | [`store`] | Vector store and similarity metrics |

pub mod chunk;
pub mod commands;
pub mod config;
pub mod embedding;
pub mod error;
pub mod history;
pub mod index;
pub mod models;
pub mod persist;
pub mod search;
pub mod server;
pub mod store;

pub use error::{IndexError, Result};
