//! Collaborator traits consumed by the evaluation engine.
//!
//! The engine never talks to a database, an embedding API, or a language
//! model directly. It goes through the four traits below, which lets the
//! CLI plug in SQLite and OpenAI while tests plug in scripted fakes.
//!
//! ```text
//! ┌──────────────┐  ┌──────────────┐  ┌──────────────┐  ┌────────────┐
//! │ ChunkLoader  │  │SemanticSearch│  │TextGenerator │  │ ReportSink │
//! │ (SymbolIndex)│  │ (Retriever)  │  │   (Judge)    │  │  (Batch)   │
//! └──────────────┘  └──────────────┘  └──────────────┘  └────────────┘
//! ```
//!
//! All implementations must be `Send + Sync`; `SemanticSearch` in
//! particular is called concurrently during query fan-out.

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{ChunkRecord, CodeChunk, CoverageReport};

/// Nearest-neighbour search over one or more corpora.
#[async_trait]
pub trait SemanticSearch: Send + Sync {
    /// Return up to `top_k` chunks from `corpus_ids` ranked by relevance to
    /// `query`, most relevant first.
    async fn search(&self, corpus_ids: &[String], query: &str, top_k: usize)
        -> Result<Vec<CodeChunk>>;
}

/// A text-generation backend.
///
/// Implementations may fail; callers are expected to contain failures.
/// Dropping the returned future must cancel the request.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Returns the model identifier used in logs.
    fn model_name(&self) -> &str;

    async fn generate(&self, prompt: &str, system_prompt: &str, temperature: f32)
        -> Result<String>;
}

/// Loads every chunk of a corpus, used to build the symbol index.
#[async_trait]
pub trait ChunkLoader: Send + Sync {
    async fn load_chunks(&self, corpus_id: &str) -> Result<Vec<ChunkRecord>>;
}

/// Persists a finished coverage report.
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Store the report and return a location handle (path, URL, ...).
    async fn persist(&self, report: &CoverageReport) -> Result<String>;
}
