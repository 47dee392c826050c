//! Corpus backends implementing [`ChunkLoader`](crate::traits::ChunkLoader)
//! and [`SemanticSearch`](crate::traits::SemanticSearch).
//!
//! | Backend | Loader | Search |
//! |---------|--------|--------|
//! | [`memory::InMemoryCorpus`] | chunk list | term overlap |
//! | [`sqlite::SqliteCorpus`] | `chunks` table | cosine over `chunk_vectors`, or FTS5 |
//!
//! Both accept the `{ "documents": [...], "chunks": [...] }` JSON export
//! format; unknown fields are ignored. Chunks may carry a precomputed
//! `embedding`, which the SQLite backend stores for vector search.

pub mod memory;
pub mod sqlite;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A corpus snapshot in JSON export form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorpusExport {
    #[serde(default)]
    pub documents: Vec<ExportDocument>,
    pub chunks: Vec<ExportChunk>,
    /// Model that produced the chunk embeddings, if any are included.
    #[serde(default)]
    pub embedding_model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportDocument {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportChunk {
    pub id: String,
    pub document_id: String,
    #[serde(default)]
    pub chunk_index: i64,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

pub fn load_export(path: &Path) -> Result<CorpusExport> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read corpus export: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse corpus export: {}", path.display()))
}

/// Lowercased word tokens of at least two characters.
pub fn query_terms(query: &str) -> Vec<String> {
    query
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| t.chars().count() >= 2)
        .map(str::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_terms() {
        assert_eq!(
            query_terms("Place an order (via OrderService.place_order)!"),
            vec!["place", "an", "order", "via", "orderservice", "place_order"]
        );
    }

    #[test]
    fn test_export_ignores_unknown_fields() {
        let export: CorpusExport = serde_json::from_str(
            r#"{"documents": [{"id": "d1", "source": "git", "updated_at": 5, "body": "x"}],
                "chunks": [{"id": "c1", "document_id": "d1", "chunk_index": 0, "text": "fn a() {}"}]}"#,
        )
        .unwrap();
        assert_eq!(export.documents[0].id, "d1");
        assert_eq!(export.chunks[0].text, "fn a() {}");
    }
}
