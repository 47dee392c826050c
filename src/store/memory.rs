//! In-memory corpus for tests and one-off runs over a JSON export.
//!
//! Uses `Vec` behind `std::sync::RwLock` for thread safety. Search scores a
//! chunk by the fraction of query terms it contains.

use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{ChunkRecord, CodeChunk};
use crate::traits::{ChunkLoader, SemanticSearch};

use super::{query_terms, CorpusExport};

struct StoredChunk {
    record: ChunkRecord,
    chunk_index: i64,
}

/// In-memory corpus store.
pub struct InMemoryCorpus {
    chunks: RwLock<Vec<StoredChunk>>,
}

impl InMemoryCorpus {
    pub fn new() -> Self {
        Self {
            chunks: RwLock::new(Vec::new()),
        }
    }

    pub fn from_export(export: &CorpusExport) -> Self {
        let corpus = Self::new();
        {
            let mut chunks = corpus.chunks.write().unwrap_or_else(|e| e.into_inner());
            for c in &export.chunks {
                chunks.push(StoredChunk {
                    record: ChunkRecord {
                        chunk_id: c.id.clone(),
                        doc_id: c.document_id.clone(),
                        content: c.text.clone(),
                    },
                    chunk_index: c.chunk_index,
                });
            }
        }
        corpus
    }

    /// Append chunks; their index is their position within `doc_id`.
    pub fn add_chunks(&self, records: Vec<ChunkRecord>) {
        let mut chunks = self.chunks.write().unwrap_or_else(|e| e.into_inner());
        for record in records {
            let chunk_index = chunks
                .iter()
                .filter(|c| c.record.doc_id == record.doc_id)
                .count() as i64;
            chunks.push(StoredChunk { record, chunk_index });
        }
    }

    pub fn len(&self) -> usize {
        self.chunks.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryCorpus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChunkLoader for InMemoryCorpus {
    async fn load_chunks(&self, corpus_id: &str) -> Result<Vec<ChunkRecord>> {
        let chunks = self.chunks.read().unwrap_or_else(|e| e.into_inner());
        let mut matching: Vec<&StoredChunk> = chunks
            .iter()
            .filter(|c| c.record.doc_id == corpus_id)
            .collect();
        matching.sort_by_key(|c| c.chunk_index);
        Ok(matching.into_iter().map(|c| c.record.clone()).collect())
    }
}

#[async_trait]
impl SemanticSearch for InMemoryCorpus {
    async fn search(
        &self,
        corpus_ids: &[String],
        query: &str,
        top_k: usize,
    ) -> Result<Vec<CodeChunk>> {
        let terms = query_terms(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let chunks = self.chunks.read().unwrap_or_else(|e| e.into_inner());
        let mut candidates: Vec<CodeChunk> = chunks
            .iter()
            .filter(|c| corpus_ids.iter().any(|id| *id == c.record.doc_id))
            .filter_map(|c| {
                let text_lower = c.record.content.to_lowercase();
                let matches = terms.iter().filter(|t| text_lower.contains(t.as_str())).count();
                if matches == 0 {
                    return None;
                }
                Some(CodeChunk {
                    chunk_id: c.record.chunk_id.clone(),
                    doc_id: c.record.doc_id.clone(),
                    content: c.record.content.clone(),
                    score: matches as f64 / terms.len() as f64,
                    matched_query: None,
                })
            })
            .collect();
        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(top_k);
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, doc: &str, content: &str) -> ChunkRecord {
        ChunkRecord {
            chunk_id: id.to_string(),
            doc_id: doc.to_string(),
            content: content.to_string(),
        }
    }

    fn corpus() -> InMemoryCorpus {
        let corpus = InMemoryCorpus::new();
        corpus.add_chunks(vec![
            record("c1", "d1", "fn place_order(order: Order) { validate order }"),
            record("c2", "d1", "fn cancel_order() {}"),
            record("c3", "d2", "fn place_order() {}"),
        ]);
        corpus
    }

    #[tokio::test]
    async fn test_search_ranks_by_term_overlap() {
        let results = corpus()
            .search(&["d1".to_string()], "place order validate", 10)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk_id, "c1");
        assert!((results[0].score - 1.0).abs() < 1e-9);
        assert!(results.iter().all(|c| c.doc_id == "d1"));
    }

    #[tokio::test]
    async fn test_search_respects_top_k() {
        let results = corpus()
            .search(&["d1".to_string(), "d2".to_string()], "order", 1)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn test_load_chunks_filters_by_corpus() {
        let chunks = corpus().load_chunks("d1").await.unwrap();
        let ids: Vec<&str> = chunks.iter().map(|c| c.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2"]);
    }

    #[tokio::test]
    async fn test_empty_corpus_yields_nothing() {
        let corpus = InMemoryCorpus::new();
        assert!(corpus.is_empty());
        assert!(corpus.search(&["d1".to_string()], "order", 5).await.unwrap().is_empty());
        assert!(corpus.load_chunks("d1").await.unwrap().is_empty());
    }
}
