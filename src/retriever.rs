//! Candidate retrieval with multi-query fan-out.
//!
//! A requirement is turned into several query strings (summary,
//! description, acceptance criteria, title, phrases, related systems).
//! All queries are sent to the [`SemanticSearch`] backend concurrently and
//! the per-query result lists are merged:
//!
//! 1. Deduplicate by chunk id.
//! 2. Keep the highest score seen and the query that produced it.
//! 3. Sort by score (desc); ties keep first-seen order.
//! 4. Truncate to `top_k`.
//!
//! Merging walks results in query order, so the outcome does not depend on
//! which query finished first.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;

use crate::models::{CodeChunk, Requirement};
use crate::traits::SemanticSearch;

/// Build the query strings for a requirement, in priority order.
///
/// Blank fields are skipped; duplicates are kept.
pub fn build_queries(req: &Requirement) -> Vec<String> {
    let mut queries: Vec<String> = Vec::new();
    let mut push = |s: &str| {
        let s = s.trim();
        if !s.is_empty() {
            queries.push(s.to_string());
        }
    };

    if let Some(summary) = &req.summary {
        push(summary);
    }
    push(&req.description);
    if let Some(criteria) = &req.acceptance_criteria {
        push(criteria);
    }
    push(&req.title);
    for phrase in &req.trigger_phrases {
        push(phrase);
    }
    for phrase in &req.effect_phrases {
        push(phrase);
    }
    let systems: Vec<&str> = req
        .related_systems
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    if !systems.is_empty() {
        push(&systems.join(", "));
    }
    queries
}

/// Merge per-query result lists into one ranked, deduplicated list.
///
/// `results[i]` must be the result list for `queries[i]`.
pub fn merge_candidates(
    queries: &[String],
    results: Vec<Vec<CodeChunk>>,
    top_k: usize,
) -> Vec<CodeChunk> {
    let mut merged: Vec<CodeChunk> = Vec::new();
    let mut position: HashMap<String, usize> = HashMap::new();

    for (query, chunks) in queries.iter().zip(results) {
        for mut chunk in chunks {
            match position.get(&chunk.chunk_id) {
                Some(&i) => {
                    if chunk.score > merged[i].score {
                        merged[i].score = chunk.score;
                        merged[i].matched_query = Some(query.clone());
                    }
                }
                None => {
                    chunk.matched_query = Some(query.clone());
                    position.insert(chunk.chunk_id.clone(), merged.len());
                    merged.push(chunk);
                }
            }
        }
    }

    // Vec::sort_by is stable, so equal scores keep first-seen order.
    merged.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    merged.truncate(top_k);
    merged
}

/// Issues requirement queries against a [`SemanticSearch`] backend.
#[derive(Clone)]
pub struct CandidateRetriever {
    backend: Arc<dyn SemanticSearch>,
}

impl CandidateRetriever {
    pub fn new(backend: Arc<dyn SemanticSearch>) -> Self {
        Self { backend }
    }

    /// Retrieve ranked candidates for a requirement.
    pub async fn retrieve(
        &self,
        req: &Requirement,
        corpus_ids: &[String],
        top_k: usize,
    ) -> Vec<CodeChunk> {
        let queries = build_queries(req);
        tracing::debug!(
            requirement_id = %req.id,
            queries = queries.len(),
            top_k,
            "retrieving candidates"
        );
        self.search(&queries, corpus_ids, top_k).await
    }

    /// Run every query concurrently and merge the results.
    ///
    /// Failed queries are logged and contribute nothing.
    pub async fn search(
        &self,
        queries: &[String],
        corpus_ids: &[String],
        top_k: usize,
    ) -> Vec<CodeChunk> {
        if queries.is_empty() || top_k == 0 {
            return Vec::new();
        }

        let backend = self.backend.as_ref();
        let futures = queries.iter().map(|q| async move {
            match backend.search(corpus_ids, q, top_k).await {
                Ok(chunks) => chunks,
                Err(e) => {
                    tracing::warn!(query = %q, error = %e, "search query failed");
                    Vec::new()
                }
            }
        });
        let results = join_all(futures).await;

        merge_candidates(queries, results, top_k)
    }
}
