//! Batch evaluation of a requirement set.
//!
//! [`BatchRunner::run`] validates the batch, builds (or reuses) one
//! [`SymbolIndex`] for the corpus set, evaluates requirements one at a time
//! in input order, and hands the finished [`CoverageReport`] to a
//! [`ReportSink`]. A requirement whose evaluation fails becomes an `error`
//! result; the batch always yields one result per requirement.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::cache::{corpus_set, CoverageCache};
use crate::error::InputError;
use crate::evaluator::RequirementEvaluator;
use crate::models::{CoverageReport, CoverageResult, ReportSummary, Requirement};
use crate::symbols::SymbolIndex;
use crate::traits::{ChunkLoader, ReportSink};

const MAX_ERROR_MESSAGE: usize = 500;

/// A persisted report and where the sink put it.
#[derive(Debug)]
pub struct BatchOutcome {
    pub report: CoverageReport,
    pub location: String,
}

pub struct BatchRunner {
    loader: Arc<dyn ChunkLoader>,
    evaluator: Arc<dyn RequirementEvaluator>,
    sink: Arc<dyn ReportSink>,
    cache: CoverageCache,
    top_k: usize,
    indexes: Mutex<HashMap<Vec<String>, Arc<SymbolIndex>>>,
}

impl BatchRunner {
    /// `cache` should be the same cache the evaluator writes to, so that
    /// [`reindex`](Self::reindex) can apply its invalidation policy.
    pub fn new(
        loader: Arc<dyn ChunkLoader>,
        evaluator: Arc<dyn RequirementEvaluator>,
        sink: Arc<dyn ReportSink>,
        cache: CoverageCache,
    ) -> Self {
        Self {
            loader,
            evaluator,
            sink,
            cache,
            top_k: 5,
            indexes: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Symbol index for `corpus_ids`, built on first use.
    ///
    /// An index that skipped a corpus is returned but not kept, so the next
    /// run loads again.
    pub async fn index_for(&self, corpus_ids: &[String]) -> Arc<SymbolIndex> {
        let key = corpus_set(corpus_ids);
        let mut indexes = self.indexes.lock().await;
        if let Some(index) = indexes.get(&key) {
            return index.clone();
        }
        let index = Arc::new(SymbolIndex::build(self.loader.as_ref(), &key).await);
        tracing::info!(
            corpora = ?key,
            symbols = index.len(),
            chunks = index.chunks_scanned(),
            skipped = ?index.skipped(),
            "symbol index ready"
        );
        if index.is_complete() {
            indexes.insert(key, index.clone());
        }
        index
    }

    /// Drop cached indexes touching `corpus_id` and apply the cache policy.
    pub async fn reindex(&self, corpus_id: &str) {
        self.indexes
            .lock()
            .await
            .retain(|key, _| !key.iter().any(|c| c == corpus_id));
        self.cache.note_reindex(corpus_id);
    }

    /// Evaluate every requirement and persist the report.
    pub async fn run(
        &self,
        corpus_ids: &[String],
        requirements: &[Requirement],
    ) -> Result<BatchOutcome> {
        validate_batch(corpus_ids, requirements)?;

        let index = self.index_for(corpus_ids).await;
        let mut results: Vec<CoverageResult> = Vec::with_capacity(requirements.len());

        for (i, req) in requirements.iter().enumerate() {
            let result = match self
                .evaluator
                .evaluate(req, &index, corpus_ids, self.top_k)
                .await
            {
                Ok(result) => result.as_ref().clone(),
                Err(e) => {
                    tracing::error!(
                        requirement_id = %req.id,
                        error = %e,
                        "requirement evaluation failed"
                    );
                    let message = truncate(&format!("{:#}", e), MAX_ERROR_MESSAGE);
                    CoverageResult::error(&req.id, &message)
                }
            };
            tracing::info!(
                progress = %format!("{}/{}", i + 1, requirements.len()),
                requirement_id = %req.id,
                status = ?result.status,
                kind = ?result.coverage_kind,
                "requirement evaluated"
            );
            results.push(result);
        }

        let report = CoverageReport {
            report_id: uuid::Uuid::new_v4().to_string(),
            generated_at: Utc::now(),
            corpus_ids: corpus_ids.to_vec(),
            top_k: self.top_k,
            summary: ReportSummary::from_results(&results),
            results,
        };
        let location = self.sink.persist(&report).await?;
        tracing::info!(
            location = %location,
            total = report.summary.total,
            "coverage report persisted"
        );

        Ok(BatchOutcome { report, location })
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RequirementFile {
    List(Vec<Requirement>),
    Wrapped { requirements: Vec<Requirement> },
}

/// Read requirements from a JSON file holding either an array or an object
/// with a `requirements` array.
pub fn load_requirements(path: &Path) -> Result<Vec<Requirement>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read requirements file: {}", path.display()))?;
    let file: RequirementFile = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse requirements file: {}", path.display()))?;
    Ok(match file {
        RequirementFile::List(reqs) => reqs,
        RequirementFile::Wrapped { requirements } => requirements,
    })
}

/// Reject malformed batches before any work is done.
pub fn validate_batch(
    corpus_ids: &[String],
    requirements: &[Requirement],
) -> Result<(), InputError> {
    if requirements.is_empty() {
        return Err(InputError::EmptyBatch);
    }
    if corpus_ids.iter().all(|c| c.trim().is_empty()) {
        return Err(InputError::NoCorpus);
    }
    let mut seen = HashSet::new();
    for (i, req) in requirements.iter().enumerate() {
        if req.id.trim().is_empty() {
            return Err(InputError::BlankId(i));
        }
        if !seen.insert(req.id.as_str()) {
            return Err(InputError::DuplicateId(req.id.clone()));
        }
        if req.title.trim().is_empty() && req.description.trim().is_empty() {
            return Err(InputError::MissingText(req.id.clone()));
        }
    }
    Ok(())
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
