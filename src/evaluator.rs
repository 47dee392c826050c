//! Per-requirement coverage evaluation.
//!
//! # Algorithm
//!
//! 1. Return the cached result for `(requirement, corpora, top_k)` if any.
//! 2. **Fast check**: look up `expected_symbol`, then
//!    `expected_class.expected_method`, then each code anchor in the
//!    [`SymbolIndex`]. The first name with a location resolves the
//!    requirement as `implemented` (`fast`).
//! 3. **Semantic check**: retrieve `max(top_k, semantic_top_k)` candidates
//!    and judge them one at a time in rank order. Stop at the first
//!    `implemented`; otherwise the first `partially_implemented` wins;
//!    otherwise `not_implemented`.
//! 4. Cache and return. Results computed against a symbol index that
//!    skipped a corpus are returned but not cached.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;

use crate::cache::{CacheKey, CoverageCache};
use crate::config::EvaluationMode;
use crate::judge::CandidateJudge;
use crate::models::{
    Classification, CodeChunk, CoverageResult, CoverageStatus, Judgement, JudgementOrigin,
    Requirement, SymbolLocation,
};
use crate::retriever::CandidateRetriever;
use crate::symbols::SymbolIndex;

/// Evaluates one requirement against a corpus set.
///
/// Errors are per-requirement failures; the batch runner records them and
/// moves on.
#[async_trait]
pub trait RequirementEvaluator: Send + Sync {
    async fn evaluate(
        &self,
        req: &Requirement,
        index: &SymbolIndex,
        corpus_ids: &[String],
        top_k: usize,
    ) -> Result<Arc<CoverageResult>>;
}

/// Outcome of the symbol lookup step.
#[derive(Debug)]
enum FastCheck {
    Hit {
        symbol: String,
        locations: Vec<SymbolLocation>,
    },
    Miss,
    IndexEmpty,
    NoHints,
}

fn fast_check(req: &Requirement, index: &SymbolIndex) -> FastCheck {
    let candidates = req.symbol_candidates();
    if candidates.is_empty() {
        return FastCheck::NoHints;
    }
    if index.is_empty() {
        return FastCheck::IndexEmpty;
    }
    for symbol in candidates {
        let locations = index.find(&symbol);
        if !locations.is_empty() {
            return FastCheck::Hit {
                locations: locations.to_vec(),
                symbol,
            };
        }
    }
    FastCheck::Miss
}

/// Fast path, then semantic path, behind a shared cache.
pub struct CoverageEvaluator {
    retriever: CandidateRetriever,
    judge: Arc<dyn CandidateJudge>,
    cache: CoverageCache,
    semantic_top_k: usize,
    mode: EvaluationMode,
}

impl CoverageEvaluator {
    pub fn new(
        retriever: CandidateRetriever,
        judge: Arc<dyn CandidateJudge>,
        cache: CoverageCache,
    ) -> Self {
        Self {
            retriever,
            judge,
            cache,
            semantic_top_k: 10,
            mode: EvaluationMode::Full,
        }
    }

    /// Minimum number of candidates fetched for semantic judging.
    pub fn with_semantic_top_k(mut self, semantic_top_k: usize) -> Self {
        self.semantic_top_k = semantic_top_k;
        self
    }

    pub fn with_mode(mut self, mode: EvaluationMode) -> Self {
        self.mode = mode;
        self
    }

    async fn evaluate_uncached(
        &self,
        req: &Requirement,
        index: &SymbolIndex,
        corpus_ids: &[String],
        top_k: usize,
    ) -> CoverageResult {
        let fast = fast_check(req, index);
        tracing::debug!(requirement_id = %req.id, outcome = ?fast, "fast check");

        match (fast, self.mode) {
            (FastCheck::Hit { symbol, locations }, _) => {
                CoverageResult::symbol_hit(&req.id, &symbol, locations)
            }
            (FastCheck::NoHints, EvaluationMode::FastOnly) => {
                CoverageResult::fast_miss(&req.id, CoverageStatus::Unknown, "no symbol hints")
            }
            (FastCheck::IndexEmpty, EvaluationMode::FastOnly) => {
                CoverageResult::fast_miss(&req.id, CoverageStatus::Unknown, "symbol index is empty")
            }
            (FastCheck::Miss, EvaluationMode::FastOnly) => CoverageResult::fast_miss(
                &req.id,
                CoverageStatus::NotImplemented,
                "expected symbols not found in index",
            ),
            (_, EvaluationMode::Full) => self.semantic_check(req, corpus_ids, top_k).await,
        }
    }

    async fn semantic_check(
        &self,
        req: &Requirement,
        corpus_ids: &[String],
        top_k: usize,
    ) -> CoverageResult {
        let wide_k = top_k.max(self.semantic_top_k);
        let candidates = self.retriever.retrieve(req, corpus_ids, wide_k).await;
        if candidates.is_empty() {
            return CoverageResult::semantic(
                &req.id,
                None,
                Some("no candidates retrieved".to_string()),
                Vec::new(),
            );
        }

        let (best, judged) = self.judge_in_order(req, &candidates).await;
        tracing::info!(
            requirement_id = %req.id,
            candidates = candidates.len(),
            judged,
            best = ?best.as_ref().map(|j| j.classification),
            "semantic check finished"
        );

        let reason = if best.is_none() {
            Some(format!("none of {} candidates judged related", judged))
        } else {
            None
        };
        CoverageResult::semantic(&req.id, best, reason, candidates)
    }

    /// Judge candidates sequentially, stopping at the first `implemented`.
    ///
    /// Returns the winning judgement (if any) and the number judged.
    async fn judge_in_order(
        &self,
        req: &Requirement,
        candidates: &[CodeChunk],
    ) -> (Option<Judgement>, usize) {
        let mut first_partial: Option<Judgement> = None;
        let mut judged = 0;

        for candidate in candidates {
            judged += 1;
            let judgement = match self.judge.judge(req, candidate).await {
                Ok(j) => j,
                Err(e) => {
                    tracing::warn!(
                        requirement_id = %req.id,
                        chunk_id = %candidate.chunk_id,
                        error = %e,
                        "judging failed; treating candidate as not related"
                    );
                    Judgement::not_related(candidate, e.to_string(), JudgementOrigin::BackendError)
                }
            };

            match judgement.classification {
                Classification::Implemented => return (Some(judgement), judged),
                Classification::PartiallyImplemented if first_partial.is_none() => {
                    first_partial = Some(judgement);
                }
                _ => {}
            }
        }

        (first_partial, judged)
    }
}

#[async_trait]
impl RequirementEvaluator for CoverageEvaluator {
    async fn evaluate(
        &self,
        req: &Requirement,
        index: &SymbolIndex,
        corpus_ids: &[String],
        top_k: usize,
    ) -> Result<Arc<CoverageResult>> {
        if req.id.trim().is_empty() {
            bail!("requirement id must not be empty");
        }
        if top_k == 0 {
            bail!("top_k must be >= 1");
        }

        let key = CacheKey::new(&req.id, corpus_ids, top_k);
        if let Some(hit) = self.cache.get(&key) {
            tracing::debug!(requirement_id = %req.id, "coverage cache hit");
            return Ok(hit);
        }

        let result = Arc::new(self.evaluate_uncached(req, index, corpus_ids, top_k).await);
        if index.is_complete() {
            self.cache.insert(key, result.clone());
        } else {
            tracing::debug!(requirement_id = %req.id, "partial symbol index; result not cached");
        }
        Ok(result)
    }
}
