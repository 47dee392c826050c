//! Wiring from [`Config`] to a ready-to-run [`BatchRunner`].

use std::sync::Arc;

use crate::batch::BatchRunner;
use crate::cache::CoverageCache;
use crate::config::Config;
use crate::evaluator::CoverageEvaluator;
use crate::judge::Judge;
use crate::retriever::CandidateRetriever;
use crate::traits::{ChunkLoader, ReportSink, SemanticSearch, TextGenerator};

/// Build a runner whose evaluator and batch share one cache.
///
/// `top_k` overrides `retrieval.top_k` when given.
pub fn runner_from_config<C>(
    config: &Config,
    corpus: Arc<C>,
    generator: Arc<dyn TextGenerator>,
    sink: Arc<dyn ReportSink>,
    top_k: Option<usize>,
) -> BatchRunner
where
    C: ChunkLoader + SemanticSearch + 'static,
{
    let cache = CoverageCache::new(config.cache.policy);
    let judge = Judge::new(generator, &config.judge);
    let evaluator = CoverageEvaluator::new(
        CandidateRetriever::new(corpus.clone()),
        Arc::new(judge),
        cache.clone(),
    )
    .with_semantic_top_k(config.retrieval.semantic_top_k)
    .with_mode(config.retrieval.mode);

    BatchRunner::new(corpus, Arc::new(evaluator), sink, cache)
        .with_top_k(top_k.unwrap_or(config.retrieval.top_k))
}
