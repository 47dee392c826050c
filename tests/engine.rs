//! End-to-end tests of the evaluation engine with scripted collaborators.
//!
//! The corpus is an [`InMemoryCorpus`]; the text generator answers from a
//! script keyed on content found in the prompt, so no network is involved.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use coverage_harness::app::runner_from_config;
use coverage_harness::batch::BatchRunner;
use coverage_harness::cache::CoverageCache;
use coverage_harness::config::{CachePolicy, Config, EvaluationMode};
use coverage_harness::evaluator::{CoverageEvaluator, RequirementEvaluator};
use coverage_harness::judge::Judge;
use coverage_harness::models::{
    ChunkRecord, CoverageKind, CoverageReport, CoverageResult, CoverageStatus, Evidence,
    JudgementOrigin, Requirement,
};
use coverage_harness::retriever::CandidateRetriever;
use coverage_harness::store::memory::InMemoryCorpus;
use coverage_harness::symbols::SymbolIndex;
use coverage_harness::traits::{ChunkLoader, ReportSink, TextGenerator};

// ─── Fakes ──────────────────────────────────────────────────────────

/// Answers `implemented` when the prompt contains `marker`, `not_related`
/// otherwise. Counts calls.
struct ScriptedGenerator {
    marker: &'static str,
    calls: Mutex<usize>,
}

impl ScriptedGenerator {
    fn new(marker: &'static str) -> Self {
        Self {
            marker,
            calls: Mutex::new(0),
        }
    }

    fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &str, _system: &str, _t: f32) -> Result<String> {
        *self.calls.lock().unwrap() += 1;
        if prompt.contains(self.marker) {
            Ok(r#"{"classification": "implemented", "reason": "handles it"}"#.to_string())
        } else {
            Ok(r#"{"classification": "not_related", "reason": "unrelated"}"#.to_string())
        }
    }
}

struct FailingGenerator;

#[async_trait]
impl TextGenerator for FailingGenerator {
    fn model_name(&self) -> &str {
        "failing"
    }

    async fn generate(&self, _prompt: &str, _system: &str, _t: f32) -> Result<String> {
        bail!("503 service unavailable")
    }
}

#[derive(Default)]
struct CollectingSink {
    reports: Mutex<Vec<CoverageReport>>,
}

#[async_trait]
impl ReportSink for CollectingSink {
    async fn persist(&self, report: &CoverageReport) -> Result<String> {
        self.reports.lock().unwrap().push(report.clone());
        Ok("memory://reports/0".to_string())
    }
}

/// Delegates to a real evaluator but fails for one requirement id.
struct FailOn {
    id: &'static str,
    inner: Arc<dyn RequirementEvaluator>,
}

#[async_trait]
impl RequirementEvaluator for FailOn {
    async fn evaluate(
        &self,
        req: &Requirement,
        index: &SymbolIndex,
        corpus_ids: &[String],
        top_k: usize,
    ) -> Result<Arc<CoverageResult>> {
        if req.id == self.id {
            bail!("store connection reset");
        }
        self.inner.evaluate(req, index, corpus_ids, top_k).await
    }
}

/// Fails the first load, then serves chunks from the wrapped corpus.
struct FlakyLoader {
    inner: Arc<InMemoryCorpus>,
    failures_left: Mutex<usize>,
}

#[async_trait]
impl ChunkLoader for FlakyLoader {
    async fn load_chunks(&self, corpus_id: &str) -> Result<Vec<ChunkRecord>> {
        {
            let mut left = self.failures_left.lock().unwrap();
            if *left > 0 {
                *left -= 1;
                bail!("database is locked");
            }
        }
        self.inner.load_chunks(corpus_id).await
    }
}

// ─── Fixtures ───────────────────────────────────────────────────────

fn corpus() -> Arc<InMemoryCorpus> {
    let corpus = InMemoryCorpus::new();
    corpus.add_chunks(vec![
        ChunkRecord {
            chunk_id: "orders-0".to_string(),
            doc_id: "orders".to_string(),
            content: concat!(
                "class OrderService:\n",
                "    def place_order(self, cart):\n",
                "        return self.repo.save(cart)\n",
            )
            .to_string(),
        },
        ChunkRecord {
            chunk_id: "orders-1".to_string(),
            doc_id: "orders".to_string(),
            content: concat!(
                "def refund_payment(order_id):\n",
                "    # refund the captured payment\n",
                "    gateway.refund(order_id)\n",
            )
            .to_string(),
        },
        ChunkRecord {
            chunk_id: "billing-0".to_string(),
            doc_id: "billing".to_string(),
            content: "def send_invoice(customer):\n    mailer.send(customer.email)\n".to_string(),
        },
    ]);
    Arc::new(corpus)
}

fn corpus_ids() -> Vec<String> {
    vec!["orders".to_string()]
}

fn place_order_req() -> Requirement {
    Requirement {
        id: "REQ-1".to_string(),
        title: "Place order".to_string(),
        description: "Customers can place an order from their cart".to_string(),
        expected_class: Some("OrderService".to_string()),
        expected_method: Some("place_order".to_string()),
        ..Default::default()
    }
}

fn refund_req() -> Requirement {
    Requirement {
        id: "REQ-2".to_string(),
        title: "Refund".to_string(),
        description: "Support refund of a captured payment".to_string(),
        ..Default::default()
    }
}

fn shipping_req() -> Requirement {
    Requirement {
        id: "REQ-3".to_string(),
        title: "Track shipment".to_string(),
        description: "Show shipment tracking numbers".to_string(),
        expected_symbol: Some("ShipmentTracker".to_string()),
        ..Default::default()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_batch_resolves_fast_and_semantic_paths() {
    let generator = Arc::new(ScriptedGenerator::new("gateway.refund"));
    let sink = Arc::new(CollectingSink::default());
    let runner = runner_from_config(
        &Config::minimal(),
        corpus(),
        generator.clone(),
        sink.clone(),
        None,
    );

    let outcome = runner
        .run(&corpus_ids(), &[place_order_req(), refund_req(), shipping_req()])
        .await
        .unwrap();
    let results = &outcome.report.results;

    assert_eq!(outcome.location, "memory://reports/0");
    assert_eq!(results.len(), 3);

    assert_eq!(results[0].requirement_id, "REQ-1");
    assert_eq!(results[0].status, CoverageStatus::Implemented);
    assert_eq!(results[0].coverage_kind, CoverageKind::Fast);
    match &results[0].evidence {
        Some(Evidence::Symbol { symbol, locations }) => {
            assert_eq!(symbol, "OrderService.place_order");
            assert_eq!(locations[0].chunk_id, "orders-0");
        }
        other => panic!("expected symbol evidence, got {:?}", other),
    }

    assert_eq!(results[1].status, CoverageStatus::Implemented);
    assert_eq!(results[1].coverage_kind, CoverageKind::Semantic);
    let best = results[1].best_judgement().unwrap();
    assert_eq!(best.chunk_id, "orders-1");
    assert_eq!(best.origin, JudgementOrigin::Model);

    // Symbol hint missed, judge found nothing in the orders corpus.
    assert_eq!(results[2].status, CoverageStatus::NotImplemented);
    assert_eq!(results[2].coverage_kind, CoverageKind::Semantic);
    assert!(results[2].evidence.is_none());

    assert_eq!(outcome.report.summary.total, 3);
    assert_eq!(outcome.report.summary.implemented, 2);
    assert_eq!(outcome.report.summary.resolved_fast, 1);
    assert_eq!(sink.reports.lock().unwrap().len(), 1);
    assert!(generator.calls() >= 1);
}

#[tokio::test]
async fn test_failed_requirement_does_not_abort_batch() {
    let corpus = corpus();
    let cache = CoverageCache::default();
    let generator = Arc::new(ScriptedGenerator::new("gateway.refund"));
    let judge = Judge::new(generator, &Config::minimal().judge);
    let inner = CoverageEvaluator::new(
        CandidateRetriever::new(corpus.clone()),
        Arc::new(judge),
        cache.clone(),
    );
    let evaluator = FailOn {
        id: "REQ-2",
        inner: Arc::new(inner),
    };
    let runner = BatchRunner::new(
        corpus,
        Arc::new(evaluator),
        Arc::new(CollectingSink::default()),
        cache,
    );

    let outcome = runner
        .run(&corpus_ids(), &[place_order_req(), refund_req(), shipping_req()])
        .await
        .unwrap();
    let results = &outcome.report.results;

    assert_eq!(results.len(), 3);
    let ids: Vec<&str> = results.iter().map(|r| r.requirement_id.as_str()).collect();
    assert_eq!(ids, vec!["REQ-1", "REQ-2", "REQ-3"]);
    assert_eq!(results[1].status, CoverageStatus::Error);
    assert_eq!(results[1].coverage_kind, CoverageKind::Error);
    assert!(results[1].reason.as_deref().unwrap_or("").contains("store connection reset"));
    assert_eq!(results[0].status, CoverageStatus::Implemented);
    assert_eq!(outcome.report.summary.error, 1);
}

#[tokio::test]
async fn test_backend_failures_yield_not_implemented() {
    let runner = runner_from_config(
        &Config::minimal(),
        corpus(),
        Arc::new(FailingGenerator),
        Arc::new(CollectingSink::default()),
        None,
    );

    let outcome = runner.run(&corpus_ids(), &[refund_req()]).await.unwrap();
    let result = &outcome.report.results[0];

    assert_eq!(result.status, CoverageStatus::NotImplemented);
    assert_eq!(result.coverage_kind, CoverageKind::Semantic);
    assert!(!result.candidates.is_empty());
}

#[tokio::test]
async fn test_fast_only_never_calls_generator() {
    let mut config = Config::minimal();
    config.retrieval.mode = EvaluationMode::FastOnly;
    let generator = Arc::new(ScriptedGenerator::new("gateway.refund"));
    let runner = runner_from_config(
        &config,
        corpus(),
        generator.clone(),
        Arc::new(CollectingSink::default()),
        None,
    );

    let outcome = runner
        .run(&corpus_ids(), &[place_order_req(), refund_req(), shipping_req()])
        .await
        .unwrap();
    let statuses: Vec<CoverageStatus> = outcome.report.results.iter().map(|r| r.status).collect();

    assert_eq!(
        statuses,
        vec![
            CoverageStatus::Implemented,
            CoverageStatus::Unknown,
            CoverageStatus::NotImplemented
        ]
    );
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn test_repeat_run_is_served_from_cache() {
    let generator = Arc::new(ScriptedGenerator::new("gateway.refund"));
    let runner = runner_from_config(
        &Config::minimal(),
        corpus(),
        generator.clone(),
        Arc::new(CollectingSink::default()),
        None,
    );

    runner.run(&corpus_ids(), &[refund_req()]).await.unwrap();
    let after_first = generator.calls();
    let second = runner.run(&corpus_ids(), &[refund_req()]).await.unwrap();

    assert_eq!(generator.calls(), after_first);
    assert_eq!(second.report.results[0].status, CoverageStatus::Implemented);
}

#[tokio::test]
async fn test_reindex_invalidates_when_configured() {
    let mut config = Config::minimal();
    config.cache.policy = CachePolicy::InvalidateOnReindex;
    let generator = Arc::new(ScriptedGenerator::new("gateway.refund"));
    let runner = runner_from_config(
        &config,
        corpus(),
        generator.clone(),
        Arc::new(CollectingSink::default()),
        None,
    );

    runner.run(&corpus_ids(), &[refund_req()]).await.unwrap();
    let after_first = generator.calls();
    runner.reindex("billing").await;
    runner.run(&corpus_ids(), &[refund_req()]).await.unwrap();
    assert_eq!(generator.calls(), after_first);

    runner.reindex("orders").await;
    runner.run(&corpus_ids(), &[refund_req()]).await.unwrap();
    assert_eq!(generator.calls(), after_first * 2);
}

#[tokio::test]
async fn test_failed_index_load_is_retried_on_next_run() {
    let corpus = corpus();
    let cache = CoverageCache::default();
    let judge = Judge::new(Arc::new(FailingGenerator), &Config::minimal().judge);
    let evaluator = CoverageEvaluator::new(
        CandidateRetriever::new(corpus.clone()),
        Arc::new(judge),
        cache.clone(),
    )
    .with_mode(EvaluationMode::FastOnly);
    let loader = FlakyLoader {
        inner: corpus,
        failures_left: Mutex::new(1),
    };
    let runner = BatchRunner::new(
        Arc::new(loader),
        Arc::new(evaluator),
        Arc::new(CollectingSink::default()),
        cache,
    );

    let first = runner.run(&corpus_ids(), &[place_order_req()]).await.unwrap();
    assert_eq!(first.report.results[0].status, CoverageStatus::Unknown);

    let second = runner.run(&corpus_ids(), &[place_order_req()]).await.unwrap();
    assert_eq!(second.report.results[0].status, CoverageStatus::Implemented);
    assert_eq!(second.report.results[0].coverage_kind, CoverageKind::Fast);
}

#[tokio::test]
async fn test_invalid_batch_is_rejected_before_persisting() {
    let sink = Arc::new(CollectingSink::default());
    let runner = runner_from_config(
        &Config::minimal(),
        corpus(),
        Arc::new(FailingGenerator),
        sink.clone(),
        None,
    );

    let err = runner
        .run(&corpus_ids(), &[refund_req(), refund_req()])
        .await
        .unwrap_err();

    assert!(err.to_string().contains("duplicate requirement id"));
    assert!(sink.reports.lock().unwrap().is_empty());
}
