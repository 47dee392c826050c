//! Core data models used throughout Coverage Harness.
//!
//! These types represent the requirements, retrieved chunks, judgements,
//! and coverage results that flow through the evaluation pipeline. Every
//! type that leaves the process (reports) derives `Serialize`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A structured design requirement to check against source code.
///
/// Produced by an external extraction stage and deserialized from JSON.
/// All optional fields are explicit so callers never guess at presence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Requirement {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub acceptance_criteria: Option<String>,
    #[serde(default)]
    pub trigger_phrases: Vec<String>,
    #[serde(default)]
    pub effect_phrases: Vec<String>,
    #[serde(default)]
    pub related_systems: Vec<String>,
    #[serde(default)]
    pub expected_symbol: Option<String>,
    #[serde(default)]
    pub expected_class: Option<String>,
    #[serde(default)]
    pub expected_method: Option<String>,
    #[serde(default)]
    pub expected_code_anchors: Vec<String>,
}

impl Requirement {
    /// Text used to describe the requirement to the judge: the description,
    /// or the title when the description is blank.
    pub fn judge_text(&self) -> &str {
        if self.description.trim().is_empty() {
            &self.title
        } else {
            &self.description
        }
    }

    /// Qualified names to try on the fast path, in preference order.
    pub fn symbol_candidates(&self) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(sym) = non_blank(self.expected_symbol.as_deref()) {
            out.push(sym.to_string());
        }
        if let (Some(class), Some(method)) = (
            non_blank(self.expected_class.as_deref()),
            non_blank(self.expected_method.as_deref()),
        ) {
            out.push(format!("{}.{}", class, method));
        }
        for anchor in &self.expected_code_anchors {
            if let Some(a) = non_blank(Some(anchor)) {
                out.push(a.to_string());
            }
        }
        out
    }
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// A raw chunk as returned by a [`ChunkLoader`](crate::traits::ChunkLoader).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub chunk_id: String,
    pub doc_id: String,
    pub content: String,
}

/// A retrieved chunk with its relevance score.
#[derive(Debug, Clone, Serialize)]
pub struct CodeChunk {
    pub chunk_id: String,
    pub doc_id: String,
    pub content: String,
    /// Higher is more relevant.
    pub score: f64,
    /// The query string that produced the winning score.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_query: Option<String>,
}

/// Where a symbol was observed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SymbolLocation {
    pub chunk_id: String,
    pub doc_id: String,
}

/// Classification of one candidate against one requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Implemented,
    PartiallyImplemented,
    NotRelated,
}

impl Classification {
    /// Parse a model-supplied label. Accepts case and separator variations.
    pub fn parse(label: &str) -> Option<Self> {
        let norm = label.trim().to_lowercase().replace([' ', '-'], "_");
        match norm.as_str() {
            "implemented" => Some(Self::Implemented),
            "partially_implemented" | "partial" => Some(Self::PartiallyImplemented),
            "not_related" | "not_implemented" | "unrelated" => Some(Self::NotRelated),
            _ => None,
        }
    }
}

/// How a judgement's classification was obtained.
///
/// Anything other than `Model` means a backend failure was absorbed at the
/// judge boundary and the classification is `not_related`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JudgementOrigin {
    Model,
    Timeout,
    BackendError,
    Unparseable,
}

/// A single classification decision for one candidate chunk.
#[derive(Debug, Clone, Serialize)]
pub struct Judgement {
    pub classification: Classification,
    pub reason: String,
    pub chunk_id: String,
    pub doc_id: String,
    pub origin: JudgementOrigin,
}

impl Judgement {
    pub fn not_related(
        chunk: &CodeChunk,
        reason: impl Into<String>,
        origin: JudgementOrigin,
    ) -> Self {
        Self {
            classification: Classification::NotRelated,
            reason: reason.into(),
            chunk_id: chunk.chunk_id.clone(),
            doc_id: chunk.doc_id.clone(),
            origin,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverageStatus {
    Implemented,
    PartiallyImplemented,
    NotImplemented,
    Unknown,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverageKind {
    Fast,
    Semantic,
    Error,
}

/// Supporting evidence for a [`CoverageResult`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Evidence {
    Symbol {
        symbol: String,
        locations: Vec<SymbolLocation>,
    },
    Judgement(Judgement),
}

/// Coverage verdict for one requirement.
///
/// Built only through the constructors below so that the evidence always
/// matches the coverage kind.
#[derive(Debug, Clone, Serialize)]
pub struct CoverageResult {
    pub requirement_id: String,
    pub status: CoverageStatus,
    pub coverage_kind: CoverageKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<Evidence>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<CodeChunk>,
}

impl CoverageResult {
    /// Fast-path hit. `locations` must be non-empty.
    pub fn symbol_hit(requirement_id: &str, symbol: &str, locations: Vec<SymbolLocation>) -> Self {
        debug_assert!(!locations.is_empty());
        Self {
            requirement_id: requirement_id.to_string(),
            status: CoverageStatus::Implemented,
            coverage_kind: CoverageKind::Fast,
            evidence: Some(Evidence::Symbol {
                symbol: symbol.to_string(),
                locations,
            }),
            reason: None,
            candidates: Vec::new(),
        }
    }

    /// Fast-path verdict without a match (used when the semantic path is off).
    pub fn fast_miss(requirement_id: &str, status: CoverageStatus, reason: &str) -> Self {
        Self {
            requirement_id: requirement_id.to_string(),
            status,
            coverage_kind: CoverageKind::Fast,
            evidence: None,
            reason: Some(reason.to_string()),
            candidates: Vec::new(),
        }
    }

    /// Semantic-path verdict. The status is derived from the best judgement.
    pub fn semantic(
        requirement_id: &str,
        best: Option<Judgement>,
        reason: Option<String>,
        candidates: Vec<CodeChunk>,
    ) -> Self {
        let status = match best.as_ref().map(|j| j.classification) {
            Some(Classification::Implemented) => CoverageStatus::Implemented,
            Some(Classification::PartiallyImplemented) => CoverageStatus::PartiallyImplemented,
            _ => CoverageStatus::NotImplemented,
        };
        let reason = reason.or_else(|| best.as_ref().map(|j| j.reason.clone()));
        Self {
            requirement_id: requirement_id.to_string(),
            status,
            coverage_kind: CoverageKind::Semantic,
            evidence: best
                .filter(|j| j.classification != Classification::NotRelated)
                .map(Evidence::Judgement),
            reason,
            candidates,
        }
    }

    /// A requirement whose evaluation failed.
    pub fn error(requirement_id: &str, message: &str) -> Self {
        Self {
            requirement_id: requirement_id.to_string(),
            status: CoverageStatus::Error,
            coverage_kind: CoverageKind::Error,
            evidence: None,
            reason: Some(message.to_string()),
            candidates: Vec::new(),
        }
    }

    /// The best judgement, if this result came from the semantic path.
    pub fn best_judgement(&self) -> Option<&Judgement> {
        match &self.evidence {
            Some(Evidence::Judgement(j)) => Some(j),
            _ => None,
        }
    }
}

/// Per-status and per-kind counts for a report.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReportSummary {
    pub total: usize,
    pub implemented: usize,
    pub partially_implemented: usize,
    pub not_implemented: usize,
    pub unknown: usize,
    pub error: usize,
    pub resolved_fast: usize,
    pub resolved_semantic: usize,
}

impl ReportSummary {
    pub fn from_results(results: &[CoverageResult]) -> Self {
        let mut s = Self {
            total: results.len(),
            ..Default::default()
        };
        for r in results {
            match r.status {
                CoverageStatus::Implemented => s.implemented += 1,
                CoverageStatus::PartiallyImplemented => s.partially_implemented += 1,
                CoverageStatus::NotImplemented => s.not_implemented += 1,
                CoverageStatus::Unknown => s.unknown += 1,
                CoverageStatus::Error => s.error += 1,
            }
            match r.coverage_kind {
                CoverageKind::Fast => s.resolved_fast += 1,
                CoverageKind::Semantic => s.resolved_semantic += 1,
                CoverageKind::Error => {}
            }
        }
        s
    }
}

/// The persisted outcome of one batch run.
#[derive(Debug, Clone, Serialize)]
pub struct CoverageReport {
    pub report_id: String,
    pub generated_at: DateTime<Utc>,
    pub corpus_ids: Vec<String>,
    pub top_k: usize,
    pub summary: ReportSummary,
    pub results: Vec<CoverageResult>,
}
