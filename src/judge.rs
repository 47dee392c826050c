//! Model-based classification of one candidate chunk.
//!
//! [`Judge`] is the only place that talks to a [`TextGenerator`]. Every
//! failure mode is absorbed into a valid [`Judgement`] whose
//! [`JudgementOrigin`] records what happened:
//!
//! | Outcome | Classification | Reason | Origin |
//! |---------|----------------|--------|--------|
//! | model answered | parsed | parsed | `model` |
//! | deadline hit | `not_related` | `"timeout"` | `timeout` |
//! | backend error | `not_related` | short error summary | `backend_error` |
//! | unparseable body | `not_related` | `"could not parse response"` | `unparseable` |

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::JudgeConfig;
use crate::models::{Classification, CodeChunk, Judgement, JudgementOrigin, Requirement};
use crate::traits::TextGenerator;

const SYSTEM_PROMPT: &str = "You review source code against design requirements. \
Decide whether the code excerpt implements the requirement. \
Answer with a JSON object only: \
{\"classification\": \"implemented\" | \"partially_implemented\" | \"not_related\", \
\"reason\": \"<one sentence>\"}";

pub const TRUNCATION_MARKER: &str = "\n... [truncated]";
const MAX_ERROR_SUMMARY: usize = 200;

/// Anything that can classify a candidate for the evaluator.
///
/// [`Judge`] never returns `Err`; the `Result` exists so the evaluator can
/// contain failures from other implementations.
#[async_trait]
pub trait CandidateJudge: Send + Sync {
    async fn judge(&self, req: &Requirement, candidate: &CodeChunk) -> Result<Judgement>;
}

/// Judges candidates with a text generator under a per-call timeout.
#[derive(Clone)]
pub struct Judge {
    generator: Arc<dyn TextGenerator>,
    timeout: Duration,
    temperature: f32,
    max_content_chars: usize,
}

impl Judge {
    pub fn new(generator: Arc<dyn TextGenerator>, config: &JudgeConfig) -> Self {
        Self {
            generator,
            timeout: Duration::from_secs(config.timeout_secs),
            temperature: config.temperature,
            max_content_chars: config.max_content_chars,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Classify `candidate` against `req`. Never fails.
    pub async fn classify(&self, req: &Requirement, candidate: &CodeChunk) -> Judgement {
        let prompt = build_prompt(req, candidate, self.max_content_chars);
        let call = self.generator.generate(&prompt, SYSTEM_PROMPT, self.temperature);

        let judgement = match tokio::time::timeout(self.timeout, call).await {
            Err(_) => Judgement::not_related(candidate, "timeout", JudgementOrigin::Timeout),
            Ok(Err(e)) => Judgement::not_related(
                candidate,
                summarize_error(&e),
                JudgementOrigin::BackendError,
            ),
            Ok(Ok(body)) => match parse_response(&body) {
                Some((classification, reason)) => Judgement {
                    classification,
                    reason,
                    chunk_id: candidate.chunk_id.clone(),
                    doc_id: candidate.doc_id.clone(),
                    origin: JudgementOrigin::Model,
                },
                None => Judgement::not_related(
                    candidate,
                    "could not parse response",
                    JudgementOrigin::Unparseable,
                ),
            },
        };

        tracing::debug!(
            requirement_id = %req.id,
            chunk_id = %candidate.chunk_id,
            model = self.generator.model_name(),
            classification = ?judgement.classification,
            origin = ?judgement.origin,
            "candidate judged"
        );
        judgement
    }
}

#[async_trait]
impl CandidateJudge for Judge {
    async fn judge(&self, req: &Requirement, candidate: &CodeChunk) -> Result<Judgement> {
        Ok(self.classify(req, candidate).await)
    }
}

/// Build the user prompt, truncating candidate content to `max_chars`.
pub fn build_prompt(req: &Requirement, candidate: &CodeChunk, max_chars: usize) -> String {
    let content = truncate_chars(&candidate.content, max_chars);
    format!(
        "Requirement:\n{}\n\nCode excerpt (from {}):\n{}\n\nDoes the code implement the requirement?",
        req.judge_text(),
        candidate.doc_id,
        content
    )
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}{}", &text[..byte_idx], TRUNCATION_MARKER),
        None => text.to_string(),
    }
}

fn summarize_error(e: &anyhow::Error) -> String {
    let msg = e.to_string();
    let first_line = msg.lines().next().unwrap_or("backend error");
    first_line.chars().take(MAX_ERROR_SUMMARY).collect()
}

#[derive(Deserialize)]
struct RawVerdict {
    classification: String,
    #[serde(default)]
    reason: String,
}

/// Parse a model response into a classification and reason.
///
/// Accepts bare JSON or JSON wrapped in a fenced code block.
pub fn parse_response(body: &str) -> Option<(Classification, String)> {
    let json = unwrap_code_fence(body);
    let raw: RawVerdict = serde_json::from_str(json).ok()?;
    let classification = Classification::parse(&raw.classification)?;
    Some((classification, raw.reason.trim().to_string()))
}

fn unwrap_code_fence(body: &str) -> &str {
    let trimmed = body.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. `json`) on the opening fence line.
    let rest = match rest.find('\n') {
        Some(i) => &rest[i + 1..],
        None => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}
