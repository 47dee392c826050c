//! # Coverage Harness
//!
//! Requirement-to-implementation coverage evaluation over indexed source
//! code. Given structured design requirements and a chunked code corpus,
//! decide for each requirement whether it is implemented, partially
//! implemented, or not implemented, with supporting evidence.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌───────────────────┐   ┌─────────────┐
//! │ BatchRunner │──▶│ CoverageEvaluator │──▶│ SymbolIndex │  fast path
//! └──────┬──────┘   └─────────┬─────────┘   └─────────────┘
//!        │                    │ miss
//!        ▼                    ▼
//!  ┌────────────┐   ┌────────────────────┐   ┌───────┐
//!  │ ReportSink │   │ CandidateRetriever │──▶│ Judge │  semantic path
//!  └────────────┘   └────────────────────┘   └───────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! covctx init                                   # create database
//! covctx import corpus.json                     # load chunks
//! covctx symbols --corpus svc OrderService.place
//! covctx evaluate requirements.json --corpus svc
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`traits`] | Collaborator interfaces |
//! | [`symbols`] | Lexical symbol index (fast path) |
//! | [`retriever`] | Multi-query candidate retrieval |
//! | [`judge`] | Model-based candidate classification |
//! | [`cache`] | Shared coverage-result cache |
//! | [`evaluator`] | Per-requirement evaluation |
//! | [`batch`] | Batch runs and reports |
//! | [`store`] | In-memory and SQLite corpora |
//! | [`generation`] | Text-generation backends |
//! | [`embedding`] | Query embedding and vector helpers |
//! | [`report`] | Report sinks |

pub mod app;
pub mod batch;
pub mod cache;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod evaluator;
pub mod generation;
pub mod judge;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod report;
pub mod retriever;
pub mod store;
pub mod symbols;
pub mod traits;
