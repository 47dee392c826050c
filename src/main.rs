//! # Coverage Harness CLI (`covctx`)
//!
//! The `covctx` binary evaluates whether structured design requirements are
//! implemented in an indexed code corpus.
//!
//! ## Usage
//!
//! ```bash
//! covctx --config ./config/covctx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `covctx init` | Create the SQLite database and run schema migrations |
//! | `covctx import <export.json>` | Load a chunk export into the database |
//! | `covctx evaluate <requirements.json> --corpus ID` | Run a coverage batch |
//! | `covctx symbols --corpus ID [SYMBOL...]` | Inspect the symbol index |
//!
//! ## Examples
//!
//! ```bash
//! # Evaluate against the database, report into [report].dir
//! covctx evaluate reqs.json --corpus billing --corpus orders
//!
//! # Evaluate straight from an export, symbol lookups only, print to stdout
//! covctx evaluate reqs.json --corpus orders --chunks orders.json --fast-only --output -
//! ```

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use coverage_harness::app::runner_from_config;
use coverage_harness::batch::{load_requirements, BatchOutcome};
use coverage_harness::config::{self, Config, EvaluationMode};
use coverage_harness::generation::create_generator;
use coverage_harness::logging;
use coverage_harness::migrate;
use coverage_harness::models::Requirement;
use coverage_harness::report::{JsonReportSink, StdoutSink};
use coverage_harness::store::load_export;
use coverage_harness::store::memory::InMemoryCorpus;
use coverage_harness::store::sqlite::SqliteCorpus;
use coverage_harness::symbols::SymbolIndex;
use coverage_harness::traits::{ChunkLoader, ReportSink, SemanticSearch};

/// Coverage Harness CLI: requirement-to-implementation coverage over
/// indexed source code.
#[derive(Parser)]
#[command(
    name = "covctx",
    about = "Coverage Harness: decide which design requirements a codebase implements",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/covctx.toml")]
    config: PathBuf,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent; running it twice is safe.
    Init,

    /// Import a `{documents, chunks}` JSON export into the database.
    ///
    /// Replaces the stored chunks of every document the export names.
    Import {
        /// Path to the export file.
        export: PathBuf,
    },

    /// Evaluate a requirement batch and persist the coverage report.
    Evaluate {
        /// JSON file holding a requirement array or `{"requirements": [...]}`.
        requirements: PathBuf,

        /// Corpus (document) id to evaluate against. Repeatable.
        #[arg(long = "corpus", required = true)]
        corpus_ids: Vec<String>,

        /// Candidates kept per requirement. Defaults to `[retrieval].top_k`.
        #[arg(long)]
        top_k: Option<usize>,

        /// Resolve requirements by symbol lookup only.
        #[arg(long)]
        fast_only: bool,

        /// Read the corpus from a JSON export instead of the database.
        #[arg(long)]
        chunks: Option<PathBuf>,

        /// Report destination: a file path, or `-` for stdout.
        /// Defaults to a timestamped file under `[report].dir`.
        #[arg(long)]
        output: Option<String>,
    },

    /// Build the symbol index and look up symbols.
    ///
    /// With no symbols given, prints index statistics.
    Symbols {
        /// Corpus (document) id to index. Repeatable.
        #[arg(long = "corpus", required = true)]
        corpus_ids: Vec<String>,

        /// Read the corpus from a JSON export instead of the database.
        #[arg(long)]
        chunks: Option<PathBuf>,

        /// Symbols to look up, e.g. `OrderService.place_order`.
        symbols: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(cli.log_json);

    match cli.command {
        Commands::Init => {
            let cfg = config::load_config(&cli.config)?;
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Import { export } => {
            let cfg = config::load_config(&cli.config)?;
            let export = load_export(&export)?;
            let corpus = SqliteCorpus::connect(&cfg).await?;
            let stats = corpus.import(&export).await?;
            println!(
                "Imported {} documents, {} chunks, {} vectors.",
                stats.documents, stats.chunks, stats.vectors
            );
        }
        Commands::Evaluate {
            requirements,
            corpus_ids,
            top_k,
            fast_only,
            chunks,
            output,
        } => {
            let mut cfg = load_config_for(&cli.config, chunks.is_some())?;
            if fast_only {
                cfg.retrieval.mode = EvaluationMode::FastOnly;
            }
            let requirements = load_requirements(&requirements)?;
            let sink: Arc<dyn ReportSink> = match output.as_deref() {
                Some("-") => Arc::new(StdoutSink),
                Some(path) => Arc::new(JsonReportSink::at_file(path)),
                None => Arc::new(JsonReportSink::in_dir(&cfg.report.dir)),
            };
            let to_stdout = output.as_deref() == Some("-");

            let outcome = match chunks {
                Some(path) => {
                    let corpus = Arc::new(InMemoryCorpus::from_export(&load_export(&path)?));
                    evaluate(&cfg, corpus, sink, top_k, &corpus_ids, &requirements).await?
                }
                None => {
                    let corpus = Arc::new(SqliteCorpus::connect(&cfg).await?);
                    evaluate(&cfg, corpus, sink, top_k, &corpus_ids, &requirements).await?
                }
            };

            if !to_stdout {
                let s = &outcome.report.summary;
                println!("Report: {}", outcome.location);
                println!(
                    "{} requirements: {} implemented, {} partial, {} not implemented, {} unknown, {} error",
                    s.total,
                    s.implemented,
                    s.partially_implemented,
                    s.not_implemented,
                    s.unknown,
                    s.error
                );
                println!(
                    "Resolved by symbol: {}, by judge: {}",
                    s.resolved_fast, s.resolved_semantic
                );
            }
        }
        Commands::Symbols {
            corpus_ids,
            chunks,
            symbols,
        } => {
            let index = match chunks {
                Some(path) => {
                    let corpus = InMemoryCorpus::from_export(&load_export(&path)?);
                    SymbolIndex::build(&corpus, &corpus_ids).await
                }
                None => {
                    let cfg = config::load_config(&cli.config)?;
                    let corpus = SqliteCorpus::connect(&cfg).await?;
                    SymbolIndex::build(&corpus, &corpus_ids).await
                }
            };
            print_symbols(&index, &symbols);
        }
    }

    Ok(())
}

/// A missing config file is tolerated only when the corpus comes from `--chunks`.
fn load_config_for(path: &Path, have_chunks: bool) -> anyhow::Result<Config> {
    if have_chunks && !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok(Config::minimal());
    }
    config::load_config(path)
}

async fn evaluate<C>(
    cfg: &Config,
    corpus: Arc<C>,
    sink: Arc<dyn ReportSink>,
    top_k: Option<usize>,
    corpus_ids: &[String],
    requirements: &[Requirement],
) -> anyhow::Result<BatchOutcome>
where
    C: ChunkLoader + SemanticSearch + 'static,
{
    let generator = create_generator(&cfg.judge)?;
    let runner = runner_from_config(cfg, corpus, generator, sink, top_k);
    runner.run(corpus_ids, requirements).await
}

fn print_symbols(index: &SymbolIndex, symbols: &[String]) {
    for corpus_id in index.skipped() {
        eprintln!("warning: corpus {} could not be loaded", corpus_id);
    }
    if symbols.is_empty() {
        println!("{} symbols from {} chunks", index.len(), index.chunks_scanned());
        return;
    }
    for symbol in symbols {
        let locations = index.find(symbol);
        if locations.is_empty() {
            println!("{}: not found", symbol);
            continue;
        }
        println!("{}:", symbol);
        for loc in locations {
            println!("  {} ({})", loc.chunk_id, loc.doc_id);
        }
    }
}
