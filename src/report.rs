//! Report sinks.
//!
//! [`JsonReportSink`] writes one pretty-printed JSON file per report into a
//! directory and returns its path. [`StdoutSink`] prints the report for
//! piping and returns `"-"`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;

use crate::models::CoverageReport;
use crate::traits::ReportSink;

pub struct JsonReportSink {
    target: PathBuf,
    is_file: bool,
}

impl JsonReportSink {
    /// Write reports as `coverage-<corpora>-<timestamp>-<id>.json` under `dir`.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            target: dir.into(),
            is_file: false,
        }
    }

    /// Write every report to exactly `path`, overwriting it.
    pub fn at_file(path: impl Into<PathBuf>) -> Self {
        Self {
            target: path.into(),
            is_file: true,
        }
    }

    fn path_for(&self, report: &CoverageReport) -> PathBuf {
        if self.is_file {
            return self.target.clone();
        }
        let corpora: String = report
            .corpus_ids
            .join("+")
            .chars()
            .map(filename_char)
            .take(64)
            .collect();
        let id: String = report
            .report_id
            .chars()
            .filter(|c| *c != '-')
            .map(filename_char)
            .take(8)
            .collect();
        self.target.join(format!(
            "coverage-{}-{}-{}.json",
            corpora,
            report.generated_at.format("%Y%m%dT%H%M%S"),
            id
        ))
    }
}

fn filename_char(c: char) -> char {
    match c {
        c if c.is_alphanumeric() || c == '-' || c == '+' => c,
        _ => '_',
    }
}

#[async_trait]
impl ReportSink for JsonReportSink {
    async fn persist(&self, report: &CoverageReport) -> Result<String> {
        let path = self.path_for(report);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(report)?;
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("Failed to write report: {}", path.display()))?;
        Ok(path.display().to_string())
    }
}

pub struct StdoutSink;

#[async_trait]
impl ReportSink for StdoutSink {
    async fn persist(&self, report: &CoverageReport) -> Result<String> {
        println!("{}", serde_json::to_string_pretty(report)?);
        Ok("-".to_string())
    }
}
