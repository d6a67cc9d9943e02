//! Report synthesis.
//!
//! [`MarkdownReporter`] reads every stored paper, renders the review in
//! the configured format and writes it to the report directory.

pub mod generator;

pub use generator::{generate_json_report, generate_markdown_report};

use crate::config::ReportFormat;
use crate::error::Fault;
use crate::models::{LiteratureReport, ReportMetadata};
use crate::pipeline::collaborators::Reporter;
use crate::store::SqliteStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// What to report on and where to write it.
#[derive(Debug, Clone)]
pub struct ReportSettings {
    pub output_dir: PathBuf,
    pub format: ReportFormat,
    pub generate_charts: bool,
    pub domain: String,
    pub start_year: i32,
    pub end_year: i32,
    pub model_used: String,
}

/// Writes a literature review built from the paper store.
pub struct MarkdownReporter {
    store: Arc<SqliteStore>,
    settings: ReportSettings,
}

impl MarkdownReporter {
    pub fn new(store: Arc<SqliteStore>, settings: ReportSettings) -> Self {
        Self { store, settings }
    }

    fn render(&self, report: &LiteratureReport) -> Result<String, Fault> {
        match self.settings.format {
            ReportFormat::Markdown => Ok(generate_markdown_report(
                report,
                self.settings.generate_charts,
            )),
            ReportFormat::Json => generate_json_report(report)
                .map_err(|e| Fault::item(format!("failed to serialize report: {}", e))),
        }
    }
}

#[async_trait]
impl Reporter for MarkdownReporter {
    async fn synthesize(&self) -> Result<Option<PathBuf>, Fault> {
        let (papers, statistics) = self.store.snapshot().await?;
        if papers.is_empty() {
            warn!("No papers stored, skipping report");
            return Ok(None);
        }

        let generated_at = Utc::now();
        let report = LiteratureReport {
            metadata: ReportMetadata {
                domain: self.settings.domain.clone(),
                start_year: self.settings.start_year,
                end_year: self.settings.end_year,
                generated_at,
                model_used: self.settings.model_used.clone(),
                total_papers: papers.len(),
            },
            statistics,
            papers,
        };
        let content = self.render(&report)?;

        tokio::fs::create_dir_all(&self.settings.output_dir)
            .await
            .map_err(|e| {
                Fault::unavailable(format!(
                    "cannot create report directory {}: {}",
                    self.settings.output_dir.display(),
                    e
                ))
            })?;

        let path = self
            .settings
            .output_dir
            .join(report_file_name(&self.settings, generated_at));
        tokio::fs::write(&path, content).await.map_err(|e| {
            Fault::unavailable(format!("failed to write {}: {}", path.display(), e))
        })?;

        info!(
            "Report covers {} papers: {}",
            report.metadata.total_papers,
            path.display()
        );
        Ok(Some(path))
    }
}

/// `<domain>_<start>-<end>_<timestamp>.<ext>`
fn report_file_name(settings: &ReportSettings, at: DateTime<Utc>) -> String {
    let domain: String = settings
        .domain
        .trim()
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .filter(|c| c.is_alphanumeric() || matches!(c, '_' | '-'))
        .collect();
    let domain = if domain.is_empty() {
        "report".to_string()
    } else {
        domain
    };

    format!(
        "{}_{}-{}_{}.{}",
        domain,
        settings.start_year,
        settings.end_year,
        at.format("%Y%m%d_%H%M%S"),
        settings.format.extension()
    )
}
