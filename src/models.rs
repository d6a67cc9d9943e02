//! Data models for the literature pipeline.
//!
//! This module contains the records that flow through the pipeline,
//! the per-run bookkeeping, and the read models used by reporting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// One step of the pipeline funnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Acquire,
    Dedup,
    Retrieve,
    Extract,
    Analyze,
    Persist,
    Synthesize,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Acquire => "acquire",
            Stage::Dedup => "dedup",
            Stage::Retrieve => "retrieve",
            Stage::Extract => "extract",
            Stage::Analyze => "analyze",
            Stage::Persist => "persist",
            Stage::Synthesize => "synthesize",
        };
        f.write_str(name)
    }
}

/// Structured fields produced by the analysis collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisFields {
    pub research_problem: String,
    pub method_summary: String,
    /// Key techniques / innovation.
    pub innovation: String,
    pub experimental_results: String,
    pub limitations: String,
    /// `None` when the response did not say either way.
    pub is_open_source: Option<bool>,
}

impl AnalysisFields {
    /// True when at least one text field carries content.
    pub fn has_content(&self) -> bool {
        [
            &self.research_problem,
            &self.method_summary,
            &self.innovation,
            &self.experimental_results,
            &self.limitations,
        ]
        .iter()
        .any(|field| !field.trim().is_empty())
    }
}

/// A candidate research record flowing through the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Title, required for identity.
    pub title: String,
    pub authors: Vec<String>,
    #[serde(rename = "abstract")]
    pub summary: String,
    pub publish_year: Option<i32>,
    /// Source tag, e.g. "arXiv".
    pub source: String,

    // Source-specific identifiers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arxiv_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_url: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub citations: Option<u32>,

    // Populated as the item advances.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_path: Option<PathBuf>,
    #[serde(skip)]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AnalysisFields>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analyzed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
}

impl WorkItem {
    /// Creates an item with just a title and source tag.
    pub fn new(title: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            source: source.into(),
            ..Self::default()
        }
    }
}

/// Input and output sizes of one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCount {
    pub stage: Stage,
    pub input: usize,
    pub output: usize,
}

impl StageCount {
    /// Number of items lost at this stage.
    pub fn dropped(&self) -> usize {
        self.input.saturating_sub(self.output)
    }
}

/// The outcome of one orchestrator invocation.
///
/// Built by the orchestrator while the run executes and handed out only
/// once finalized, so callers never see a half-finished run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub run_id: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stages: Vec<StageCount>,
    pub success: bool,
    pub persisted: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl PipelineRun {
    /// Counts for a single stage, if it executed.
    pub fn stage(&self, stage: Stage) -> Option<&StageCount> {
        self.stages.iter().find(|count| count.stage == stage)
    }

    /// Wall-clock duration of the run in seconds.
    pub fn duration_seconds(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}

/// A persisted paper as read back from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperRecord {
    pub id: i64,
    #[serde(flatten)]
    pub item: WorkItem,
    pub created_at: DateTime<Utc>,
}

/// Aggregate statistics over the stored papers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaperStatistics {
    pub total_papers: usize,
    pub with_pdf: usize,
    pub with_analysis: usize,
    pub open_source: usize,
    pub average_citations: f64,
    /// Papers per publish year; unknown years are left out.
    pub yearly_distribution: BTreeMap<i32, usize>,
    pub source_distribution: BTreeMap<String, usize>,
}

impl PaperStatistics {
    /// Computes statistics from a set of records.
    pub fn from_records(records: &[PaperRecord]) -> Self {
        let mut stats = Self {
            total_papers: records.len(),
            ..Self::default()
        };

        let mut citation_sum = 0u64;
        let mut cited = 0usize;

        for record in records {
            let item = &record.item;
            if item.pdf_path.is_some() {
                stats.with_pdf += 1;
            }
            if let Some(ref analysis) = item.analysis {
                if analysis.has_content() {
                    stats.with_analysis += 1;
                }
                if analysis.is_open_source == Some(true) {
                    stats.open_source += 1;
                }
            }
            if let Some(citations) = item.citations {
                citation_sum += u64::from(citations);
                cited += 1;
            }
            if let Some(year) = item.publish_year {
                *stats.yearly_distribution.entry(year).or_insert(0) += 1;
            }
            *stats
                .source_distribution
                .entry(item.source.clone())
                .or_insert(0) += 1;
        }

        if cited > 0 {
            stats.average_citations =
                ((citation_sum as f64 / cited as f64) * 100.0).round() / 100.0;
        }

        stats
    }
}

/// Metadata about a generated report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Research domain the report covers.
    pub domain: String,
    pub start_year: i32,
    pub end_year: i32,
    /// When the report was generated.
    pub generated_at: DateTime<Utc>,
    /// Model used for the per-paper analyses.
    pub model_used: String,
    pub total_papers: usize,
}

/// A literature report over every stored paper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiteratureReport {
    pub metadata: ReportMetadata,
    pub statistics: PaperStatistics,
    pub papers: Vec<PaperRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: i64, year: Option<i32>, source: &str, open: Option<bool>) -> PaperRecord {
        let mut item = WorkItem::new(format!("Paper {}", id), source);
        item.publish_year = year;
        item.analysis = Some(AnalysisFields {
            research_problem: "How do skills evolve?".to_string(),
            is_open_source: open,
            ..AnalysisFields::default()
        });
        PaperRecord {
            id,
            item,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::Acquire.to_string(), "acquire");
        assert_eq!(Stage::Synthesize.to_string(), "synthesize");
    }

    #[test]
    fn test_stage_count_dropped() {
        let count = StageCount {
            stage: Stage::Retrieve,
            input: 5,
            output: 3,
        };
        assert_eq!(count.dropped(), 2);
    }

    #[test]
    fn test_analysis_has_content() {
        assert!(!AnalysisFields::default().has_content());
        let fields = AnalysisFields {
            limitations: "Needs a lot of compute".to_string(),
            ..AnalysisFields::default()
        };
        assert!(fields.has_content());
    }

    #[test]
    fn test_statistics_from_records() {
        let mut cited = record(3, Some(2024), "arXiv", None);
        cited.item.citations = Some(7);
        let records = vec![
            record(1, Some(2023), "arXiv", Some(true)),
            record(2, Some(2024), "arXiv", Some(false)),
            cited,
            record(4, None, "Google Scholar", Some(true)),
        ];

        let stats = PaperStatistics::from_records(&records);
        assert_eq!(stats.total_papers, 4);
        assert_eq!(stats.with_analysis, 4);
        assert_eq!(stats.open_source, 2);
        assert_eq!(stats.average_citations, 7.0);
        assert_eq!(stats.yearly_distribution.get(&2024), Some(&2));
        assert_eq!(stats.yearly_distribution.len(), 2);
        assert_eq!(stats.source_distribution.get("arXiv"), Some(&3));
    }

    #[test]
    fn test_abstract_field_name() {
        let mut item = WorkItem::new("A", "arXiv");
        item.summary = "We study things".to_string();
        let json = serde_json::to_string(&item).unwrap();
        assert!(json.contains("\"abstract\":\"We study things\""));
    }
}
