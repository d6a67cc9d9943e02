//! Markdown report generation.
//!
//! This module renders a literature review from the stored papers and
//! their aggregate statistics.

use crate::models::{LiteratureReport, PaperRecord, PaperStatistics, ReportMetadata};
use anyhow::Result;
use std::collections::BTreeMap;

/// Widest bar in a text chart.
const CHART_WIDTH: usize = 40;

/// Authors listed before "et al.".
const MAX_AUTHORS: usize = 3;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &LiteratureReport, charts: bool) -> String {
    let mut output = String::new();

    // Title
    output.push_str(&format!("# {} Literature Review\n\n", report.metadata.domain));

    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_table_of_contents());
    output.push_str(&generate_summary_section(&report.statistics));
    output.push_str(&generate_trends_section(&report.statistics, charts));
    output.push_str(&generate_papers_section(&report.papers));
    output.push_str(&generate_references_section(&report.papers));
    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Report Information\n\n");
    section.push_str(&format!("- **Research Domain:** {}\n", metadata.domain));
    section.push_str(&format!(
        "- **Time Range:** {}-{}\n",
        metadata.start_year, metadata.end_year
    ));
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Model Used:** `{}`\n", metadata.model_used));
    section.push_str(&format!("- **Total Papers:** {}\n", metadata.total_papers));
    section.push('\n');

    section
}

fn generate_table_of_contents() -> String {
    let mut toc = String::new();

    toc.push_str("## Table of Contents\n\n");
    toc.push_str("- [Report Information](#report-information)\n");
    toc.push_str("- [Summary](#summary)\n");
    toc.push_str("- [Research Trends](#research-trends)\n");
    toc.push_str("- [Paper Analyses](#paper-analyses)\n");
    toc.push_str("- [References](#references)\n");
    toc.push('\n');

    toc
}

/// Generate the summary section.
fn generate_summary_section(stats: &PaperStatistics) -> String {
    let mut section = String::new();

    section.push_str("## Summary\n\n");
    section.push_str("| Papers | With PDF | Analyzed | Open Source | Avg. Citations |\n");
    section.push_str("|:---:|:---:|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| {} | {} | {} | {} | {:.2} |\n\n",
        stats.total_papers,
        stats.with_pdf,
        stats.with_analysis,
        stats.open_source,
        stats.average_citations
    ));

    section
}

/// Generate the yearly and per-source distribution section.
fn generate_trends_section(stats: &PaperStatistics, charts: bool) -> String {
    let mut section = String::new();

    section.push_str("## Research Trends\n\n");

    section.push_str("### Papers by Year\n\n");
    if stats.yearly_distribution.is_empty() {
        section.push_str("No publication years recorded.\n\n");
    } else {
        section.push_str("| Year | Papers |\n");
        section.push_str("|:---|:---:|\n");
        for (year, count) in &stats.yearly_distribution {
            section.push_str(&format!("| {} | {} |\n", year, count));
        }
        section.push('\n');

        if charts {
            let labeled: BTreeMap<String, usize> = stats
                .yearly_distribution
                .iter()
                .map(|(year, count)| (year.to_string(), *count))
                .collect();
            section.push_str(&bar_chart(&labeled));
        }
    }

    if !stats.source_distribution.is_empty() {
        section.push_str("### Papers by Source\n\n");
        section.push_str("| Source | Papers |\n");
        section.push_str("|:---|:---:|\n");

        let mut sources: Vec<_> = stats.source_distribution.iter().collect();
        sources.sort_by_key(|(_, count)| std::cmp::Reverse(**count));

        for (source, count) in sources {
            section.push_str(&format!("| {} | {} |\n", source, count));
        }
        section.push('\n');

        if charts {
            section.push_str(&bar_chart(&stats.source_distribution));
        }
    }

    section
}

/// Horizontal text bar chart, scaled to the largest value.
fn bar_chart(values: &BTreeMap<String, usize>) -> String {
    let max = values.values().copied().max().unwrap_or(0).max(1);
    let label_width = values.keys().map(|k| k.chars().count()).max().unwrap_or(0);

    let mut chart = String::from("```text\n");
    for (label, count) in values {
        let width = (count * CHART_WIDTH).div_ceil(max);
        chart.push_str(&format!(
            "{:<lw$} | {} {}\n",
            label,
            "█".repeat(width),
            count,
            lw = label_width
        ));
    }
    chart.push_str("```\n\n");
    chart
}

/// Generate the per-paper analysis section.
fn generate_papers_section(papers: &[PaperRecord]) -> String {
    let mut section = String::new();

    section.push_str("## Paper Analyses\n\n");

    let analyzed: Vec<_> = papers
        .iter()
        .filter(|p| p.item.analysis.as_ref().is_some_and(|a| a.has_content()))
        .collect();

    if analyzed.is_empty() {
        section.push_str("No analyzed papers yet.\n\n");
        return section;
    }

    for paper in analyzed {
        section.push_str(&generate_paper_block(paper));
    }

    section
}

/// Generate a single paper block.
fn generate_paper_block(paper: &PaperRecord) -> String {
    let item = &paper.item;
    let mut block = String::new();

    block.push_str(&format!("### {}\n\n", item.title));

    let year = item
        .publish_year
        .map(|y| y.to_string())
        .unwrap_or_else(|| "n.d.".to_string());
    block.push_str(&format!(
        "*{} | {} | {}*\n\n",
        format_authors(&item.authors),
        year,
        item.source
    ));

    if let Some(ref url) = item.html_url {
        block.push_str(&format!("**Link:** <{}>\n\n", url));
    }

    let Some(ref analysis) = item.analysis else {
        return block;
    };

    let fields = [
        ("Research Problem", &analysis.research_problem),
        ("Proposed Method", &analysis.method_summary),
        ("Key Techniques", &analysis.innovation),
        ("Experimental Results", &analysis.experimental_results),
        ("Limitations", &analysis.limitations),
    ];
    for (label, value) in fields {
        if !value.trim().is_empty() {
            block.push_str(&format!("**{}:** {}\n\n", label, value.trim()));
        }
    }

    let open_source = match analysis.is_open_source {
        Some(true) => "Yes",
        Some(false) => "No",
        None => "Unknown",
    };
    block.push_str(&format!("**Open Source:** {}\n\n", open_source));
    block.push_str("---\n\n");

    block
}

fn format_authors(authors: &[String]) -> String {
    match authors.len() {
        0 => "Unknown authors".to_string(),
        n if n <= MAX_AUTHORS => authors.join(", "),
        _ => format!("{} et al.", authors[..MAX_AUTHORS].join(", ")),
    }
}

fn generate_references_section(papers: &[PaperRecord]) -> String {
    let mut section = String::new();

    section.push_str("## References\n\n");
    for (i, paper) in papers.iter().enumerate() {
        let item = &paper.item;
        let year = item
            .publish_year
            .map(|y| format!(" ({})", y))
            .unwrap_or_default();
        section.push_str(&format!(
            "{}. {}. *{}*{}",
            i + 1,
            format_authors(&item.authors),
            item.title,
            year
        ));
        if let Some(ref id) = item.arxiv_id {
            section.push_str(&format!(". arXiv:{}", id));
        } else if let Some(ref doi) = item.doi {
            section.push_str(&format!(". doi:{}", doi));
        }
        section.push('\n');
    }
    section.push('\n');

    section
}

/// Generate the report footer.
fn generate_footer() -> String {
    format!(
        "---\n\n*Report generated by litscout v{}*\n",
        env!("CARGO_PKG_VERSION")
    )
}

/// Generate a JSON report.
pub fn generate_json_report(report: &LiteratureReport) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}
