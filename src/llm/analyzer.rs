//! Structured paper analysis on top of a [`Generator`].

use crate::error::Fault;
use crate::models::AnalysisFields;
use crate::pipeline::collaborators::{Analyzer, Generator};
use crate::prompts::{self, extract_section, MAX_ANALYSIS_CHARS};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Fills the analysis prompt with paper text and parses the sectioned answer.
pub struct LlmAnalyzer {
    generator: Arc<dyn Generator>,
}

impl LlmAnalyzer {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Analyzer for LlmAnalyzer {
    async fn analyze(&self, text: &str, prompt: &str) -> Result<Option<AnalysisFields>, Fault> {
        let text = prompts::truncate_chars(text, MAX_ANALYSIS_CHARS);
        let response = self.generator.generate(&prompts::render(prompt, text)).await?;
        debug!("Analysis response: {} chars", response.len());
        Ok(parse_analysis(&response))
    }
}

/// Parse a sectioned response. `None` when no section has content.
pub fn parse_analysis(response: &str) -> Option<AnalysisFields> {
    let section = |header: &str| {
        extract_section(response, header)
            .unwrap_or_default()
            .to_string()
    };

    let fields = AnalysisFields {
        research_problem: section("[Research Problem]:"),
        method_summary: section("[Proposed Method]:"),
        innovation: section("[Key Techniques]:"),
        experimental_results: section("[Experimental Results]:"),
        limitations: section("[Limitations]:"),
        is_open_source: extract_section(response, "[Open Source]:").and_then(parse_open_source),
    };

    if fields.has_content() || fields.is_open_source.is_some() {
        Some(fields)
    } else {
        None
    }
}

/// Answers that say nothing either way.
const UNKNOWN_ANSWERS: [&str; 6] = [
    "not mentioned",
    "not specified",
    "not stated",
    "unknown",
    "unclear",
    "n/a",
];

/// Negated phrasings that would otherwise read as a yes.
const NEGATED_ANSWERS: [&str; 4] = [
    "not open source",
    "not open-source",
    "not released",
    "not publicly available",
];

fn parse_open_source(answer: &str) -> Option<bool> {
    let answer = answer.trim().to_lowercase();
    if answer.is_empty() || UNKNOWN_ANSWERS.iter().any(|p| answer.contains(p)) {
        return None;
    }
    if NEGATED_ANSWERS.iter().any(|p| answer.contains(p)) {
        return Some(false);
    }

    match leading_word(&answer) {
        "yes" | "true" => return Some(true),
        "no" | "false" => return Some(false),
        _ => {}
    }

    if ["open source", "open-source", "github.com", "true"]
        .iter()
        .any(|p| answer.contains(p))
    {
        Some(true)
    } else if ["closed", "false", "proprietary"]
        .iter()
        .any(|p| answer.contains(p))
    {
        Some(false)
    } else {
        None
    }
}

fn leading_word(answer: &str) -> &str {
    answer
        .split(|c: char| !c.is_alphanumeric())
        .next()
        .unwrap_or_default()
}
