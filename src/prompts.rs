//! Prompt templates and structured-response helpers.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{info, warn};

/// Placeholder replaced with the paper text.
pub const TEXT_PLACEHOLDER: &str = "{extracted_text}";

/// Upper bound on paper text substituted into an analysis prompt.
pub const MAX_ANALYSIS_CHARS: usize = 80_000;

/// Upper bound on paper text used while scoring prompt candidates.
pub const MAX_EVALUATION_CHARS: usize = 2_000;

/// Section headers an analysis response is expected to contain, in order.
pub const SECTION_HEADERS: [&str; 6] = [
    "[Research Problem]:",
    "[Proposed Method]:",
    "[Key Techniques]:",
    "[Experimental Results]:",
    "[Limitations]:",
    "[Open Source]:",
];

/// Built-in analysis prompt.
pub const DEFAULT_ANALYSIS_PROMPT: &str = r#"You are a senior researcher. Read the full text of the paper below and answer in exactly this format:

[Research Problem]:
[Proposed Method]:
[Key Techniques]:
[Experimental Results]:
[Limitations]:
[Open Source]:

Paper content:
{extracted_text}
"#;

/// Load the analysis prompt template, falling back to the built-in one.
///
/// A template without the text placeholder is rejected, since every
/// analysis would then ignore the paper.
pub fn load_analysis_template(path: Option<&Path>) -> Result<String> {
    let Some(path) = path else {
        return Ok(DEFAULT_ANALYSIS_PROMPT.to_string());
    };

    let template = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read prompt template: {}", path.display()))?;

    if !template.contains(TEXT_PLACEHOLDER) {
        warn!(
            "Prompt template {} has no {} placeholder, using built-in prompt",
            path.display(),
            TEXT_PLACEHOLDER
        );
        return Ok(DEFAULT_ANALYSIS_PROMPT.to_string());
    }

    info!("Loaded prompt template from {}", path.display());
    Ok(template)
}

/// Substitute `text` for the placeholder in `template`.
pub fn render(template: &str, text: &str) -> String {
    template.replace(TEXT_PLACEHOLDER, text)
}

/// The first `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Meta-instruction asking the proposer to rewrite `current`.
pub fn optimization_prompt(current: &str, domain: &str, keywords: &[String]) -> String {
    let focus = if keywords.is_empty() {
        domain.to_string()
    } else {
        keywords.join(", ")
    };

    format!(
        r#"You are a prompt optimization expert. Based on the current prompt below, produce an improved version that is better suited to analysing papers about "{domain}".

Current prompt:
{current}

Requirements:
1. Keep the original structure and format, including every section header.
2. Sharpen the attention paid to {focus}.
3. Improve the accuracy and completeness of the extracted information.
4. Keep the prompt clear and easy for an LLM to follow.
5. Keep the {placeholder} placeholder where the paper text goes.

Output only the complete improved prompt, without any explanation or commentary."#,
        domain = domain,
        current = current,
        focus = focus,
        placeholder = TEXT_PLACEHOLDER,
    )
}

/// Content following `header`, up to the next known section header.
pub fn extract_section<'a>(response: &'a str, header: &str) -> Option<&'a str> {
    let start = response.find(header)? + header.len();
    let rest = &response[start..];

    let end = SECTION_HEADERS
        .iter()
        .filter(|other| **other != header)
        .filter_map(|other| rest.find(other))
        .min()
        .unwrap_or(rest.len());

    Some(rest[..end].trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_prompt_has_all_sections() {
        for header in SECTION_HEADERS {
            assert!(DEFAULT_ANALYSIS_PROMPT.contains(header));
        }
        assert!(DEFAULT_ANALYSIS_PROMPT.contains(TEXT_PLACEHOLDER));
    }

    #[test]
    fn test_render_replaces_placeholder() {
        let prompt = render("Read: {extracted_text}!", "paper body");
        assert_eq!(prompt, "Read: paper body!");
    }

    #[test]
    fn test_truncate_chars_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn test_extract_section_stops_at_next_header() {
        let response = "[Research Problem]: skills\n[Proposed Method]:  a framework \n";
        assert_eq!(
            extract_section(response, "[Research Problem]:"),
            Some("skills")
        );
        assert_eq!(
            extract_section(response, "[Proposed Method]:"),
            Some("a framework")
        );
        assert_eq!(extract_section(response, "[Limitations]:"), None);
    }

    #[test]
    fn test_optimization_prompt_mentions_focus() {
        let prompt = optimization_prompt(
            "old prompt",
            "skill evolution",
            &["reinforcement learning".to_string()],
        );
        assert!(prompt.contains("old prompt"));
        assert!(prompt.contains("skill evolution"));
        assert!(prompt.contains("reinforcement learning"));
        assert!(prompt.contains(TEXT_PLACEHOLDER));
    }

    #[test]
    fn test_template_without_placeholder_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompt.txt");
        std::fs::write(&path, "no placeholder here").unwrap();
        let template = load_analysis_template(Some(&path)).unwrap();
        assert_eq!(template, DEFAULT_ANALYSIS_PROMPT);

        std::fs::write(&path, "Custom: {extracted_text}").unwrap();
        let template = load_analysis_template(Some(&path)).unwrap();
        assert_eq!(template, "Custom: {extracted_text}");
    }
}
