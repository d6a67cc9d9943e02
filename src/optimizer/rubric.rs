//! Rubric scoring of analysis responses.

use crate::prompts::{extract_section, SECTION_HEADERS};

/// Minimum characters a section needs to count as filled (more than ten).
pub const MIN_SECTION_CHARS: usize = 11;

/// Fraction of expected sections that are present with enough content.
///
/// Always in `[0, 1]`.
pub fn rubric_score(response: &str) -> f64 {
    let filled = SECTION_HEADERS
        .iter()
        .filter_map(|header| extract_section(response, header))
        .filter(|content| content.chars().count() >= MIN_SECTION_CHARS)
        .count();

    filled as f64 / SECTION_HEADERS.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_with(contents: &[&str]) -> String {
        SECTION_HEADERS
            .iter()
            .zip(contents)
            .map(|(header, content)| format!("{}\n{}\n\n", header, content))
            .collect()
    }

    #[test]
    fn test_full_response_scores_one() {
        let content = "x".repeat(MIN_SECTION_CHARS);
        let contents: Vec<&str> = vec![content.as_str(); 6];
        assert_eq!(rubric_score(&response_with(&contents)), 1.0);
    }

    #[test]
    fn test_empty_response_scores_zero() {
        assert_eq!(rubric_score(""), 0.0);
        assert_eq!(rubric_score("The model refused to answer."), 0.0);
    }

    #[test]
    fn test_short_sections_do_not_count() {
        let long = "A detailed explanation of the method";
        let response = response_with(&[long, long, long, "too short", long, "Yes"]);
        assert!((rubric_score(&response) - 4.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_headers_without_content_score_zero() {
        let response = SECTION_HEADERS.join("\n");
        assert_eq!(rubric_score(&response), 0.0);
    }

    #[test]
    fn test_score_is_bounded() {
        let long = "Sufficiently long section content";
        let doubled = format!(
            "{}{}",
            response_with(&[long; 6]),
            response_with(&[long; 6])
        );
        let score = rubric_score(&doubled);
        assert!((0.0..=1.0).contains(&score));
        assert_eq!(score, 1.0);
    }
}
