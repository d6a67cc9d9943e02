//! Title-based deduplication.

use crate::models::WorkItem;
use std::collections::HashSet;

/// Normalize a title for identity comparison (trimmed, lower-cased).
pub fn normalize_title(title: &str) -> String {
    title.trim().to_lowercase()
}

/// Drop items whose normalized title was already seen, keeping the first
/// occurrence and the original order.
///
/// Items with an empty or whitespace-only title are always kept; they carry
/// no identity to compare against.
pub fn dedup_by_title(items: Vec<WorkItem>) -> Vec<WorkItem> {
    let mut seen: HashSet<String> = HashSet::with_capacity(items.len());

    items
        .into_iter()
        .filter(|item| {
            let key = normalize_title(&item.title);
            key.is_empty() || seen.insert(key)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn titles(items: &[WorkItem]) -> Vec<&str> {
        items.iter().map(|i| i.title.as_str()).collect()
    }

    fn items(titles: &[&str]) -> Vec<WorkItem> {
        titles.iter().map(|t| WorkItem::new(*t, "test")).collect()
    }

    #[test]
    fn test_normalize_title() {
        assert_eq!(normalize_title("  Skill Evolution\n"), "skill evolution");
        assert_eq!(normalize_title("   "), "");
    }

    #[test]
    fn test_keeps_first_occurrence_in_order() {
        let input = items(&["Alpha", "beta", "  ALPHA ", "Gamma", "Beta"]);
        let output = dedup_by_title(input);
        assert_eq!(titles(&output), vec!["Alpha", "beta", "Gamma"]);
    }

    #[test]
    fn test_blank_titles_always_kept() {
        let input = items(&["", "  ", "Alpha", "", "alpha"]);
        let output = dedup_by_title(input);
        assert_eq!(titles(&output), vec!["", "  ", "Alpha", ""]);
    }

    #[test]
    fn test_empty_input() {
        assert!(dedup_by_title(Vec::new()).is_empty());
    }

    #[test]
    fn test_output_is_ordered_subsequence_without_duplicates() {
        let input = items(&["c", "a", "C", "b", "a", " b", "d", "", "c"]);
        let output = dedup_by_title(input.clone());

        // Subsequence: every output item appears in the input after the previous one.
        let mut cursor = 0;
        for item in &output {
            let pos = input[cursor..]
                .iter()
                .position(|candidate| candidate.title == item.title)
                .expect("output item missing from input");
            cursor += pos + 1;
        }

        let keys: Vec<String> = output
            .iter()
            .map(|i| normalize_title(&i.title))
            .filter(|k| !k.is_empty())
            .collect();
        let unique: HashSet<&String> = keys.iter().collect();
        assert_eq!(keys.len(), unique.len());
        assert_eq!(titles(&output), vec!["c", "a", "b", "d", ""]);
    }
}
