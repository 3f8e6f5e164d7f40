//! Fuzzy matching of hover text and keyword scanning.

/// Lowercase and collapse runs of whitespace.
pub fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Similarity between the hover text an intent wants and what is shown.
///
/// Exact match (after normalization) scores 1.0. Hover text that contains
/// the expected text scores 0.8; the reverse does not, so a fragment such as
/// "Drop" never stands in for "Drop Logs". Otherwise the score is the share
/// of common words over the longer word set. Empty text on either side
/// scores 0.
pub fn hover_similarity(expected: &str, actual: &str) -> f64 {
    let (a, b) = (normalize(expected), normalize(actual));
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    if b.contains(&a) {
        return 0.8;
    }
    let a_words: std::collections::HashSet<&str> = a.split(' ').collect();
    let b_words: std::collections::HashSet<&str> = b.split(' ').collect();
    let common = a_words.intersection(&b_words).count();
    common as f64 / a_words.len().max(b_words.len()) as f64
}

pub fn hover_matches(expected: &str, actual: &str, threshold: f64) -> bool {
    hover_similarity(expected, actual) >= threshold
}

/// First keyword found (case-insensitively) in any of `lines`.
pub fn find_keyword<'k>(lines: &[String], keywords: &'k [String]) -> Option<&'k str> {
    let lowered: Vec<String> = lines.iter().map(|l| l.to_lowercase()).collect();
    keywords
        .iter()
        .filter(|k| !k.trim().is_empty())
        .find(|k| {
            let k = k.to_lowercase();
            lowered.iter().any(|l| l.contains(&k))
        })
        .map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn similarity_tiers() {
        assert_eq!(hover_similarity("Chop down Tree", "chop  down tree"), 1.0);
        assert_eq!(hover_similarity("Bank", "Bank Bank booth"), 0.8);
        assert_eq!(hover_similarity("Chop down Oak", "Chop down Tree"), 2.0 / 3.0);
        assert_eq!(hover_similarity("Chop down Tree", "Talk-to Guide"), 0.0);
        assert_eq!(hover_similarity("", "anything"), 0.0);
    }

    #[test]
    fn threshold_applies() {
        assert!(hover_matches("Open Bank", "Open Bank booth", 0.8));
        assert!(!hover_matches("Chop down Oak", "Chop down Tree", 0.8));
    }

    #[test]
    fn fragments_of_the_expected_text_do_not_match() {
        assert!(!hover_matches("Drop Logs", "o", 0.8));
        assert!(!hover_matches("Drop Logs", "Drop", 0.8));
        assert!(!hover_matches("Bank Bank booth", "Bank", 0.8));
        assert_eq!(hover_similarity("Drop Logs", "Drop"), 0.5);
        assert!(hover_matches("Drop Logs", "Drop Logs / 3 more options", 0.8));
    }

    #[test]
    fn keyword_scan_is_case_insensitive() {
        let chat = vec!["Bob wishes to TRADE with you.".to_string()];
        let keywords = vec!["duel".to_string(), "trade".to_string()];
        assert_eq!(find_keyword(&chat, &keywords), Some("trade"));
        assert_eq!(find_keyword(&[], &keywords), None);
        assert_eq!(find_keyword(&chat, &["".to_string()]), None);
    }
}
