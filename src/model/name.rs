//! Genealogy name parsing and normalization.
//!
//! GEDCOM names carry the surname between slashes ("John /Smith/"); plain
//! names fall back to a last-word-is-surname heuristic. Normalized forms and
//! token sets drive duplicate blocking and scoring.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Parsed name components.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedName {
    pub given: Vec<String>,
    pub surname: String,
}

impl ParsedName {
    /// Display form without GEDCOM slashes.
    pub fn display(&self) -> String {
        let mut parts: Vec<&str> = self.given.iter().map(String::as_str).collect();
        if !self.surname.is_empty() {
            parts.push(&self.surname);
        }
        parts.join(" ")
    }
}

/// Parse a GEDCOM or plain name string into components.
pub fn parse_name(raw: &str) -> ParsedName {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return ParsedName {
            given: Vec::new(),
            surname: String::new(),
        };
    }

    if let Some(open) = trimmed.find('/') {
        let rest = &trimmed[open + 1..];
        let close = rest.find('/').map(|i| open + 1 + i).unwrap_or(trimmed.len());
        let surname = trimmed[open + 1..close].trim().to_string();
        let before = &trimmed[..open];
        let after = if close < trimmed.len() { &trimmed[close + 1..] } else { "" };
        let given: Vec<String> = before
            .split_whitespace()
            .chain(after.split_whitespace())
            .map(str::to_string)
            .collect();
        return ParsedName { given, surname };
    }

    // Plain name: last word is the surname
    let mut words: Vec<String> = trimmed.split_whitespace().map(str::to_string).collect();
    let surname = words.pop().unwrap_or_default();
    ParsedName {
        given: words,
        surname,
    }
}

/// Normalize a name for comparison: lowercase given names then surname,
/// punctuation stripped.
pub fn normalize_name(raw: &str) -> String {
    let parsed = parse_name(raw);
    let mut parts: Vec<String> = parsed.given.iter().map(|g| clean_token(g)).collect();
    if !parsed.surname.is_empty() {
        parts.push(clean_token(&parsed.surname));
    }
    parts.retain(|p| !p.is_empty());
    parts.join(" ")
}

/// Normalized tokens of length >= 2, for duplicate-candidate blocking.
pub fn name_tokens(raw: &str) -> Vec<String> {
    normalize_name(raw)
        .split_whitespace()
        .filter(|t| t.len() >= 2)
        .map(str::to_string)
        .collect()
}

/// Name similarity in [0, 1]: 1.0 for identical normalized names, otherwise
/// token-set Jaccard with a floor of 0.8 when one token set contains the other.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let norm_a = normalize_name(a);
    let norm_b = normalize_name(b);
    if norm_a.is_empty() || norm_b.is_empty() {
        return 0.0;
    }
    if norm_a == norm_b {
        return 1.0;
    }

    let tokens_a: HashSet<&str> = norm_a.split_whitespace().collect();
    let tokens_b: HashSet<&str> = norm_b.split_whitespace().collect();
    let intersection = tokens_a.intersection(&tokens_b).count();
    let union = tokens_a.union(&tokens_b).count();
    if union == 0 {
        return 0.0;
    }
    let jaccard = intersection as f64 / union as f64;

    let contained = tokens_a.is_subset(&tokens_b) || tokens_b.is_subset(&tokens_a);
    if contained && intersection > 0 {
        jaccard.max(0.8)
    } else {
        jaccard
    }
}

fn clean_token(token: &str) -> String {
    token
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '-')
        .collect::<String>()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_gedcom_surname() {
        let parsed = parse_name("John /Smith/");
        assert_eq!(parsed.given, vec!["John"]);
        assert_eq!(parsed.surname, "Smith");
    }

    #[test]
    fn test_parse_multiword_surname() {
        let parsed = parse_name("Maria /de la Cruz/");
        assert_eq!(parsed.given, vec!["Maria"]);
        assert_eq!(parsed.surname, "de la Cruz");
    }

    #[test]
    fn test_parse_suffix_after_surname() {
        let parsed = parse_name("John /Smith/ Jr.");
        assert_eq!(parsed.given, vec!["John", "Jr."]);
        assert_eq!(parsed.surname, "Smith");
    }

    #[test]
    fn test_parse_plain_name() {
        let parsed = parse_name("John Smith");
        assert_eq!(parsed.given, vec!["John"]);
        assert_eq!(parsed.surname, "Smith");
    }

    #[test]
    fn test_parse_unclosed_slash() {
        let parsed = parse_name("John /Smith");
        assert_eq!(parsed.surname, "Smith");
    }

    #[test]
    fn test_display_strips_slashes() {
        assert_eq!(parse_name("John /Smith/").display(), "John Smith");
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize_name("John /Smith/"), "john smith");
        assert_eq!(normalize_name("Mary /O'Connor/"), "mary oconnor");
    }

    #[test]
    fn test_tokens_skip_initials() {
        assert_eq!(name_tokens("J /Smith/"), vec!["smith"]);
    }

    #[test]
    fn test_similarity_identical() {
        assert_eq!(name_similarity("John /Smith/", "John Smith"), 1.0);
    }

    #[test]
    fn test_similarity_subset() {
        let sim = name_similarity("John /Smith/", "John William /Smith/");
        assert!(sim >= 0.8);
        assert!(sim < 1.0);
    }

    #[test]
    fn test_similarity_disjoint() {
        assert_eq!(name_similarity("John /Smith/", "Pierre /Dupont/"), 0.0);
    }

    #[test]
    fn test_similarity_symmetric() {
        let ab = name_similarity("John /Smith/", "Jon /Smith/");
        let ba = name_similarity("Jon /Smith/", "John /Smith/");
        assert_eq!(ab, ba);
    }
}
