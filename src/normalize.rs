//! Concept name normalization.
//!
//! Canonicalizes a free-form concept name into a stable lookup key used by
//! the cache, the resources store, and concept matching. Total and
//! idempotent: every string produces a key, and `normalize(normalize(x))
//! == normalize(x)`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A normalized concept name, used as the cache/resource lookup token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConceptKey(String);

impl ConceptKey {
    pub fn new(raw: &str) -> Self {
        ConceptKey(normalize(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConceptKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonicalizes a free-form name. Rules applied in order:
/// trim whitespace, URL-decode, collapse runs of whitespace/hyphens/
/// underscores to a single space, lowercase, strip leading/trailing
/// punctuation.
pub fn normalize(input: &str) -> String {
    let trimmed = input.trim();

    let decoded = urlencoding::decode(trimmed)
        .map(|cow| cow.into_owned())
        .unwrap_or_else(|_| trimmed.to_string());

    let mut collapsed = String::with_capacity(decoded.len());
    let mut last_was_sep = false;
    for ch in decoded.chars() {
        if ch.is_whitespace() || ch == '-' || ch == '_' {
            if !last_was_sep && !collapsed.is_empty() {
                collapsed.push(' ');
            }
            last_was_sep = true;
        } else {
            collapsed.push(ch);
            last_was_sep = false;
        }
    }

    let lowered = collapsed.trim_end().to_lowercase();

    // Stripping punctuation can uncover whitespace that was only
    // "interior" because punctuation followed it (e.g. "derivative ?" ->
    // "derivative "); trim once more so the result never carries it,
    // which is what keeps this function idempotent.
    lowered
        .trim_matches(|c: char| c.is_ascii_punctuation() && c != ' ')
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_and_lowercases() {
        assert_eq!(normalize("  Derivatives  "), "derivatives");
    }

    #[test]
    fn collapses_separators() {
        assert_eq!(normalize("topological___data--analysis"), "topological data analysis");
        assert_eq!(normalize("chain   rule"), "chain rule");
    }

    #[test]
    fn url_decodes() {
        assert_eq!(normalize("limits%20and%20continuity"), "limits and continuity");
    }

    #[test]
    fn strips_punctuation() {
        assert_eq!(normalize("What is a derivative?"), "what is a derivative");
        assert_eq!(normalize("...chain rule!!!"), "chain rule");
    }

    #[test]
    fn idempotent_for_arbitrary_inputs() {
        let inputs = [
            "  Derivatives  ",
            "What is a DERIVATIVE???",
            "topological___data--analysis",
            "",
            "   ",
            "a-b_c  d",
            "%20encoded%20",
            "what is a derivative ?",
            "chain rule !",
        ];
        for input in inputs {
            let once = normalize(input);
            let twice = normalize(&once);
            assert_eq!(once, twice, "not idempotent for {input:?}");
        }
    }

    #[test]
    fn punctuation_after_a_space_does_not_leave_a_trailing_space() {
        assert_eq!(normalize("what is a derivative ?"), "what is a derivative");
    }

    #[test]
    fn total_never_panics() {
        // every input, including empty and pure-punctuation, must produce a key
        for input in ["", "   ", "!!!", "---___---"] {
            let _ = normalize(input);
        }
    }

    #[test]
    fn same_key_means_same_concept() {
        let a = ConceptKey::new("Chain Rule");
        let b = ConceptKey::new("  chain--rule  ");
        assert_eq!(a, b);
    }
}
