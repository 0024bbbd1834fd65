//! Token-subset matching between typed addresses and geocoder candidates
//!
//! Matching is a lenient containment test: "123 Main St" matches
//! "123 Main Street, Springfield, IL" because every typed token appears
//! somewhere in the candidate text.

use std::sync::LazyLock;

use regex::Regex;

use crate::candidate::AddressCandidate;

static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\w+").unwrap());

/// Split text into lowercase word tokens
pub fn tokenize(text: &str) -> Vec<String> {
    WORD.find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// True when every token of `input` is a substring of `candidate_text`
pub fn matches(input: &str, candidate_text: &str) -> bool {
    let tokens = tokenize(input);
    if tokens.is_empty() {
        return false;
    }
    let haystack = candidate_text.to_lowercase();
    tokens.iter().all(|t| haystack.contains(t.as_str()))
}

/// Try the display name first, then the street address
pub fn matches_candidate(input: &str, candidate: &AddressCandidate) -> bool {
    matches(input, &candidate.display_name) || matches(input, &candidate.address)
}
