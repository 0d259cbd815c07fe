//! Term failure detector
//!
//! Scans analyzer errors for misspellings of words the prompt asked for, and
//! turns them into problematic-term failures.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::types::ErrorRecord;

/// `OUTLOK instead of OUTLOOK`, quotes optional
static INSTEAD_OF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)["']?(?P<bad>[\w'-]+)["']?\s+instead\s+of\s+["']?(?P<good>[\w'-]+)["']?"#)
        .expect("instead-of pattern is valid")
});

/// `OUTLOOK misspelled as OUTLOK`, quotes optional
static MISSPELLED_AS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)["']?(?P<good>[\w'-]+)["']?\s+(?:is\s+|was\s+)?misspelled\s+as\s+["']?(?P<bad>[\w'-]+)["']?"#,
    )
    .expect("misspelled-as pattern is valid")
});

/// A prompt word the generator got wrong
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TermFailure {
    pub term: String,
    pub misspelling: String,
}

fn is_spelling_error(error: &ErrorRecord) -> bool {
    let text = format!("{} {}", error.error_type, error.issue).to_lowercase();
    ["typo", "spell", "misspel"].iter().any(|k| text.contains(k))
}

fn parse_misspelling(issue: &str) -> Option<(String, String)> {
    let caps = INSTEAD_OF
        .captures(issue)
        .or_else(|| MISSPELLED_AS.captures(issue))?;
    let good = caps.name("good")?.as_str().trim_matches('\'');
    let bad = caps.name("bad")?.as_str().trim_matches('\'');
    if good.is_empty() || good.eq_ignore_ascii_case(bad) {
        return None;
    }
    Some((good.to_string(), bad.to_string()))
}

fn prompt_contains_word(prompt: &str, word: &str) -> bool {
    Regex::new(&format!(r"(?i)\b{}\b", regex::escape(word)))
        .map(|re| re.is_match(prompt))
        .unwrap_or(false)
}

/// Detect misspelled prompt words in one attempt's errors.
///
/// Only words that actually occur in `prompt` count; each term is reported
/// at most once per call.
pub fn detect_term_failures(errors: &[ErrorRecord], prompt: &str) -> Vec<TermFailure> {
    let mut seen = HashSet::new();
    let mut failures = Vec::new();

    for error in errors.iter().filter(|e| is_spelling_error(e)) {
        let Some((good, bad)) = parse_misspelling(&error.issue) else {
            continue;
        };
        if !prompt_contains_word(prompt, &good) {
            continue;
        }
        let term = good.to_lowercase();
        if seen.insert(term.clone()) {
            failures.push(TermFailure {
                term,
                misspelling: bad,
            });
        }
    }

    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RawError;

    fn err(error_type: &str, issue: &str) -> ErrorRecord {
        ErrorRecord::classify(RawError::new(error_type, issue))
    }

    #[test]
    fn test_instead_of() {
        let errors = vec![err("typo", "OUTLOK instead of OUTLOOK")];
        let failures = detect_term_failures(&errors, "Economic Outlook for Q4");
        assert_eq!(
            failures,
            vec![TermFailure {
                term: "outlook".to_string(),
                misspelling: "OUTLOK".to_string()
            }]
        );
    }

    #[test]
    fn test_misspelled_as_with_quotes() {
        let errors = vec![err("spelling_error", "\"volatility\" misspelled as \"voltability\"")];
        let failures = detect_term_failures(&errors, "Rate volatility ahead");
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].term, "volatility");
        assert_eq!(failures[0].misspelling, "voltability");
    }

    #[test]
    fn test_word_must_be_in_prompt() {
        let errors = vec![err("typo", "OUTLOK instead of OUTLOOK")];
        assert!(detect_term_failures(&errors, "Daily rate update").is_empty());
    }

    #[test]
    fn test_non_spelling_errors_ignored() {
        let errors = vec![err("design", "blue instead of green")];
        assert!(detect_term_failures(&errors, "green background").is_empty());
    }

    #[test]
    fn test_one_failure_per_term() {
        let errors = vec![
            err("typo", "OUTLOK instead of OUTLOOK"),
            err("typo", "OUTLOOOK instead of OUTLOOK"),
        ];
        assert_eq!(detect_term_failures(&errors, "outlook").len(), 1);
    }
}
