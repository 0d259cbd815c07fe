//! Proactive substitution of problematic terms
//!
//! Runs before generation on every attempt. Only auto-replaced terms are
//! touched; the chosen alternative rotates with the attempt index.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::learning::terms::TermRegistry;

/// One substitution made in a prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Replacement {
    pub original: String,
    pub replacement: String,
    pub reason: String,
}

/// A prompt after substitution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitution {
    pub prompt: String,
    pub applied: Vec<Replacement>,
}

/// Replace every whole-word, case-insensitive occurrence of each
/// auto-replaced term with its alternative for `attempt_index` (zero-based).
pub fn substitute(prompt: &str, attempt_index: usize, terms: &TermRegistry) -> Substitution {
    let mut text = prompt.to_string();
    let mut applied = Vec::new();

    for term in terms.auto_replaced() {
        let Some(alternative) = term.alternative_for(attempt_index) else {
            continue;
        };
        let pattern = match Regex::new(&format!(r"(?i)\b{}\b", regex::escape(&term.term))) {
            Ok(p) => p,
            Err(e) => {
                debug!("Skipping term '{}': {}", term.term, e);
                continue;
            }
        };
        if !pattern.is_match(&text) {
            continue;
        }

        text = pattern.replace_all(&text, regex::NoExpand(alternative)).into_owned();
        applied.push(Replacement {
            original: term.term.clone(),
            replacement: alternative.to_string(),
            reason: format!("Auto-replaced ({} failures)", term.failure_count),
        });
    }

    Substitution { prompt: text, applied }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learning::terms::ProblematicTerm;
    use chrono::Utc;

    #[test]
    fn test_rotates_by_attempt() {
        let terms = TermRegistry::with_defaults();
        let first = substitute("Volatility is rising. volatility!", 0, &terms);
        assert_eq!(first.prompt, "market uncertainty is rising. market uncertainty!");
        assert_eq!(first.applied.len(), 1);
        assert_eq!(first.applied[0].original, "volatility");

        let second = substitute("Volatility is rising.", 1, &terms);
        assert_eq!(second.prompt, "rate fluctuation is rising.");
    }

    #[test]
    fn test_whole_word_only() {
        let terms = TermRegistry::with_defaults();
        let out = substitute("Low-volatilityfund and VOLATILITY", 0, &terms);
        assert_eq!(out.prompt, "Low-volatilityfund and market uncertainty");
    }

    #[test]
    fn test_manual_terms_untouched() {
        let terms = TermRegistry::with_defaults();
        let out = substitute("Your personalized rate", 0, &terms);
        assert_eq!(out.prompt, "Your personalized rate");
        assert!(out.applied.is_empty());
    }

    #[test]
    fn test_promoted_term_without_alternatives_is_kept() {
        let mut terms = TermRegistry::new();
        for _ in 0..5 {
            terms.record_failure("outlook", "OUTLOK", 5, Utc::now());
        }
        let out = substitute("Economic outlook", 2, &terms);
        assert_eq!(out.prompt, "Economic outlook");

        let mut term = ProblematicTerm::new("outlook");
        term.auto_replace = true;
        term.alternatives = vec!["forecast".to_string()];
        terms.insert(term);
        assert_eq!(substitute("Economic outlook", 2, &terms).prompt, "Economic forecast");
    }
}
