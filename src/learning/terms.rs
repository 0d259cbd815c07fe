//! Problematic terms
//!
//! Words the generator keeps misspelling. Each failure is counted; once a
//! term reaches the auto-replace threshold it is promoted for proactive
//! substitution. Promotion is one-way.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// Failures after which a term is substituted automatically
pub const DEFAULT_AUTO_REPLACE_THRESHOLD: u32 = 5;

/// How much trouble a term causes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TermSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for TermSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TermSeverity::Low => write!(f, "low"),
            TermSeverity::Medium => write!(f, "medium"),
            TermSeverity::High => write!(f, "high"),
            TermSeverity::Critical => write!(f, "critical"),
        }
    }
}

/// A word with a tracked history of generation failures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblematicTerm {
    pub term: String,
    pub failure_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_failed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub known_misspellings: Vec<String>,
    #[serde(default)]
    pub alternatives: Vec<String>,
    #[serde(default)]
    pub auto_replace: bool,
    #[serde(default = "default_category")]
    pub category: String,
    pub severity: TermSeverity,
}

fn default_category() -> String {
    "unknown".to_string()
}

impl ProblematicTerm {
    pub fn new(term: &str) -> Self {
        Self {
            term: term.to_lowercase(),
            failure_count: 0,
            last_failed: None,
            known_misspellings: Vec::new(),
            alternatives: Vec::new(),
            auto_replace: false,
            category: default_category(),
            severity: TermSeverity::Medium,
        }
    }

    /// Alternative for a zero-based attempt index, rotating through the list
    pub fn alternative_for(&self, attempt_index: usize) -> Option<&str> {
        if self.alternatives.is_empty() {
            return None;
        }
        Some(self.alternatives[attempt_index % self.alternatives.len()].as_str())
    }

    /// Count a failure. Returns true if this failure promoted the term.
    pub fn record_failure(&mut self, misspelling: &str, threshold: u32, now: DateTime<Utc>) -> bool {
        self.failure_count += 1;
        self.last_failed = Some(now);

        if !misspelling.is_empty() && !self.known_misspellings.iter().any(|m| m == misspelling) {
            self.known_misspellings.push(misspelling.to_string());
        }

        if !self.auto_replace && self.failure_count >= threshold {
            self.auto_replace = true;
            self.severity = TermSeverity::Critical;
            return true;
        }
        false
    }
}

/// Summary over all tracked terms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TermStats {
    pub total_problematic_terms: usize,
    pub auto_replace_enabled: usize,
    pub total_failures: u64,
    pub critical_terms: Vec<String>,
    pub high_priority_terms: Vec<String>,
}

/// All tracked terms, keyed by lower-cased term
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TermRegistry {
    terms: BTreeMap<String, ProblematicTerm>,
}

impl TermRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry seeded with the terms known to fail before any learning
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        registry.insert(ProblematicTerm {
            term: "volatility".to_string(),
            failure_count: 15,
            last_failed: None,
            known_misspellings: vec![
                "voltability".to_string(),
                "vol'ability".to_string(),
                "VOLITALIITY".to_string(),
                "volitiliy".to_string(),
                "VOLITALITY".to_string(),
                "volitaliy".to_string(),
            ],
            alternatives: vec![
                "market uncertainty".to_string(),
                "rate fluctuation".to_string(),
                "market shifts".to_string(),
                "price swings".to_string(),
                "rate changes".to_string(),
            ],
            auto_replace: true,
            category: "financial-terminology".to_string(),
            severity: TermSeverity::Critical,
        });

        registry.insert(ProblematicTerm {
            term: "personalized".to_string(),
            failure_count: 4,
            last_failed: None,
            known_misspellings: vec!["PERSONAIIZED".to_string(), "personailzed".to_string()],
            alternatives: vec![
                "customized".to_string(),
                "tailored".to_string(),
                "individualized".to_string(),
                "custom".to_string(),
            ],
            auto_replace: false,
            category: "marketing".to_string(),
            severity: TermSeverity::High,
        });

        registry.insert(ProblematicTerm {
            term: "appreciate".to_string(),
            failure_count: 3,
            last_failed: None,
            known_misspellings: vec!["apreciate".to_string(), "apprecaite".to_string()],
            alternatives: vec!["value".to_string(), "increase".to_string(), "grow".to_string()],
            auto_replace: false,
            category: "financial-terminology".to_string(),
            severity: TermSeverity::Medium,
        });

        registry
    }

    pub fn insert(&mut self, term: ProblematicTerm) {
        self.terms.insert(term.term.to_lowercase(), term);
    }

    pub fn get(&self, term: &str) -> Option<&ProblematicTerm> {
        self.terms.get(&term.to_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProblematicTerm> {
        self.terms.values()
    }

    /// Terms currently eligible for automatic substitution
    pub fn auto_replaced(&self) -> impl Iterator<Item = &ProblematicTerm> {
        self.terms.values().filter(|t| t.auto_replace)
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Record a failure for `term`, creating the entry if needed
    pub fn record_failure(
        &mut self,
        term: &str,
        misspelling: &str,
        threshold: u32,
        now: DateTime<Utc>,
    ) -> &ProblematicTerm {
        let key = term.to_lowercase();
        let entry = self
            .terms
            .entry(key.clone())
            .or_insert_with(|| ProblematicTerm::new(&key));

        if entry.record_failure(misspelling, threshold, now) {
            info!(
                "Term '{}' promoted to auto-replace after {} failures",
                entry.term, entry.failure_count
            );
        }
        entry
    }

    /// Add alternatives for a term, creating the entry if needed
    pub fn add_alternatives(&mut self, term: &str, alternatives: &[String]) -> &ProblematicTerm {
        let key = term.to_lowercase();
        let entry = self
            .terms
            .entry(key.clone())
            .or_insert_with(|| ProblematicTerm::new(&key));
        for alt in alternatives {
            if !entry.alternatives.contains(alt) {
                entry.alternatives.push(alt.clone());
            }
        }
        entry
    }

    pub fn stats(&self) -> TermStats {
        let by_severity = |severity: TermSeverity| {
            self.terms
                .values()
                .filter(|t| t.severity == severity)
                .map(|t| t.term.clone())
                .collect::<Vec<_>>()
        };

        TermStats {
            total_problematic_terms: self.terms.len(),
            auto_replace_enabled: self.terms.values().filter(|t| t.auto_replace).count(),
            total_failures: self.terms.values().map(|t| t.failure_count as u64).sum(),
            critical_terms: by_severity(TermSeverity::Critical),
            high_priority_terms: by_severity(TermSeverity::High),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let registry = TermRegistry::with_defaults();
        assert_eq!(registry.len(), 3);
        assert!(registry.get("Volatility").unwrap().auto_replace);
        assert!(!registry.get("personalized").unwrap().auto_replace);
        assert_eq!(registry.auto_replaced().count(), 1);
    }

    #[test]
    fn test_promotion_at_threshold() {
        let mut registry = TermRegistry::new();
        for i in 1..=4 {
            let term = registry.record_failure("outlook", "OUTLOK", 5, Utc::now());
            assert_eq!(term.failure_count, i);
            assert!(!term.auto_replace);
        }
        let term = registry.record_failure("outlook", "OUTLOOOK", 5, Utc::now());
        assert!(term.auto_replace);
        assert_eq!(term.severity, TermSeverity::Critical);
        assert_eq!(term.known_misspellings, vec!["OUTLOK", "OUTLOOOK"]);
    }

    #[test]
    fn test_promotion_is_one_way() {
        let mut term = ProblematicTerm::new("rates");
        for _ in 0..5 {
            term.record_failure("RAETS", 5, Utc::now());
        }
        assert!(term.auto_replace);
        assert!(!term.record_failure("RAETS", 5, Utc::now()));
        assert!(term.auto_replace);
        assert_eq!(term.known_misspellings.len(), 1);
    }

    #[test]
    fn test_alternative_rotation() {
        let registry = TermRegistry::with_defaults();
        let term = registry.get("volatility").unwrap();
        assert_eq!(term.alternative_for(0), Some("market uncertainty"));
        assert_eq!(term.alternative_for(1), Some("rate fluctuation"));
        assert_eq!(term.alternative_for(5), Some("market uncertainty"));
        assert_eq!(ProblematicTerm::new("x").alternative_for(3), None);
    }

    #[test]
    fn test_stats() {
        let stats = TermRegistry::with_defaults().stats();
        assert_eq!(stats.total_problematic_terms, 3);
        assert_eq!(stats.auto_replace_enabled, 1);
        assert_eq!(stats.total_failures, 22);
        assert_eq!(stats.critical_terms, vec!["volatility"]);
        assert_eq!(stats.high_priority_terms, vec!["personalized"]);
    }

    #[test]
    fn test_add_alternatives_dedupes() {
        let mut registry = TermRegistry::new();
        registry.add_alternatives("Outlook", &["forecast".to_string(), "view".to_string()]);
        let term = registry.add_alternatives("outlook", &["view".to_string()]);
        assert_eq!(term.alternatives, vec!["forecast", "view"]);
        assert_eq!(term.term, "outlook");
    }
}
