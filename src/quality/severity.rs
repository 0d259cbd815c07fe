//! Severity classification for analyzer-reported errors
//!
//! Severity rules are a declarative, ordered table of `{tier, patterns}`.
//! Classification is first-match-wins over the tiers in table order, tested
//! against the lower-cased `"<type> <issue>"` text. Anything unmatched is MEDIUM.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Severity tier, each carrying a fixed score deduction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeverityTier {
    Blocking,
    High,
    Medium,
    Low,
}

impl SeverityTier {
    /// Points deducted from a perfect score for one error of this tier
    pub const fn weight(self) -> u32 {
        match self {
            SeverityTier::Blocking => 20,
            SeverityTier::High => 10,
            SeverityTier::Medium => 3,
            SeverityTier::Low => 1,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            SeverityTier::Blocking => "Critical errors that must be fixed immediately",
            SeverityTier::High => "Significant errors affecting functionality or clarity",
            SeverityTier::Medium => "Aesthetic preferences that could be improved",
            SeverityTier::Low => "Minor aesthetic details with minimal impact",
        }
    }

    /// All tiers, most severe first
    pub fn all() -> [SeverityTier; 4] {
        [
            SeverityTier::Blocking,
            SeverityTier::High,
            SeverityTier::Medium,
            SeverityTier::Low,
        ]
    }
}

impl std::fmt::Display for SeverityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SeverityTier::Blocking => write!(f, "BLOCKING"),
            SeverityTier::High => write!(f, "HIGH"),
            SeverityTier::Medium => write!(f, "MEDIUM"),
            SeverityTier::Low => write!(f, "LOW"),
        }
    }
}

/// Tier assigned when no rule matches
pub const DEFAULT_TIER: SeverityTier = SeverityTier::Medium;

/// One row of the severity table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityRule {
    pub tier: SeverityTier,
    pub patterns: Vec<String>,
}

impl SeverityRule {
    pub fn new(tier: SeverityTier, patterns: &[&str]) -> Self {
        Self {
            tier,
            patterns: patterns.iter().map(|p| p.to_lowercase()).collect(),
        }
    }

    fn matches(&self, text_lower: &str) -> bool {
        self.patterns.iter().any(|p| text_lower.contains(p.as_str()))
    }
}

/// Synthetic error type used when the analyzer itself fails
pub const ANALYSIS_ERROR_TYPE: &str = "analysis_error";

const BLOCKING_PATTERNS: &[&str] = &[
    "spelling_error",
    "misspelling",
    "misspelled",
    "wrong_logo",
    "missing_data",
    "incorrect_rate",
    ANALYSIS_ERROR_TYPE,
];

const HIGH_PATTERNS: &[&str] = &[
    "layout_issue",
    "layout_problem",
    "data_format",
    "missing_section",
    "incorrect_positioning",
];

const MEDIUM_PATTERNS: &[&str] = &[
    "visual_preference",
    "quotation_style",
    "color_choice",
    "font_size",
    "spacing",
];

const LOW_PATTERNS: &[&str] = &["minor_aesthetic", "subtle", "slight", "minor"];

static DEFAULT_CLASSIFIER: Lazy<SeverityClassifier> = Lazy::new(SeverityClassifier::default);

/// Data-driven severity classifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeverityClassifier {
    rules: Vec<SeverityRule>,
}

impl Default for SeverityClassifier {
    fn default() -> Self {
        Self::new(vec![
            SeverityRule::new(SeverityTier::Blocking, BLOCKING_PATTERNS),
            SeverityRule::new(SeverityTier::High, HIGH_PATTERNS),
            SeverityRule::new(SeverityTier::Medium, MEDIUM_PATTERNS),
            SeverityRule::new(SeverityTier::Low, LOW_PATTERNS),
        ])
    }
}

impl SeverityClassifier {
    /// Build a classifier from an ordered rule table. Patterns are lower-cased.
    pub fn new(rules: Vec<SeverityRule>) -> Self {
        let rules = rules
            .into_iter()
            .map(|rule| SeverityRule {
                tier: rule.tier,
                patterns: rule.patterns.iter().map(|p| p.to_lowercase()).collect(),
            })
            .collect();
        Self { rules }
    }

    pub fn rules(&self) -> &[SeverityRule] {
        &self.rules
    }

    /// Classify free-form error text
    pub fn classify_text(&self, error_text: &str) -> SeverityTier {
        let lower = error_text.to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.matches(&lower))
            .map(|rule| rule.tier)
            .unwrap_or(DEFAULT_TIER)
    }

    /// Classify an error by its type and issue description
    pub fn classify(&self, error_type: &str, issue: &str) -> SeverityTier {
        self.classify_text(&format!("{} {}", error_type, issue))
    }
}

/// Classify with the default severity table
pub fn classify(error_type: &str, issue: &str) -> SeverityTier {
    DEFAULT_CLASSIFIER.classify(error_type, issue)
}
