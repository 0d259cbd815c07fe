//! Fix strategies
//!
//! Maps a recurring error pattern to a structural prompt modification, and
//! applies that modification to a prompt.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::learning::pattern::ErrorPattern;

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\w+\b").expect("word pattern is valid"));

static DECIMAL_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+\.\d+)(%?)").expect("decimal pattern is valid")
});

/// Structural prompt modification assigned to an error pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixStrategy {
    /// Spelling trouble: shorter words, capitalized emphasis
    SimplifyText,
    ForceQuotes,
    AddPercent,
    FixBackground,
    ReduceSections,
    /// Fallback when no issue keyword matches
    SimplifyOverall,
}

impl std::fmt::Display for FixStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FixStrategy::SimplifyText => write!(f, "simplify_text"),
            FixStrategy::ForceQuotes => write!(f, "force_quotes"),
            FixStrategy::AddPercent => write!(f, "add_percent"),
            FixStrategy::FixBackground => write!(f, "fix_background"),
            FixStrategy::ReduceSections => write!(f, "reduce_sections"),
            FixStrategy::SimplifyOverall => write!(f, "simplify_overall"),
        }
    }
}

/// Tunables for strategy application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySettings {
    #[serde(default = "default_background_color")]
    pub background_color: String,
    #[serde(default = "default_forbidden_colors")]
    pub forbidden_colors: Vec<String>,
    #[serde(default = "default_max_section_words")]
    pub max_section_words: u32,
    #[serde(default = "default_max_word_length")]
    pub max_word_length: usize,
}

fn default_background_color() -> String {
    "forest green".to_string()
}

fn default_forbidden_colors() -> Vec<String> {
    vec!["blue".to_string(), "navy".to_string()]
}

fn default_max_section_words() -> u32 {
    15
}

fn default_max_word_length() -> usize {
    10
}

impl Default for StrategySettings {
    fn default() -> Self {
        Self {
            background_color: default_background_color(),
            forbidden_colors: default_forbidden_colors(),
            max_section_words: default_max_section_words(),
            max_word_length: default_max_word_length(),
        }
    }
}

/// Pick the strategy for an error signature
pub fn select_strategy(error_type: &str, issue: &str) -> FixStrategy {
    let issue = issue.to_lowercase();
    let error_type = error_type.to_lowercase();

    if error_type == "typo" || issue.contains("spell") || issue.contains("typo") {
        FixStrategy::SimplifyText
    } else if issue.contains("quote") || issue.contains('"') {
        FixStrategy::ForceQuotes
    } else if issue.contains('%') || issue.contains("percent") {
        FixStrategy::AddPercent
    } else if ["background", "color", "blue", "green"]
        .iter()
        .any(|k| issue.contains(k))
    {
        FixStrategy::FixBackground
    } else if ["missing", "absent", "not present"]
        .iter()
        .any(|k| issue.contains(k))
    {
        FixStrategy::ReduceSections
    } else {
        FixStrategy::SimplifyOverall
    }
}

/// Pick the strategy for a learned pattern
pub fn select_for_pattern(pattern: &ErrorPattern) -> FixStrategy {
    select_strategy(&pattern.error_type, &pattern.error_issue)
}

impl FixStrategy {
    pub fn description(&self) -> &'static str {
        match self {
            FixStrategy::SimplifyText => "Replace complex words with simple alternatives",
            FixStrategy::ForceQuotes => "Add explicit quote mark instructions",
            FixStrategy::AddPercent => "Explicitly add % sign to all rates",
            FixStrategy::FixBackground => "Explicitly state the required background color",
            FixStrategy::ReduceSections => "Break complex sections into short chunks",
            FixStrategy::SimplifyOverall => "Simplify entire prompt",
        }
    }

    /// Apply this strategy to a prompt
    pub fn apply(&self, prompt: &str, settings: &StrategySettings) -> String {
        match self {
            FixStrategy::SimplifyText => {
                let emphasized = WORD.replace_all(prompt, |caps: &Captures| {
                    let word = &caps[0];
                    if word.chars().count() > settings.max_word_length {
                        word.to_uppercase()
                    } else {
                        word.to_string()
                    }
                });
                format!(
                    "{}\n\nUse short, simple words (at most {} letters). Use CAPS for emphasis.",
                    emphasized, settings.max_word_length
                )
            }
            FixStrategy::ForceQuotes => format!(
                "{}\n\nCRITICAL: Use BOTH opening \" and closing \" quotation marks around all quoted text.",
                prompt
            ),
            FixStrategy::AddPercent => DECIMAL_NUMBER
                .replace_all(prompt, |caps: &Captures| format!("{}%", &caps[1]))
                .into_owned(),
            FixStrategy::FixBackground => {
                let required = settings.background_color.to_uppercase();
                let mut text = prompt.to_string();
                for color in &settings.forbidden_colors {
                    let pattern = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(color)))
                        .expect("escaped color pattern is valid");
                    text = pattern
                        .replace_all(&text, regex::NoExpand(&required))
                        .into_owned();
                }
                let forbidden = settings
                    .forbidden_colors
                    .iter()
                    .map(|c| format!("NOT {}", c))
                    .collect::<Vec<_>>()
                    .join(", ");
                if forbidden.is_empty() {
                    format!("{}\n\nDESIGN: {} background", text, settings.background_color)
                } else {
                    format!(
                        "{}\n\nDESIGN: {} background ({})",
                        text, settings.background_color, forbidden
                    )
                }
            }
            FixStrategy::ReduceSections => format!(
                "{}\n\nKeep all text sections under {} words each.",
                prompt, settings.max_section_words
            ),
            FixStrategy::SimplifyOverall => format!(
                "{}\n\nSimplify all text. Use CAPS for emphasis. Keep sections brief.",
                prompt
            ),
        }
    }
}
