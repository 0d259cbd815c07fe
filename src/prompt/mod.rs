//! Prompt mutation between attempts
//!
//! Each attempt's prompt is assembled in a fixed order:
//! base -> fix strategies -> term substitution -> feedback block.

pub mod feedback;
pub mod strategy;
pub mod substitution;

pub use feedback::build_feedback;
pub use strategy::{select_for_pattern, select_strategy, FixStrategy, StrategySettings};
pub use substitution::{substitute, Replacement, Substitution};

use crate::learning::terms::TermRegistry;
use crate::types::ErrorRecord;

/// Prompt sent to the generator for one attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptPrompt {
    pub text: String,
    pub replacements: Vec<Replacement>,
}

/// Apply each distinct strategy once, in order
pub fn apply_fixes(prompt: &str, strategies: &[FixStrategy], settings: &StrategySettings) -> String {
    let mut seen = Vec::with_capacity(strategies.len());
    let mut text = prompt.to_string();
    for strategy in strategies {
        if seen.contains(strategy) {
            continue;
        }
        seen.push(*strategy);
        text = strategy.apply(&text, settings);
    }
    text
}

/// Builds per-attempt prompts for one session
pub struct PromptBuilder {
    fixed_base: String,
    terms: TermRegistry,
}

impl PromptBuilder {
    /// Fix strategies are applied once here; terms are a session snapshot
    pub fn new(
        base_prompt: &str,
        strategies: &[FixStrategy],
        settings: &StrategySettings,
        terms: TermRegistry,
    ) -> Self {
        Self {
            fixed_base: apply_fixes(base_prompt, strategies, settings),
            terms,
        }
    }

    /// Base prompt with fix strategies applied
    pub fn fixed_base(&self) -> &str {
        &self.fixed_base
    }

    /// Prompt for attempt `attempt` (1-based), given the errors to echo back
    pub fn build(&self, attempt: u32, previous_errors: &[ErrorRecord]) -> AttemptPrompt {
        let attempt_index = attempt.saturating_sub(1) as usize;
        let substituted = substitute(&self.fixed_base, attempt_index, &self.terms);
        AttemptPrompt {
            text: build_feedback(&substituted.prompt, previous_errors),
            replacements: substituted.applied,
        }
    }
}
