//! In-memory learning state
//!
//! One `TemplateLearningState` per template, a global aggregate, and the
//! problematic-term registry. All mutation goes through the methods here so
//! the store only has to handle locking and persistence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info};

use super::detector::TermFailure;
use super::pattern::{ErrorPattern, FixStatus};
use super::terms::{TermRegistry, DEFAULT_AUTO_REPLACE_THRESHOLD};
use crate::prompt::strategy::{select_for_pattern, FixStrategy};
use crate::types::{error_key, RawError};

pub const DEFAULT_TARGET_SUCCESS_RATE: f64 = 90.0;
pub const DEFAULT_FIX_TRIGGER_COUNT: u64 = 2;
pub const DEFAULT_CONFIRMATIONS_REQUIRED: u32 = 2;

/// Thresholds governing the learning lifecycle
#[derive(Debug, Clone, PartialEq)]
pub struct LearningPolicy {
    /// Occurrences before a pattern gets a fix strategy
    pub fix_trigger_count: u64,
    /// Consecutive successful fix tests before a fix is confirmed
    pub confirmations_required: u32,
    /// Failures before a problematic term is auto-replaced
    pub auto_replace_threshold: u32,
    pub target_success_rate: f64,
}

impl Default for LearningPolicy {
    fn default() -> Self {
        Self {
            fix_trigger_count: DEFAULT_FIX_TRIGGER_COUNT,
            confirmations_required: DEFAULT_CONFIRMATIONS_REQUIRED,
            auto_replace_threshold: DEFAULT_AUTO_REPLACE_THRESHOLD,
            target_success_rate: DEFAULT_TARGET_SUCCESS_RATE,
        }
    }
}

/// A fix strategy bound to the pattern it addresses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedFix {
    pub error_key: String,
    pub error_type: String,
    pub error_issue: String,
    pub strategy: FixStrategy,
}

/// Fixes to apply to one session's prompt
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionPlan {
    pub confirmed: Vec<AppliedFix>,
    /// The single unconfirmed fix whose outcome this session records
    pub under_test: Option<AppliedFix>,
}

impl SessionPlan {
    /// Strategies in application order: confirmed first, then the one under test
    pub fn strategies(&self) -> Vec<FixStrategy> {
        self.confirmed
            .iter()
            .chain(self.under_test.iter())
            .map(|f| f.strategy)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.confirmed.is_empty() && self.under_test.is_none()
    }
}

/// Outcome of a session's fix test
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixTestOutcome {
    pub error_key: String,
    pub success: bool,
}

/// Everything a finished session contributes to the learning state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionLearning {
    pub perfect: bool,
    /// Errors of each scored attempt, in attempt order
    pub attempt_errors: Vec<Vec<RawError>>,
    pub fix_test: Option<FixTestOutcome>,
    pub term_failures: Vec<TermFailure>,
}

/// What changed when a session was committed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCommit {
    pub newly_confirmed: Option<String>,
    pub promoted_terms: Vec<String>,
    pub template_success_rate: f64,
    pub global_success_rate: f64,
}

fn rate(perfect: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        perfect as f64 / total as f64 * 100.0
    }
}

/// Learning state for one template
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateLearningState {
    #[serde(default)]
    pub error_patterns: BTreeMap<String, ErrorPattern>,
    #[serde(default)]
    pub total_generations: u64,
    #[serde(default)]
    pub perfect_generations: u64,
    #[serde(default)]
    pub success_rate: f64,
}

impl TemplateLearningState {
    /// Count one attempt's errors; each distinct `type:issue` counts once
    pub fn record_attempt_errors(&mut self, errors: &[RawError], now: DateTime<Utc>) {
        let mut seen = HashSet::new();
        for error in errors {
            let key = error_key(&error.error_type, &error.issue);
            if !seen.insert(key.clone()) {
                continue;
            }
            let pattern = self
                .error_patterns
                .entry(key)
                .or_insert_with(|| ErrorPattern::new(&error.error_type, &error.issue, now));
            pattern.record_occurrence(now);
            debug!(
                "Error tracked: [{}] {} (count: {})",
                error.error_type, error.issue, pattern.count
            );
        }
    }

    pub fn record_generation(&mut self, perfect: bool) {
        self.total_generations += 1;
        if perfect {
            self.perfect_generations += 1;
        }
        self.success_rate = rate(self.perfect_generations, self.total_generations);
    }

    /// Assign a strategy to every pattern that just crossed the trigger count
    pub fn trigger_fixes(&mut self, trigger_count: u64, now: DateTime<Utc>) -> Vec<AppliedFix> {
        let mut triggered = Vec::new();
        for (key, pattern) in self.error_patterns.iter_mut() {
            if !pattern.needs_fix(trigger_count) {
                continue;
            }
            let strategy = select_for_pattern(pattern);
            if pattern.assign_fix(strategy, now) {
                info!(
                    "Pattern detected: [{}] {} ({} occurrences), assigned {} ({})",
                    pattern.error_type,
                    pattern.error_issue,
                    pattern.count,
                    strategy,
                    strategy.description()
                );
                triggered.push(applied_fix(key, pattern, strategy));
            }
        }
        triggered
    }

    pub fn confirmed_fixes(&self) -> Vec<AppliedFix> {
        self.error_patterns
            .iter()
            .filter(|(_, p)| p.status() == FixStatus::Confirmed)
            .filter_map(|(k, p)| p.fix_strategy.map(|s| applied_fix(k, p, s)))
            .collect()
    }

    /// Most frequent unconfirmed fix; ties go to the first key
    pub fn fix_under_test(&self) -> Option<AppliedFix> {
        let mut best: Option<(&String, &ErrorPattern, FixStrategy)> = None;
        for (key, pattern) in &self.error_patterns {
            if pattern.status() != FixStatus::UnderTest {
                continue;
            }
            let Some(strategy) = pattern.fix_strategy else {
                continue;
            };
            if best.map_or(true, |(_, b, _)| pattern.count > b.count) {
                best = Some((key, pattern, strategy));
            }
        }
        best.map(|(k, p, s)| applied_fix(k, p, s))
    }

    pub fn plan(&self) -> SessionPlan {
        SessionPlan {
            confirmed: self.confirmed_fixes(),
            under_test: self.fix_under_test(),
        }
    }

    /// Record a fix test. Returns true if it confirmed the fix.
    pub fn record_fix_test(
        &mut self,
        error_key: &str,
        success: bool,
        required: u32,
        now: DateTime<Utc>,
    ) -> bool {
        match self.error_patterns.get_mut(error_key) {
            Some(pattern) => pattern.record_fix_test(success, required, now),
            None => false,
        }
    }

    pub fn summary(&self) -> TemplateSummary {
        TemplateSummary {
            success_rate: self.success_rate,
            generations: self.total_generations,
            perfect: self.perfect_generations,
            error_patterns: self.error_patterns.len(),
            fixes_confirmed: self
                .error_patterns
                .values()
                .filter(|p| p.fix_confirmed)
                .count(),
        }
    }
}

fn applied_fix(key: &str, pattern: &ErrorPattern, strategy: FixStrategy) -> AppliedFix {
    AppliedFix {
        error_key: key.to_string(),
        error_type: pattern.error_type.clone(),
        error_issue: pattern.error_issue.clone(),
        strategy,
    }
}

/// Totals across all templates
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalLearningState {
    #[serde(default)]
    pub total_generations: u64,
    #[serde(default)]
    pub perfect_generations: u64,
    #[serde(default)]
    pub current_success_rate: f64,
}

impl GlobalLearningState {
    pub fn record_generation(&mut self, perfect: bool) {
        self.total_generations += 1;
        if perfect {
            self.perfect_generations += 1;
        }
        self.current_success_rate = rate(self.perfect_generations, self.total_generations);
    }
}

/// Per-template line of the performance summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateSummary {
    pub success_rate: f64,
    pub generations: u64,
    pub perfect: u64,
    pub error_patterns: usize,
    pub fixes_confirmed: usize,
}

/// Global performance against the target success rate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSummary {
    pub global_success_rate: f64,
    pub target: f64,
    pub meets_target: bool,
    pub templates: BTreeMap<String, TemplateSummary>,
}

/// Everything the learning store persists
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningSnapshot {
    #[serde(default)]
    pub templates: BTreeMap<String, TemplateLearningState>,
    #[serde(default)]
    pub global_stats: GlobalLearningState,
    #[serde(default = "TermRegistry::with_defaults")]
    pub problematic_terms: TermRegistry,
    #[serde(default = "Utc::now")]
    pub last_updated: DateTime<Utc>,
}

impl Default for LearningSnapshot {
    fn default() -> Self {
        Self {
            templates: BTreeMap::new(),
            global_stats: GlobalLearningState::default(),
            problematic_terms: TermRegistry::with_defaults(),
            last_updated: Utc::now(),
        }
    }
}

impl LearningSnapshot {
    pub fn template(&self, template_id: &str) -> Option<&TemplateLearningState> {
        self.templates.get(template_id)
    }

    pub fn template_mut(&mut self, template_id: &str) -> &mut TemplateLearningState {
        self.templates.entry(template_id.to_string()).or_default()
    }

    /// Fold a finished session into the state
    pub fn apply_session(
        &mut self,
        template_id: &str,
        session: &SessionLearning,
        policy: &LearningPolicy,
        now: DateTime<Utc>,
    ) -> SessionCommit {
        let mut commit = SessionCommit::default();

        let template = self.template_mut(template_id);
        for errors in &session.attempt_errors {
            template.record_attempt_errors(errors, now);
        }
        template.record_generation(session.perfect);

        if let Some(test) = &session.fix_test {
            if template.record_fix_test(&test.error_key, test.success, policy.confirmations_required, now) {
                info!("Fix confirmed for {}: {}", template_id, test.error_key);
                commit.newly_confirmed = Some(test.error_key.clone());
            }
        }
        commit.template_success_rate = template.success_rate;

        self.global_stats.record_generation(session.perfect);
        commit.global_success_rate = self.global_stats.current_success_rate;

        for failure in &session.term_failures {
            let was_auto = self
                .problematic_terms
                .get(&failure.term)
                .map(|t| t.auto_replace)
                .unwrap_or(false);
            let term = self.problematic_terms.record_failure(
                &failure.term,
                &failure.misspelling,
                policy.auto_replace_threshold,
                now,
            );
            if term.auto_replace && !was_auto {
                commit.promoted_terms.push(term.term.clone());
            }
        }

        self.last_updated = now;
        commit
    }

    pub fn performance_summary(&self, target: f64) -> PerformanceSummary {
        PerformanceSummary {
            global_success_rate: self.global_stats.current_success_rate,
            target,
            meets_target: self.global_stats.total_generations > 0
                && self.global_stats.current_success_rate >= target,
            templates: self
                .templates
                .iter()
                .map(|(name, t)| (name.clone(), t.summary()))
                .collect(),
        }
    }
}
