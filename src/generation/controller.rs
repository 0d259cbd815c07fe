//! Attempt Controller
//!
//! Drives one generation session through `Idle -> Attempting(k) -> Success |
//! Exhausted`. Attempts run strictly in order: attempt k+1 is built from
//! attempt k's errors. Learning is read before the first attempt and written
//! once after the last; persistence failures never fail the session.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::policy::{RetryPolicy, SessionError};
use super::{AnalysisContext, GenerateOptions, Generator, QualityAnalyzer};
use crate::learning::detector::{detect_term_failures, TermFailure};
use crate::learning::state::{AppliedFix, FixTestOutcome, SessionCommit, SessionLearning, SessionPlan};
use crate::learning::store::LearningStore;
use crate::metrics::PerformanceTracker;
use crate::prompt::{AttemptPrompt, PromptBuilder, Replacement, StrategySettings};
use crate::quality::scorer::score;
use crate::quality::severity::SeverityClassifier;
use crate::types::{ErrorRecord, GenerationRequest, RawError};

/// Session state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    /// Running attempt `k` (1-based)
    Attempting(u32),
    Success,
    Exhausted,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Success | SessionState::Exhausted)
    }
}

/// Transition after attempt `k` of `max_attempts` finished
pub fn after_attempt(k: u32, max_attempts: u32, is_perfect: bool) -> SessionState {
    if is_perfect {
        SessionState::Success
    } else if k >= max_attempts {
        SessionState::Exhausted
    } else {
        SessionState::Attempting(k + 1)
    }
}

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    Perfect,
    Exhausted,
    Cancelled,
    DeadlineExceeded,
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Termination::Perfect => write!(f, "perfect"),
            Termination::Exhausted => write!(f, "exhausted"),
            Termination::Cancelled => write!(f, "cancelled"),
            Termination::DeadlineExceeded => write!(f, "deadline exceeded"),
        }
    }
}

/// One generate-then-analyze cycle. Never changed after it is scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attempt {
    pub index: u32,
    pub prompt_used: String,
    pub artifact_ref: Option<String>,
    pub raw_score: Option<u32>,
    pub errors: Vec<ErrorRecord>,
    /// `None` when the generator failed and nothing was scored
    pub final_score: Option<u32>,
    pub is_perfect: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replacements: Vec<Replacement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_error: Option<String>,
    pub duration_ms: u64,
}

impl Attempt {
    /// Attempt whose generation failed or timed out
    pub fn failed(index: u32, prompt: &AttemptPrompt, error: String, duration_ms: u64) -> Self {
        Self {
            index,
            prompt_used: prompt.text.clone(),
            artifact_ref: None,
            raw_score: None,
            errors: Vec::new(),
            final_score: None,
            is_perfect: false,
            replacements: prompt.replacements.clone(),
            generation_error: Some(error),
            duration_ms,
        }
    }

    pub fn is_scored(&self) -> bool {
        self.final_score.is_some()
    }
}

/// Index of the attempt to report: the perfect one if any, otherwise the
/// highest final score, earliest on ties. `None` if nothing was scored.
pub fn best_attempt(attempts: &[Attempt]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, attempt) in attempts.iter().enumerate() {
        if attempt.final_score.is_none() {
            continue;
        }
        if attempt.is_perfect {
            return Some(i);
        }
        match best {
            Some(b) if attempts[b].final_score >= attempt.final_score => {}
            _ => best = Some(i),
        }
    }
    best
}

/// Terminal result handed to the session's caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResult {
    pub success: bool,
    pub score: u32,
    pub attempts: u32,
    pub errors: Vec<ErrorRecord>,
    pub artifact_ref: Option<String>,
}

/// Full record of a finished session
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    pub session_id: String,
    pub template_id: String,
    pub termination: Termination,
    pub attempts: Vec<Attempt>,
    /// Index into `attempts` of the reported attempt
    pub best: usize,
    pub applied_fixes: Vec<AppliedFix>,
    pub fix_under_test: Option<String>,
    /// `None` when the learning update could not be persisted
    pub commit: Option<SessionCommit>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl SessionReport {
    pub fn best_attempt(&self) -> &Attempt {
        &self.attempts[self.best]
    }

    pub fn is_success(&self) -> bool {
        self.termination == Termination::Perfect
    }

    pub fn result(&self) -> SessionResult {
        let best = self.best_attempt();
        SessionResult {
            success: self.is_success(),
            score: best.final_score.unwrap_or(0),
            attempts: self.attempts.len() as u32,
            errors: best.errors.clone(),
            artifact_ref: best.artifact_ref.clone(),
        }
    }
}

async fn run_until<F: Future>(deadline: Option<Instant>, fut: F) -> Option<F::Output> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, fut).await.ok(),
        None => Some(fut.await),
    }
}

fn elapsed_ms(start: std::time::Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// Runs generation sessions against a generator, an analyzer and a shared
/// learning store.
pub struct AttemptController {
    generator: Arc<dyn Generator>,
    analyzer: Arc<dyn QualityAnalyzer>,
    store: Arc<LearningStore>,
    classifier: SeverityClassifier,
    settings: StrategySettings,
    options: GenerateOptions,
    policy: RetryPolicy,
    tracker: Option<Arc<PerformanceTracker>>,
}

impl AttemptController {
    pub fn new(
        generator: Arc<dyn Generator>,
        analyzer: Arc<dyn QualityAnalyzer>,
        store: Arc<LearningStore>,
    ) -> Self {
        Self {
            generator,
            analyzer,
            store,
            classifier: SeverityClassifier::default(),
            settings: StrategySettings::default(),
            options: GenerateOptions::default(),
            policy: RetryPolicy::default(),
            tracker: None,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_settings(mut self, settings: StrategySettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_options(mut self, options: GenerateOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_classifier(mut self, classifier: SeverityClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_tracker(mut self, tracker: Arc<PerformanceTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn store(&self) -> &Arc<LearningStore> {
        &self.store
    }

    /// Run one session to completion.
    ///
    /// Returns `Err` only when no attempt was scored.
    pub async fn run(&self, request: &GenerationRequest) -> Result<SessionReport, SessionError> {
        let policy = self.policy.for_request(request);
        let started_at = Utc::now();
        let clock = std::time::Instant::now();
        let session_deadline = policy.session_deadline(Instant::now());
        let template_id = request.template_id.as_str();

        info!(
            "Session for {} started (max {} attempts)",
            template_id, policy.max_attempts
        );

        let plan = self.prepare_fixes(template_id).await;
        let builder = PromptBuilder::new(
            &request.base_prompt,
            &plan.strategies(),
            &self.settings,
            self.store.terms().await,
        );
        let options = self.options.with_assets(request.assets.clone());

        let mut attempts: Vec<Attempt> = Vec::new();
        let mut feedback_errors: Vec<ErrorRecord> = Vec::new();
        let mut interrupted: Option<Termination> = None;
        let mut state = SessionState::Attempting(1);

        while let SessionState::Attempting(k) = state {
            if policy.cancel.is_cancelled() {
                interrupted = Some(Termination::Cancelled);
                break;
            }

            let prompt = builder.build(k, &feedback_errors);
            let attempt_clock = std::time::Instant::now();
            let attempt_deadline = policy.attempt_deadline(session_deadline);

            let outcome = tokio::select! {
                biased;
                _ = policy.cancel.cancelled() => None,
                res = run_until(attempt_deadline, self.execute_attempt(k, &prompt, template_id, &options)) => Some(res),
            };

            let attempt = match outcome {
                None => {
                    info!("Session for {} cancelled during attempt {}", template_id, k);
                    interrupted = Some(Termination::Cancelled);
                    break;
                }
                Some(Some(attempt)) => attempt,
                Some(None) => {
                    if session_deadline.is_some_and(|d| Instant::now() >= d) {
                        warn!("Session deadline for {} passed during attempt {}", template_id, k);
                        interrupted = Some(Termination::DeadlineExceeded);
                        break;
                    }
                    warn!("Attempt {} for {} timed out", k, template_id);
                    Attempt::failed(k, &prompt, "attempt timed out".to_string(), elapsed_ms(attempt_clock))
                }
            };

            if let Some(score) = attempt.final_score {
                info!(
                    "Attempt {}/{} for {}: {}% ({} errors)",
                    k,
                    policy.max_attempts,
                    template_id,
                    score,
                    attempt.errors.len()
                );
                // An analysis failure says nothing about the artifact; keep the last real errors
                let analysis_failed =
                    !attempt.errors.is_empty() && attempt.errors.iter().all(ErrorRecord::is_analysis_failure);
                if !analysis_failed {
                    feedback_errors = attempt
                        .errors
                        .iter()
                        .filter(|e| !e.is_analysis_failure())
                        .cloned()
                        .collect();
                }
            }

            state = after_attempt(k, policy.max_attempts, attempt.is_perfect);
            attempts.push(attempt);
        }

        let termination = interrupted.unwrap_or(match state {
            SessionState::Success => Termination::Perfect,
            _ => Termination::Exhausted,
        });

        let Some(best) = best_attempt(&attempts) else {
            warn!("Session for {} ended ({}) with no scored attempt", template_id, termination);
            return Err(match termination {
                Termination::Cancelled => SessionError::Cancelled,
                Termination::DeadlineExceeded => {
                    SessionError::DeadlineExceeded(policy.session_timeout.unwrap_or_default())
                }
                _ => SessionError::AllAttemptsFailed {
                    attempts: attempts.len() as u32,
                    last_error: attempts
                        .iter()
                        .rev()
                        .find_map(|a| a.generation_error.clone())
                        .unwrap_or_default(),
                },
            });
        };

        match termination {
            Termination::Perfect => info!("Perfect result for {} on attempt {}", template_id, attempts.len()),
            _ => info!(
                "Session for {} ended ({}); best attempt {} scored {}%",
                template_id,
                termination,
                attempts[best].index,
                attempts[best].final_score.unwrap_or(0)
            ),
        }

        let learning = session_learning(request, &attempts, &plan, termination);
        let commit = match self.store.record_session(template_id, &learning).await {
            Ok(commit) => {
                for term in &commit.promoted_terms {
                    info!("Term '{}' promoted to auto-replace", term);
                }
                Some(commit)
            }
            Err(e) => {
                warn!("Failed to save learning for {}: {:#}", template_id, e);
                None
            }
        };

        let report = SessionReport {
            session_id: uuid::Uuid::new_v4().to_string(),
            template_id: template_id.to_string(),
            termination,
            attempts,
            best,
            applied_fixes: plan.confirmed.clone(),
            fix_under_test: plan.under_test.as_ref().map(|f| f.error_key.clone()),
            commit,
            started_at,
            duration_ms: elapsed_ms(clock),
        };

        if let Some(tracker) = &self.tracker {
            tracker.record_report(&report).await;
        }

        Ok(report)
    }

    /// Trigger pending fixes and read back this session's plan
    async fn prepare_fixes(&self, template_id: &str) -> SessionPlan {
        match self.store.trigger_fixes(template_id).await {
            Ok(triggered) => {
                for fix in &triggered {
                    info!(
                        "Fix triggered for {}: [{}] {} -> {}",
                        template_id, fix.error_type, fix.error_issue, fix.strategy
                    );
                }
            }
            Err(e) => warn!("Failed to save triggered fixes for {}: {:#}", template_id, e),
        }

        let plan = self.store.session_plan(template_id).await;
        if !plan.is_empty() {
            debug!(
                "Applying {} confirmed fixes to {}, testing {:?}",
                plan.confirmed.len(),
                template_id,
                plan.under_test.as_ref().map(|f| &f.error_key)
            );
        }
        plan
    }

    async fn execute_attempt(
        &self,
        index: u32,
        prompt: &AttemptPrompt,
        template_id: &str,
        options: &GenerateOptions,
    ) -> Attempt {
        let clock = std::time::Instant::now();

        let artifact = match self.generator.generate(&prompt.text, options).await {
            Ok(artifact) => artifact,
            Err(e) => {
                warn!("Generation failed on attempt {} for {}: {:#}", index, template_id, e);
                return Attempt::failed(index, prompt, format!("{:#}", e), elapsed_ms(clock));
            }
        };

        let context = AnalysisContext {
            prompt: prompt.text.clone(),
            attempt: index,
        };
        let (raw_score, errors) = match self
            .analyzer
            .analyze(&artifact.artifact_ref, template_id, &context)
            .await
        {
            Ok(report) if report.success || !report.errors.is_empty() => {
                let errors = report
                    .errors
                    .into_iter()
                    .map(|e| ErrorRecord::classify_with(e, &self.classifier))
                    .collect();
                (report.raw_score, errors)
            }
            Ok(_) => (
                0,
                vec![ErrorRecord::analysis_failure("analyzer reported failure without errors")],
            ),
            Err(e) => {
                warn!("Analysis failed on attempt {} for {}: {:#}", index, template_id, e);
                (0, vec![ErrorRecord::analysis_failure(&format!("{:#}", e))])
            }
        };

        let quality = score(&errors, Some(raw_score));
        Attempt {
            index,
            prompt_used: prompt.text.clone(),
            artifact_ref: Some(artifact.artifact_ref),
            raw_score: Some(raw_score),
            errors,
            final_score: Some(quality.value),
            is_perfect: quality.is_perfect,
            replacements: prompt.replacements.clone(),
            generation_error: None,
            duration_ms: elapsed_ms(clock),
        }
    }
}

/// What a finished session teaches the learning store
fn session_learning(
    request: &GenerationRequest,
    attempts: &[Attempt],
    plan: &SessionPlan,
    termination: Termination,
) -> SessionLearning {
    let scored: Vec<&Attempt> = attempts.iter().filter(|a| a.is_scored()).collect();

    let attempt_errors = scored
        .iter()
        .map(|a| {
            a.errors
                .iter()
                .filter(|e| !e.is_analysis_failure())
                .map(|e| RawError::new(e.error_type.as_str(), e.issue.as_str()))
                .collect()
        })
        .collect();

    let mut term_failures: Vec<TermFailure> = Vec::new();
    for attempt in &scored {
        for failure in detect_term_failures(&attempt.errors, &request.base_prompt) {
            if !term_failures.iter().any(|f| f.term == failure.term) {
                term_failures.push(failure);
            }
        }
    }

    let fix_test = match termination {
        Termination::Perfect | Termination::Exhausted => plan.under_test.as_ref().map(|fix| FixTestOutcome {
            error_key: fix.error_key.clone(),
            success: termination == Termination::Perfect,
        }),
        _ => None,
    };

    SessionLearning {
        perfect: termination == Termination::Perfect,
        attempt_errors,
        fix_test,
        term_failures,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::{AnalysisReport, GeneratedArtifact, MockGenerator, MockQualityAnalyzer};
    use crate::learning::state::LearningPolicy;
    use crate::learning::store::MemoryBackend;
    use crate::prompt::FixStrategy;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn generator(times: usize) -> MockGenerator {
        let mut generator = MockGenerator::new();
        let mut n = 0;
        generator.expect_generate().times(times).returning(move |_, _| {
            n += 1;
            Ok(GeneratedArtifact::new(format!("artifact-{}", n)))
        });
        generator
    }

    fn analyzer(reports: Vec<AnalysisReport>) -> MockQualityAnalyzer {
        let mut analyzer = MockQualityAnalyzer::new();
        let mut n = 0;
        analyzer
            .expect_analyze()
            .times(reports.len())
            .returning(move |_, _, _| {
                n += 1;
                Ok(reports[n - 1].clone())
            });
        analyzer
    }

    fn controller(generator: MockGenerator, analyzer: MockQualityAnalyzer) -> AttemptController {
        let store = Arc::new(LearningStore::in_memory(LearningPolicy::default()));
        AttemptController::new(Arc::new(generator), Arc::new(analyzer), store)
    }

    fn report(errors: &[(&str, &str)]) -> AnalysisReport {
        AnalysisReport::new(
            50,
            errors.iter().map(|(t, i)| RawError::new(*t, *i)).collect(),
        )
    }

    #[test]
    fn test_transitions() {
        assert_eq!(after_attempt(1, 3, true), SessionState::Success);
        assert_eq!(after_attempt(3, 3, false), SessionState::Exhausted);
        assert_eq!(after_attempt(1, 3, false), SessionState::Attempting(2));
        assert!(SessionState::Exhausted.is_terminal());
        assert!(!SessionState::Idle.is_terminal());
    }

    #[test]
    fn test_best_attempt_earliest_tie() {
        let prompt = AttemptPrompt {
            text: "p".to_string(),
            replacements: Vec::new(),
        };
        let scored = |index: u32, score: u32| Attempt {
            final_score: Some(score),
            generation_error: None,
            ..Attempt::failed(index, &prompt, String::new(), 0)
        };
        let attempts = vec![
            Attempt::failed(1, &prompt, "down".to_string(), 0),
            scored(2, 90),
            scored(3, 92),
            scored(4, 92),
        ];
        assert_eq!(best_attempt(&attempts), Some(2));
        assert_eq!(best_attempt(&attempts[..1]), None);
    }

    #[tokio::test]
    async fn test_stops_on_perfect_attempt() {
        let controller = controller(
            generator(3),
            analyzer(vec![
                report(&[("layout_issue", "header overlaps rates")]),
                report(&[("spacing", "uneven gaps")]),
                AnalysisReport::perfect(),
            ]),
        );
        let request = GenerationRequest::new("rate-sheet", "Economic Outlook").with_max_attempts(3);

        let report = controller.run(&request).await.unwrap();
        let result = report.result();

        assert!(result.success);
        assert_eq!(result.score, 100);
        assert_eq!(result.attempts, 3);
        assert_eq!(report.attempts[0].final_score, Some(90));
        assert_eq!(report.attempts[1].final_score, Some(97));
        assert!(report.attempts[1].prompt_used.contains("[LAYOUT_ISSUE] header overlaps rates"));
        assert!(!report.attempts[2].prompt_used.contains("[LAYOUT_ISSUE]"));
        assert!(report.attempts[2].prompt_used.contains("[SPACING] uneven gaps"));
    }

    #[tokio::test]
    async fn test_exhausted_reports_best() {
        let typo = ("typo", "OUTLOK instead of OUTLOOK");
        let controller = controller(
            generator(5),
            analyzer(vec![
                report(&[("spelling_error", "RAETS"), typo]),
                report(&[("layout_issue", "crowded")]),
                report(&[
                    ("font_size", "footer small"),
                    ("spacing", "uneven"),
                    ("minor", "faint shadow"),
                    ("minor", "slight tilt"),
                ]),
                report(&[typo, ("layout_issue", "crowded")]),
                report(&[("spelling_error", "RAETS")]),
            ]),
        );
        let request = GenerationRequest::new("rate-sheet", "Economic Outlook");

        let report = controller.run(&request).await.unwrap();
        let result = report.result();

        assert!(!result.success);
        assert_eq!(report.termination, Termination::Exhausted);
        assert_eq!(result.attempts, 5);
        assert_eq!(result.score, 92);
        assert_eq!(report.best_attempt().index, 3);
        assert_eq!(result.errors.len(), 4);
        assert_eq!(result.artifact_ref.as_deref(), Some("artifact-3"));

        let template = controller.store().template_state("rate-sheet").await.unwrap();
        assert_eq!(template.total_generations, 1);
        assert_eq!(template.perfect_generations, 0);
        assert_eq!(template.error_patterns["typo:OUTLOK instead of OUTLOOK"].count, 2);
        assert_eq!(template.error_patterns["layout_issue:crowded"].count, 2);

        let terms = controller.store().terms().await;
        assert_eq!(terms.get("outlook").unwrap().failure_count, 1);
    }

    #[tokio::test]
    async fn test_generator_failure_is_skipped() {
        let mut generator = MockGenerator::new();
        let mut n = 0;
        generator.expect_generate().times(2).returning(move |_, _| {
            n += 1;
            if n == 1 {
                anyhow::bail!("backend unavailable")
            }
            Ok(GeneratedArtifact::new("artifact"))
        });
        let controller = controller(generator, analyzer(vec![AnalysisReport::perfect()]));
        let request = GenerationRequest::new("promo", "Spring sale").with_max_attempts(3);

        let report = controller.run(&request).await.unwrap();
        assert!(report.is_success());
        assert_eq!(report.attempts.len(), 2);
        assert!(report.attempts[0].generation_error.is_some());
        assert_eq!(report.best_attempt().index, 2);
    }

    #[tokio::test]
    async fn test_all_generator_failures_surface() {
        let mut generator = MockGenerator::new();
        generator
            .expect_generate()
            .times(2)
            .returning(|_, _| anyhow::bail!("quota exceeded"));
        let mut analyzer = MockQualityAnalyzer::new();
        analyzer.expect_analyze().never();
        let controller = controller(generator, analyzer);
        let request = GenerationRequest::new("promo", "Spring sale").with_max_attempts(2);

        let err = controller.run(&request).await.unwrap_err();
        match err {
            SessionError::AllAttemptsFailed { attempts, last_error } => {
                assert_eq!(attempts, 2);
                assert!(last_error.contains("quota exceeded"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(controller.store().template_state("promo").await.is_none());
    }

    #[tokio::test]
    async fn test_analyzer_failure_scores_zero() {
        let mut analyzer = MockQualityAnalyzer::new();
        analyzer
            .expect_analyze()
            .times(1)
            .returning(|_, _, _| anyhow::bail!("vision model timeout"));
        let controller = controller(generator(1), analyzer);
        let request = GenerationRequest::new("promo", "Spring sale").with_max_attempts(1);

        let report = controller.run(&request).await.unwrap();
        let attempt = report.best_attempt();
        assert_eq!(attempt.final_score, Some(80));
        assert!(attempt.errors[0].is_analysis_failure());

        let template = controller.store().template_state("promo").await.unwrap();
        assert!(template.error_patterns.is_empty());
        assert_eq!(template.total_generations, 1);
    }

    #[tokio::test]
    async fn test_failed_report_without_errors_is_analysis_failure() {
        let failed = AnalysisReport {
            raw_score: 95,
            errors: Vec::new(),
            success: false,
        };
        let controller = controller(generator(1), analyzer(vec![failed]));
        let request = GenerationRequest::new("promo", "Spring sale").with_max_attempts(1);

        let report = controller.run(&request).await.unwrap();
        let attempt = report.best_attempt();
        assert_eq!(attempt.raw_score, Some(0));
        assert_eq!(attempt.final_score, Some(80));
        assert!(!attempt.is_perfect);
        assert_eq!(attempt.errors.len(), 1);
        assert!(attempt.errors[0].is_analysis_failure());
        assert_eq!(report.termination, Termination::Exhausted);

        let template = controller.store().template_state("promo").await.unwrap();
        assert!(template.error_patterns.is_empty());
    }

    #[tokio::test]
    async fn test_failed_report_with_errors_is_kept() {
        let failed = AnalysisReport {
            raw_score: 40,
            errors: vec![RawError::new("layout_issue", "rates table cut off")],
            success: false,
        };
        let controller = controller(generator(1), analyzer(vec![failed]));
        let request = GenerationRequest::new("promo", "Spring sale").with_max_attempts(1);

        let report = controller.run(&request).await.unwrap();
        let attempt = report.best_attempt();
        assert_eq!(attempt.raw_score, Some(40));
        assert_eq!(attempt.final_score, Some(90));
        assert_eq!(attempt.errors.len(), 1);
        assert!(!attempt.errors[0].is_analysis_failure());

        let template = controller.store().template_state("promo").await.unwrap();
        assert_eq!(template.error_patterns["layout_issue:rates table cut off"].count, 1);
    }

    #[tokio::test]
    async fn test_analyzer_failure_keeps_previous_feedback() {
        let mut analyzer = MockQualityAnalyzer::new();
        let mut n = 0;
        analyzer.expect_analyze().times(3).returning(move |_, _, _| {
            n += 1;
            match n {
                1 => Ok(report(&[("layout_issue", "header overlaps rates")])),
                2 => anyhow::bail!("vision model timeout"),
                _ => Ok(AnalysisReport::perfect()),
            }
        });
        let controller = controller(generator(3), analyzer);
        let request = GenerationRequest::new("rate-sheet", "Economic Outlook").with_max_attempts(3);

        let report = controller.run(&request).await.unwrap();
        assert!(report.is_success());
        assert!(report.attempts[1].prompt_used.contains("[LAYOUT_ISSUE] header overlaps rates"));
        assert!(report.attempts[2].prompt_used.contains("[LAYOUT_ISSUE] header overlaps rates"));
        assert!(!report.attempts[2].prompt_used.to_lowercase().contains("vision model timeout"));
    }

    #[tokio::test]
    async fn test_persistence_failure_does_not_fail_session() {
        let store = Arc::new(
            LearningStore::open(Arc::new(MemoryBackend::failing()), LearningPolicy::default()).unwrap(),
        );
        let controller = AttemptController::new(
            Arc::new(generator(1)),
            Arc::new(analyzer(vec![AnalysisReport::perfect()])),
            store,
        );
        let report = controller
            .run(&GenerationRequest::new("promo", "Spring sale"))
            .await
            .unwrap();
        assert!(report.is_success());
        assert!(report.commit.is_none());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let token = CancellationToken::new();
        token.cancel();
        let mut generator = MockGenerator::new();
        generator.expect_generate().never();
        let controller = controller(generator, MockQualityAnalyzer::new())
            .with_policy(RetryPolicy::new(3).with_cancel(token));

        let err = controller.run(&GenerationRequest::new("promo", "Sale")).await.unwrap_err();
        assert!(matches!(err, SessionError::Cancelled));
    }

    #[tokio::test]
    async fn test_fix_under_test_confirmed() {
        let store = Arc::new(LearningStore::in_memory(LearningPolicy::default()));
        let typo = || report(&[("typo", "OUTLOK instead of OUTLOOK")]);

        // Two sessions with the typo trigger a fix on the third.
        for _ in 0..2 {
            let controller = AttemptController::new(
                Arc::new(generator(1)),
                Arc::new(analyzer(vec![typo()])),
                store.clone(),
            );
            let request = GenerationRequest::new("rate-sheet", "Economic Outlook").with_max_attempts(1);
            controller.run(&request).await.unwrap();
        }

        for round in 0..2 {
            let controller = AttemptController::new(
                Arc::new(generator(1)),
                Arc::new(analyzer(vec![AnalysisReport::perfect()])),
                store.clone(),
            );
            let request = GenerationRequest::new("rate-sheet", "Economic Outlook").with_max_attempts(1);
            let report = controller.run(&request).await.unwrap();
            assert_eq!(report.fix_under_test.as_deref(), Some("typo:OUTLOK instead of OUTLOOK"));
            assert!(report.attempts[0].prompt_used.contains("CAPS"));
            assert_eq!(report.commit.unwrap().newly_confirmed.is_some(), round == 1);
        }

        let template = store.template_state("rate-sheet").await.unwrap();
        let pattern = &template.error_patterns["typo:OUTLOK instead of OUTLOOK"];
        assert_eq!(pattern.fix_strategy, Some(FixStrategy::SimplifyText));
        assert!(pattern.fix_confirmed);
        assert_eq!(pattern.fix_test_count, 2);
        assert_eq!(store.session_plan("rate-sheet").await.confirmed.len(), 1);
    }

    #[tokio::test]
    async fn test_attempt_timeout_moves_on() {
        struct Slow;
        #[async_trait::async_trait]
        impl Generator for Slow {
            async fn generate(&self, _: &str, _: &GenerateOptions) -> anyhow::Result<GeneratedArtifact> {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(GeneratedArtifact::new("late"))
            }
        }

        let store = Arc::new(LearningStore::in_memory(LearningPolicy::default()));
        let controller = AttemptController::new(Arc::new(Slow), Arc::new(MockQualityAnalyzer::new()), store)
            .with_policy(RetryPolicy::new(2).with_attempt_timeout(Duration::from_millis(20)));

        let request = GenerationRequest::new("promo", "Sale").with_max_attempts(2);
        let err = controller.run(&request).await.unwrap_err();
        match err {
            SessionError::AllAttemptsFailed { attempts, last_error } => {
                assert_eq!(attempts, 2);
                assert_eq!(last_error, "attempt timed out");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_session_deadline_keeps_scored_attempt() {
        struct SlowAfterFirst(std::sync::atomic::AtomicUsize);
        #[async_trait::async_trait]
        impl Generator for SlowAfterFirst {
            async fn generate(&self, _: &str, _: &GenerateOptions) -> anyhow::Result<GeneratedArtifact> {
                if self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst) > 0 {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                }
                Ok(GeneratedArtifact::new("first"))
            }
        }

        let store = Arc::new(LearningStore::in_memory(LearningPolicy::default()));
        let controller = AttemptController::new(
            Arc::new(SlowAfterFirst(Default::default())),
            Arc::new(analyzer(vec![report(&[("spacing", "uneven")])])),
            store,
        )
        .with_policy(RetryPolicy::new(5).with_session_timeout(Duration::from_millis(200)));

        let report = controller.run(&GenerationRequest::new("promo", "Sale")).await.unwrap();
        assert_eq!(report.termination, Termination::DeadlineExceeded);
        assert_eq!(report.attempts.len(), 1);
        assert_eq!(report.result().score, 97);
        assert_eq!(report.commit.unwrap().template_success_rate, 0.0);
    }
}
