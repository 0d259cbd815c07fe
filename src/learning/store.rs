//! Learning Store - persistent cross-session learning state
//!
//! The state is loaded once per process and shared by every session through
//! an `Arc<LearningStore>`. Persistence sits behind `LearningBackend`, a
//! whole-snapshot key-value contract: `load` returns the last saved snapshot,
//! `save` replaces it.
//!
//! Concurrency: single process, single writer. Every read-modify-write runs
//! under the store's write lock and persists before the lock is released, so
//! concurrent sessions in one process serialize their updates. Two processes
//! sharing one backing file are not supported.

use anyhow::{Context, Result};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::state::{
    AppliedFix, LearningPolicy, LearningSnapshot, PerformanceSummary, SessionCommit,
    SessionLearning, SessionPlan, TemplateLearningState,
};
use super::terms::{ProblematicTerm, TermRegistry, TermStats};

/// Whole-snapshot persistence contract
pub trait LearningBackend: Send + Sync {
    /// Last saved snapshot, or `None` if nothing was ever saved
    fn load(&self) -> Result<Option<LearningSnapshot>>;

    /// Replace the stored snapshot
    fn save(&self, snapshot: &LearningSnapshot) -> Result<()>;

    /// Human-readable location, for logs
    fn describe(&self) -> String;
}

/// JSON file backend. Saves go to a temp file that is renamed into place.
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LearningBackend for JsonFileBackend {
    fn load(&self) -> Result<Option<LearningSnapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        let snapshot = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", self.path.display()))?;
        Ok(Some(snapshot))
    }

    fn save(&self, snapshot: &LearningSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }
        let json = serde_json::to_string_pretty(snapshot).context("Failed to serialize learning state")?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-memory backend, for tests and ephemeral runs
#[derive(Default)]
pub struct MemoryBackend {
    saved: Mutex<Option<LearningSnapshot>>,
    saves: AtomicUsize,
    fail_saves: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend pre-loaded with a snapshot
    pub fn with_snapshot(snapshot: LearningSnapshot) -> Self {
        Self {
            saved: Mutex::new(Some(snapshot)),
            ..Default::default()
        }
    }

    /// Backend whose saves always fail
    pub fn failing() -> Self {
        let backend = Self::default();
        backend.fail_saves.store(true, Ordering::Relaxed);
        backend
    }

    pub fn saved(&self) -> Option<LearningSnapshot> {
        self.saved.lock().ok().and_then(|s| s.clone())
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::Relaxed)
    }
}

impl LearningBackend for MemoryBackend {
    fn load(&self) -> Result<Option<LearningSnapshot>> {
        Ok(self.saved())
    }

    fn save(&self, snapshot: &LearningSnapshot) -> Result<()> {
        if self.fail_saves.load(Ordering::Relaxed) {
            anyhow::bail!("memory backend configured to fail saves");
        }
        let mut saved = self
            .saved
            .lock()
            .map_err(|_| anyhow::anyhow!("memory backend lock poisoned"))?;
        *saved = Some(snapshot.clone());
        self.saves.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// Shared learning store
pub struct LearningStore {
    state: RwLock<LearningSnapshot>,
    backend: Arc<dyn LearningBackend>,
    policy: LearningPolicy,
}

impl LearningStore {
    /// Load the state from `backend`, or start fresh if it holds nothing
    pub fn open(backend: Arc<dyn LearningBackend>, policy: LearningPolicy) -> Result<Self> {
        let snapshot = match backend.load()? {
            Some(snapshot) => {
                info!("Learning database loaded from {}", backend.describe());
                snapshot
            }
            None => {
                info!("New learning database at {}", backend.describe());
                LearningSnapshot::default()
            }
        };
        Ok(Self {
            state: RwLock::new(snapshot),
            backend,
            policy,
        })
    }

    /// Store backed by a JSON file
    pub fn open_file(path: impl Into<PathBuf>, policy: LearningPolicy) -> Result<Self> {
        Self::open(Arc::new(JsonFileBackend::new(path)), policy)
    }

    /// Fresh store that keeps everything in memory
    pub fn in_memory(policy: LearningPolicy) -> Self {
        Self {
            state: RwLock::new(LearningSnapshot::default()),
            backend: Arc::new(MemoryBackend::new()),
            policy,
        }
    }

    pub fn policy(&self) -> &LearningPolicy {
        &self.policy
    }

    /// Assign strategies to patterns that crossed the trigger count.
    ///
    /// In-memory changes stand even when persisting fails; the error reports
    /// the failed save only.
    pub async fn trigger_fixes(&self, template_id: &str) -> Result<Vec<AppliedFix>> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let Some(template) = state.templates.get_mut(template_id) else {
            return Ok(Vec::new());
        };
        let triggered = template.trigger_fixes(self.policy.fix_trigger_count, now);
        if triggered.is_empty() {
            return Ok(triggered);
        }
        state.last_updated = now;
        self.backend.save(&state).context("Failed to persist triggered fixes")?;
        Ok(triggered)
    }

    /// Fixes to apply to the next session of `template_id`
    pub async fn session_plan(&self, template_id: &str) -> SessionPlan {
        let state = self.state.read().await;
        state.template(template_id).map(|t| t.plan()).unwrap_or_default()
    }

    /// Fold a finished session into the state and persist it.
    ///
    /// In-memory changes stand even when persisting fails.
    pub async fn record_session(&self, template_id: &str, session: &SessionLearning) -> Result<SessionCommit> {
        let mut state = self.state.write().await;
        let commit = state.apply_session(template_id, session, &self.policy, Utc::now());

        info!(
            "Learning stats - {}: success rate {:.1}%, global {:.1}% (target {:.0}%)",
            template_id,
            commit.template_success_rate,
            commit.global_success_rate,
            self.policy.target_success_rate
        );

        self.backend.save(&state).context("Failed to persist session learning")?;
        debug!("Learning state saved to {}", self.backend.describe());
        Ok(commit)
    }

    /// Session snapshot of the problematic-term registry
    pub async fn terms(&self) -> TermRegistry {
        self.state.read().await.problematic_terms.clone()
    }

    pub async fn term_stats(&self) -> TermStats {
        self.state.read().await.problematic_terms.stats()
    }

    /// Record one failure of `term` outside a session
    pub async fn record_term_failure(&self, term: &str, misspelling: &str) -> Result<ProblematicTerm> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let updated = state
            .problematic_terms
            .record_failure(term, misspelling, self.policy.auto_replace_threshold, now)
            .clone();
        state.last_updated = now;
        self.backend.save(&state).context("Failed to persist term failure")?;
        Ok(updated)
    }

    pub async fn add_term_alternatives(&self, term: &str, alternatives: &[String]) -> Result<ProblematicTerm> {
        let mut state = self.state.write().await;
        let updated = state.problematic_terms.add_alternatives(term, alternatives).clone();
        state.last_updated = Utc::now();
        self.backend.save(&state).context("Failed to persist term alternatives")?;
        Ok(updated)
    }

    pub async fn performance_summary(&self) -> PerformanceSummary {
        self.state
            .read()
            .await
            .performance_summary(self.policy.target_success_rate)
    }

    pub async fn template_state(&self, template_id: &str) -> Option<TemplateLearningState> {
        self.state.read().await.template(template_id).cloned()
    }

    pub async fn snapshot(&self) -> LearningSnapshot {
        self.state.read().await.clone()
    }
}
