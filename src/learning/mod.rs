//! Cross-session learning
//!
//! Tracks recurring error patterns per template, assigns each one a fix
//! strategy once it recurs, confirms fixes that keep working, and promotes
//! words the generator keeps misspelling to automatic substitution.

pub mod detector;
pub mod pattern;
pub mod state;
pub mod store;
pub mod terms;

pub use detector::{detect_term_failures, TermFailure};
pub use pattern::{ErrorPattern, FixStatus};
pub use state::{
    AppliedFix, FixTestOutcome, GlobalLearningState, LearningPolicy, LearningSnapshot,
    PerformanceSummary, SessionCommit, SessionLearning, SessionPlan, TemplateLearningState,
    TemplateSummary,
};
pub use store::{JsonFileBackend, LearningBackend, LearningStore, MemoryBackend};
pub use terms::{ProblematicTerm, TermRegistry, TermSeverity, TermStats};
