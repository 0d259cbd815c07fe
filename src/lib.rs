//! Adaptive QC - quality control for generated marketing artifacts
//!
//! Drives a generative backend through a bounded retry loop:
//! - Severity-weighted scoring of analyzer errors
//! - Feedback-driven prompt correction between attempts
//! - Proactive substitution of words the generator keeps misspelling
//! - Cross-session learning that assigns, tests and confirms prompt fixes
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use adaptive_qc::{AttemptController, Config, GenerationRequest, HttpAnalyzer, HttpGenerator, LearningStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let store = Arc::new(LearningStore::open_file(config.store_path()?, config.learning_policy())?);
//!     let generator = HttpGenerator::new(&config.backend.generator_url, config.request_timeout())?;
//!     let analyzer = HttpAnalyzer::new(&config.backend.analyzer_url, config.request_timeout())?;
//!     let controller = AttemptController::new(Arc::new(generator), Arc::new(analyzer), store)
//!         .with_policy(config.retry_policy());
//!
//!     let report = controller.run(&GenerationRequest::new("rate-sheet", "Economic Outlook")).await?;
//!     println!("{}", serde_json::to_string_pretty(&report.result())?);
//!     Ok(())
//! }
//! ```

// Core modules
pub mod types;
pub mod quality;
pub mod prompt;
pub mod learning;
pub mod generation;
pub mod metrics;
pub mod config;
pub mod cli;

// Re-export commonly used types for convenience
pub use types::{ErrorRecord, GenerationRequest, RawError};

pub use quality::{score, QualityScore, SeverityClassifier, SeverityTier};

pub use learning::{LearningPolicy, LearningStore, TermRegistry};

pub use generation::{
    AttemptController,
    Generator,
    HttpAnalyzer,
    HttpGenerator,
    QualityAnalyzer,
    RetryPolicy,
    SessionError,
    SessionReport,
    SessionResult,
};

pub use metrics::PerformanceTracker;

pub use config::Config;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get the library info
pub fn info() -> String {
    format!("{} v{} - Adaptive generation quality control", NAME, VERSION)
}
