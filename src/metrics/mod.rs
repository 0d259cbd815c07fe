//! Performance tracking
//!
//! Process-local metrics about sessions: attempts needed per template,
//! attempt timing and success rates. Persistent learning lives in
//! `crate::learning`.

pub mod execution;

pub use execution::{ExecutionMetrics, PerformanceTracker, SessionRecord, TemplateMetrics};
