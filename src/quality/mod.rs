//! Error severity classification and quality scoring

pub mod severity;
pub mod scorer;

pub use severity::{classify, SeverityClassifier, SeverityRule, SeverityTier};
pub use scorer::{score, severity_breakdown, QualityScore, PERFECT_SCORE};
