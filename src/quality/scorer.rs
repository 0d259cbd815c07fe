//! Quality scoring
//!
//! With no errors the analyzer's raw score stands. With errors the score is
//! recomputed from severity weights and the raw score is ignored.

use serde::{Deserialize, Serialize};

use super::severity::SeverityTier;
use crate::types::ErrorRecord;

pub const PERFECT_SCORE: u32 = 100;

/// Final score for one attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityScore {
    pub value: u32,
    pub is_perfect: bool,
    /// True when the value came from severity weights rather than the analyzer
    pub recomputed: bool,
}

/// Score an attempt from its classified errors and the analyzer's raw score.
///
/// A missing raw score counts as zero. Raw scores above 100 are clamped.
pub fn score(errors: &[ErrorRecord], raw_score: Option<u32>) -> QualityScore {
    if errors.is_empty() {
        let value = raw_score.unwrap_or(0).min(PERFECT_SCORE);
        return QualityScore {
            value,
            is_perfect: value == PERFECT_SCORE,
            recomputed: false,
        };
    }

    let deductions: u32 = errors.iter().map(ErrorRecord::weight).sum();
    QualityScore {
        value: PERFECT_SCORE.saturating_sub(deductions),
        is_perfect: false,
        recomputed: true,
    }
}

/// Error counts per severity tier, most severe first
pub fn severity_breakdown(errors: &[ErrorRecord]) -> Vec<(SeverityTier, usize)> {
    SeverityTier::all()
        .into_iter()
        .map(|tier| (tier, errors.iter().filter(|e| e.severity == tier).count()))
        .filter(|(_, count)| *count > 0)
        .collect()
}
