//! Error patterns and their fix lifecycle
//!
//! A pattern is a recurring `type:issue` signature within one template.
//! Lifecycle: observed -> fix attempted (strategy assigned once) -> confirmed
//! after consecutive successful fix tests. Patterns are never deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::prompt::strategy::FixStrategy;

/// Where a pattern is in its fix lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixStatus {
    /// Seen, no fix assigned yet
    Observed,
    /// Strategy assigned, not yet confirmed
    UnderTest,
    Confirmed,
}

impl std::fmt::Display for FixStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FixStatus::Observed => write!(f, "observed"),
            FixStatus::UnderTest => write!(f, "under test"),
            FixStatus::Confirmed => write!(f, "confirmed"),
        }
    }
}

/// Persistent record of a recurring error signature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPattern {
    pub error_type: String,
    pub error_issue: String,
    pub count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    #[serde(default)]
    pub fix_attempted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix_strategy: Option<FixStrategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix_started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub fix_test_count: u32,
    #[serde(default)]
    pub consecutive_successes: u32,
    #[serde(default)]
    pub fix_confirmed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix_confirmed_at: Option<DateTime<Utc>>,
}

impl ErrorPattern {
    /// A pattern that has not been counted yet
    pub fn new(error_type: &str, error_issue: &str, now: DateTime<Utc>) -> Self {
        Self {
            error_type: error_type.to_string(),
            error_issue: error_issue.to_string(),
            count: 0,
            first_seen: now,
            last_seen: now,
            fix_attempted: false,
            fix_strategy: None,
            fix_started_at: None,
            fix_test_count: 0,
            consecutive_successes: 0,
            fix_confirmed: false,
            fix_confirmed_at: None,
        }
    }

    /// Count one more attempt in which this signature appeared
    pub fn record_occurrence(&mut self, now: DateTime<Utc>) {
        self.count += 1;
        self.last_seen = now;
    }

    pub fn status(&self) -> FixStatus {
        if self.fix_confirmed {
            FixStatus::Confirmed
        } else if self.fix_attempted {
            FixStatus::UnderTest
        } else {
            FixStatus::Observed
        }
    }

    /// Whether this pattern is due for its one strategy assignment
    pub fn needs_fix(&self, trigger_count: u64) -> bool {
        self.count >= trigger_count && !self.fix_attempted
    }

    /// Assign the fix strategy. Returns false if one was already assigned.
    pub fn assign_fix(&mut self, strategy: FixStrategy, now: DateTime<Utc>) -> bool {
        if self.fix_attempted {
            return false;
        }
        self.fix_attempted = true;
        self.fix_strategy = Some(strategy);
        self.fix_started_at = Some(now);
        true
    }

    /// Record the outcome of a session that tested this pattern's fix.
    ///
    /// Returns true when this outcome confirmed the fix. A failure resets the
    /// consecutive-success streak; confirmation is never revoked.
    pub fn record_fix_test(&mut self, success: bool, required: u32, now: DateTime<Utc>) -> bool {
        self.fix_test_count += 1;
        if success {
            self.consecutive_successes += 1;
        } else {
            self.consecutive_successes = 0;
        }

        if !self.fix_confirmed && self.consecutive_successes >= required.max(1) {
            self.fix_confirmed = true;
            self.fix_confirmed_at = Some(now);
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern() -> ErrorPattern {
        ErrorPattern::new("typo", "OUTLOK instead of OUTLOOK", Utc::now())
    }

    #[test]
    fn test_occurrences_only_increase() {
        let mut p = pattern();
        assert_eq!(p.count, 0);
        p.record_occurrence(Utc::now());
        p.record_occurrence(Utc::now());
        assert_eq!(p.count, 2);
        assert!(p.last_seen >= p.first_seen);
    }

    #[test]
    fn test_fix_assigned_once() {
        let mut p = pattern();
        p.count = 2;
        assert!(p.needs_fix(2));
        assert!(p.assign_fix(FixStrategy::SimplifyText, Utc::now()));
        assert!(!p.needs_fix(2));
        assert!(!p.assign_fix(FixStrategy::ForceQuotes, Utc::now()));
        assert_eq!(p.fix_strategy, Some(FixStrategy::SimplifyText));
        assert_eq!(p.status(), FixStatus::UnderTest);
    }

    #[test]
    fn test_confirmation_requires_consecutive_successes() {
        let mut p = pattern();
        p.assign_fix(FixStrategy::SimplifyText, Utc::now());

        assert!(!p.record_fix_test(true, 2, Utc::now()));
        assert!(!p.record_fix_test(false, 2, Utc::now()));
        assert_eq!(p.consecutive_successes, 0);
        assert!(!p.fix_confirmed);

        assert!(!p.record_fix_test(true, 2, Utc::now()));
        assert!(p.record_fix_test(true, 2, Utc::now()));
        assert!(p.fix_confirmed);
        assert!(p.fix_confirmed_at.is_some());
        assert_eq!(p.fix_test_count, 4);
        assert_eq!(p.status(), FixStatus::Confirmed);
    }

    #[test]
    fn test_confirmation_not_revoked() {
        let mut p = pattern();
        p.record_fix_test(true, 2, Utc::now());
        p.record_fix_test(true, 2, Utc::now());
        assert!(!p.record_fix_test(false, 2, Utc::now()));
        assert!(p.fix_confirmed);
    }

    #[test]
    fn test_legacy_record_deserializes() {
        let json = r#"{
            "errorType": "typo",
            "errorIssue": "x",
            "count": 3,
            "firstSeen": "2025-10-29T10:00:00Z",
            "lastSeen": "2025-10-29T11:00:00Z",
            "fixAttempted": false,
            "fixConfirmed": false,
            "fixTestCount": 0
        }"#;
        let p: ErrorPattern = serde_json::from_str(json).unwrap();
        assert_eq!(p.count, 3);
        assert_eq!(p.consecutive_successes, 0);
        assert_eq!(p.status(), FixStatus::Observed);
    }
}
