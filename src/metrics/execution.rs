//! Session execution metrics
//!
//! In-memory, per-template statistics gathered from finished sessions:
//! how many attempts a template needs, how long attempts take, and how
//! often sessions reach a perfect score.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::generation::SessionReport;

/// A single finished session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: String,
    pub template_id: String,
    pub started_at: DateTime<Utc>,
    pub attempts: u32,
    pub success: bool,
    pub best_score: u32,
    /// Duration of each attempt in milliseconds
    pub attempt_durations_ms: Vec<u64>,
    pub duration_ms: u64,
}

impl SessionRecord {
    pub fn from_report(report: &SessionReport) -> Self {
        Self {
            session_id: report.session_id.clone(),
            template_id: report.template_id.clone(),
            started_at: report.started_at,
            attempts: report.attempts.len() as u32,
            success: report.is_success(),
            best_score: report.best_attempt().final_score.unwrap_or(0),
            attempt_durations_ms: report.attempts.iter().map(|a| a.duration_ms).collect(),
            duration_ms: report.duration_ms,
        }
    }
}

/// Aggregated metrics for one template
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateMetrics {
    pub sessions: u64,
    pub successful: u64,
    pub total_attempts: u64,
    pub avg_attempts: f64,
    pub avg_attempt_duration_ms: f64,
    pub best_score: u32,
    pub last_score: u32,
}

impl TemplateMetrics {
    pub fn success_rate(&self) -> f64 {
        if self.sessions == 0 {
            0.0
        } else {
            self.successful as f64 / self.sessions as f64
        }
    }
}

/// Metrics across every template seen by this process
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionMetrics {
    pub templates: HashMap<String, TemplateMetrics>,
    pub total_sessions: u64,
    pub overall_success_rate: f64,
    pub average_attempts: f64,
    pub tracking_since: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

/// Shared performance tracker
pub struct PerformanceTracker {
    metrics: Arc<RwLock<ExecutionMetrics>>,
    recent: Arc<RwLock<VecDeque<SessionRecord>>>,
    max_recent: usize,
}

impl PerformanceTracker {
    pub fn new() -> Self {
        Self::with_capacity(500)
    }

    /// Tracker that keeps at most `max_recent` session records
    pub fn with_capacity(max_recent: usize) -> Self {
        Self {
            metrics: Arc::new(RwLock::new(ExecutionMetrics {
                tracking_since: Utc::now(),
                last_updated: Utc::now(),
                ..Default::default()
            })),
            recent: Arc::new(RwLock::new(VecDeque::new())),
            max_recent: max_recent.max(1),
        }
    }

    pub async fn record_report(&self, report: &SessionReport) {
        self.record(SessionRecord::from_report(report)).await;
    }

    /// Record a finished session
    pub async fn record(&self, record: SessionRecord) {
        let mut metrics = self.metrics.write().await;
        let mut recent = self.recent.write().await;

        let template = metrics.templates.entry(record.template_id.clone()).or_default();
        let previous_attempts = template.total_attempts as f64;
        template.sessions += 1;
        if record.success {
            template.successful += 1;
        }
        template.total_attempts += record.attempts as u64;
        template.avg_attempts = template.total_attempts as f64 / template.sessions as f64;

        if template.total_attempts > 0 {
            let added: u64 = record.attempt_durations_ms.iter().sum();
            template.avg_attempt_duration_ms =
                (template.avg_attempt_duration_ms * previous_attempts + added as f64) / template.total_attempts as f64;
        }
        template.best_score = template.best_score.max(record.best_score);
        template.last_score = record.best_score;

        metrics.total_sessions += 1;
        let successful: u64 = metrics.templates.values().map(|t| t.successful).sum();
        let attempts: u64 = metrics.templates.values().map(|t| t.total_attempts).sum();
        metrics.overall_success_rate = successful as f64 / metrics.total_sessions as f64;
        metrics.average_attempts = attempts as f64 / metrics.total_sessions as f64;
        metrics.last_updated = Utc::now();

        debug!(
            "Recorded session for {}: {} attempts, best {}%",
            record.template_id, record.attempts, record.best_score
        );

        recent.push_back(record);
        if recent.len() > self.max_recent {
            recent.pop_front();
        }
    }

    pub async fn metrics(&self) -> ExecutionMetrics {
        self.metrics.read().await.clone()
    }

    pub async fn template(&self, template_id: &str) -> Option<TemplateMetrics> {
        self.metrics.read().await.templates.get(template_id).cloned()
    }

    pub async fn recent(&self) -> Vec<SessionRecord> {
        self.recent.read().await.iter().cloned().collect()
    }

    /// Average attempts per template, most demanding first
    pub async fn average_attempts(&self) -> Vec<(String, f64)> {
        let metrics = self.metrics.read().await;
        let mut templates: Vec<_> = metrics
            .templates
            .iter()
            .map(|(name, t)| (name.clone(), t.avg_attempts))
            .collect();
        templates.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        templates
    }
}

impl Default for PerformanceTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(template_id: &str, attempts: u32, success: bool, best_score: u32) -> SessionRecord {
        SessionRecord {
            session_id: uuid::Uuid::new_v4().to_string(),
            template_id: template_id.to_string(),
            started_at: Utc::now(),
            attempts,
            success,
            best_score,
            attempt_durations_ms: vec![100; attempts as usize],
            duration_ms: 100 * attempts as u64,
        }
    }

    #[tokio::test]
    async fn test_record_session() {
        let tracker = PerformanceTracker::new();
        tracker.record(record("rate-sheet", 3, true, 100)).await;

        let metrics = tracker.metrics().await;
        assert_eq!(metrics.total_sessions, 1);
        assert_eq!(metrics.overall_success_rate, 1.0);
        let template = tracker.template("rate-sheet").await.unwrap();
        assert_eq!(template.avg_attempts, 3.0);
        assert_eq!(template.avg_attempt_duration_ms, 100.0);
    }

    #[tokio::test]
    async fn test_average_attempts() {
        let tracker = PerformanceTracker::new();
        tracker.record(record("rate-sheet", 1, true, 100)).await;
        tracker.record(record("rate-sheet", 5, false, 92)).await;
        tracker.record(record("promo", 2, true, 100)).await;

        let template = tracker.template("rate-sheet").await.unwrap();
        assert_eq!(template.success_rate(), 0.5);
        assert_eq!(template.best_score, 100);
        assert_eq!(template.last_score, 92);

        let averages = tracker.average_attempts().await;
        assert_eq!(averages[0], ("rate-sheet".to_string(), 3.0));
        assert_eq!(averages[1], ("promo".to_string(), 2.0));
        assert_eq!(tracker.metrics().await.average_attempts, 8.0 / 3.0);
    }

    #[tokio::test]
    async fn test_recent_bounded() {
        let tracker = PerformanceTracker::with_capacity(2);
        for i in 0..3 {
            tracker.record(record("promo", i + 1, true, 100)).await;
        }
        let recent = tracker.recent().await;
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].attempts, 2);
        assert_eq!(recent[1].attempts, 3);
    }
}
