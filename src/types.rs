//! Shared types used across modules
//!
//! Requests, analyzer errors and their classified form live here so the
//! quality, prompt, learning and generation modules can share them without
//! depending on each other.

use serde::{Deserialize, Serialize};

use crate::quality::severity::{self, SeverityClassifier, SeverityTier, ANALYSIS_ERROR_TYPE};

/// Default attempt budget when a request does not specify one
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// An error as reported by the quality analyzer, before classification
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RawError {
    #[serde(rename = "type")]
    pub error_type: String,
    pub issue: String,
}

impl RawError {
    pub fn new(error_type: impl Into<String>, issue: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            issue: issue.into(),
        }
    }
}

/// A classified analyzer error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    #[serde(rename = "type")]
    pub error_type: String,
    pub issue: String,
    pub severity: SeverityTier,
}

impl ErrorRecord {
    /// Classify a raw error with the default severity table
    pub fn classify(raw: RawError) -> Self {
        let severity = severity::classify(&raw.error_type, &raw.issue);
        Self {
            error_type: raw.error_type,
            issue: raw.issue,
            severity,
        }
    }

    /// Classify a raw error with a custom classifier
    pub fn classify_with(raw: RawError, classifier: &SeverityClassifier) -> Self {
        let severity = classifier.classify(&raw.error_type, &raw.issue);
        Self {
            error_type: raw.error_type,
            issue: raw.issue,
            severity,
        }
    }

    /// Synthetic error recorded when the analyzer could not score an artifact
    pub fn analysis_failure(message: &str) -> Self {
        Self::classify(RawError::new(ANALYSIS_ERROR_TYPE, message))
    }

    pub fn is_analysis_failure(&self) -> bool {
        self.error_type == ANALYSIS_ERROR_TYPE
    }

    /// Learning-store key: `type:issue`
    pub fn key(&self) -> String {
        error_key(&self.error_type, &self.issue)
    }

    pub fn weight(&self) -> u32 {
        self.severity.weight()
    }

    /// `[TYPE] issue`, as echoed back to the generator
    pub fn feedback_line(&self) -> String {
        format!("[{}] {}", self.error_type.to_uppercase(), self.issue)
    }
}

/// Build the `type:issue` key used for error patterns
pub fn error_key(error_type: &str, issue: &str) -> String {
    format!("{}:{}", error_type, issue)
}

/// Kind of auxiliary asset passed through to the generator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Logo,
    Photo,
}

/// Auxiliary asset (base64 encoded)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub kind: AssetKind,
    pub mime_type: String,
    pub data: String,
}

/// Immutable input to one generation session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub template_id: String,
    pub base_prompt: String,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub assets: Vec<Asset>,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

impl GenerationRequest {
    pub fn new(template_id: impl Into<String>, base_prompt: impl Into<String>) -> Self {
        Self {
            template_id: template_id.into(),
            base_prompt: base_prompt.into(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            assets: Vec::new(),
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_asset(mut self, asset: Asset) -> Self {
        self.assets.push(asset);
        self
    }
}
