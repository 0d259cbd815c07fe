//! Generation sessions
//!
//! The generator and the quality analyzer are external collaborators; this
//! module defines their seams and drives the bounded attempt loop against
//! them.

pub mod controller;
pub mod http;
pub mod policy;

pub use controller::{
    after_attempt, best_attempt, Attempt, AttemptController, SessionReport, SessionResult, SessionState,
    Termination,
};
pub use http::{HttpAnalyzer, HttpGenerator};
pub use policy::{RetryPolicy, SessionError};

use anyhow::Result;
use serde::{de, Deserialize, Deserializer, Serialize};

use crate::types::{Asset, RawError};

/// Sampling options passed to the generator on every attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateOptions {
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assets: Vec<Asset>,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            top_k: 40,
            top_p: 0.95,
            assets: Vec::new(),
        }
    }
}

impl GenerateOptions {
    pub fn with_assets(&self, assets: Vec<Asset>) -> Self {
        Self {
            assets,
            ..self.clone()
        }
    }
}

/// A produced artifact, referenced by an opaque handle (path, URL, id)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedArtifact {
    pub artifact_ref: String,
}

impl GeneratedArtifact {
    pub fn new(artifact_ref: impl Into<String>) -> Self {
        Self {
            artifact_ref: artifact_ref.into(),
        }
    }
}

/// What the analyzer is told about the attempt it scores
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisContext {
    pub prompt: String,
    pub attempt: u32,
}

/// Analyzer verdict for one artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    #[serde(deserialize_with = "deserialize_raw_score")]
    pub raw_score: u32,
    #[serde(default)]
    pub errors: Vec<RawError>,
    pub success: bool,
}

/// Accepts any JSON number, rounded and clamped into 0..=100
fn deserialize_raw_score<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u32, D::Error> {
    let value = f64::deserialize(deserializer)?;
    if !value.is_finite() {
        return Err(de::Error::custom("rawScore must be a finite number"));
    }
    Ok(value.round().clamp(0.0, 100.0) as u32)
}

impl AnalysisReport {
    pub fn new(raw_score: u32, errors: Vec<RawError>) -> Self {
        Self {
            raw_score,
            errors,
            success: true,
        }
    }

    /// A clean report with no errors
    pub fn perfect() -> Self {
        Self::new(100, Vec::new())
    }
}

/// Image/video generation backend
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Generator: Send + Sync {
    /// Produce one artifact for `prompt`. An `Err` is an invocation failure.
    async fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<GeneratedArtifact>;
}

/// Vision/OCR scoring backend
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait QualityAnalyzer: Send + Sync {
    async fn analyze(
        &self,
        artifact_ref: &str,
        template_id: &str,
        context: &AnalysisContext,
    ) -> Result<AnalysisReport>;
}
