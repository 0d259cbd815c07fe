//! Configuration management
//!
//! TOML configuration for retry budgets, learning thresholds, prompt fix
//! strategies and the generation/analysis backends.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::generation::{GenerateOptions, RetryPolicy};
use crate::learning::state::{
    LearningPolicy, DEFAULT_CONFIRMATIONS_REQUIRED, DEFAULT_FIX_TRIGGER_COUNT, DEFAULT_TARGET_SUCCESS_RATE,
};
use crate::learning::terms::DEFAULT_AUTO_REPLACE_THRESHOLD;
use crate::prompt::StrategySettings;
use crate::quality::{SeverityClassifier, SeverityRule};
use crate::types::DEFAULT_MAX_ATTEMPTS;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Attempt budget and deadlines
    #[serde(default)]
    pub retry: RetryConfig,
    /// Cross-session learning
    #[serde(default)]
    pub learning: LearningConfig,
    /// Problematic-term promotion
    #[serde(default)]
    pub terms: TermsConfig,
    /// Fix strategy tunables
    #[serde(default)]
    pub strategy: StrategySettings,
    /// Generator and analyzer endpoints
    #[serde(default)]
    pub backend: BackendConfig,
    /// Ordered severity table; empty means the built-in table
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub severity_rules: Vec<SeverityRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Seconds allowed for one generate + analyze cycle (0 disables)
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_secs: u64,
    /// Seconds allowed for a whole session (0 disables)
    #[serde(default = "default_session_timeout")]
    pub session_timeout_secs: u64,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_attempt_timeout() -> u64 {
    120
}

fn default_session_timeout() -> u64 {
    900
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            attempt_timeout_secs: default_attempt_timeout(),
            session_timeout_secs: default_session_timeout(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningConfig {
    /// Learning database file; defaults to `learning.json` in the data dir
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_path: Option<PathBuf>,
    #[serde(default = "default_target_success_rate")]
    pub target_success_rate: f64,
    #[serde(default = "default_fix_trigger_count")]
    pub fix_trigger_count: u64,
    #[serde(default = "default_confirmations_required")]
    pub confirmations_required: u32,
}

fn default_target_success_rate() -> f64 {
    DEFAULT_TARGET_SUCCESS_RATE
}

fn default_fix_trigger_count() -> u64 {
    DEFAULT_FIX_TRIGGER_COUNT
}

fn default_confirmations_required() -> u32 {
    DEFAULT_CONFIRMATIONS_REQUIRED
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            store_path: None,
            target_success_rate: default_target_success_rate(),
            fix_trigger_count: default_fix_trigger_count(),
            confirmations_required: default_confirmations_required(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermsConfig {
    /// Failures before a term is substituted automatically
    #[serde(default = "default_auto_replace_threshold")]
    pub auto_replace_threshold: u32,
}

fn default_auto_replace_threshold() -> u32 {
    DEFAULT_AUTO_REPLACE_THRESHOLD
}

impl Default for TermsConfig {
    fn default() -> Self {
        Self {
            auto_replace_threshold: default_auto_replace_threshold(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_generator_url")]
    pub generator_url: String,
    #[serde(default = "default_analyzer_url")]
    pub analyzer_url: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_generator_url() -> String {
    "http://127.0.0.1:3001/api/generate".to_string()
}

fn default_analyzer_url() -> String {
    "http://127.0.0.1:3001/api/analyze".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_top_k() -> u32 {
    40
}

fn default_top_p() -> f32 {
    0.95
}

fn default_request_timeout() -> u64 {
    120
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            generator_url: default_generator_url(),
            analyzer_url: default_analyzer_url(),
            temperature: default_temperature(),
            top_k: default_top_k(),
            top_p: default_top_p(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn non_zero_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

impl Config {
    /// Load configuration from the default path, creating it if missing
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path()?)
    }

    /// Load configuration from `path`, writing defaults there if missing
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            let config: Config = toml::from_str(&contents).context("Failed to parse config file")?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<()> {
        self.save_to(&config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let parent = path.parent().context("Config path has no parent")?;
        std::fs::create_dir_all(parent).context("Failed to create config directory")?;

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, contents).context("Failed to write config file")?;
        Ok(())
    }

    pub fn learning_policy(&self) -> LearningPolicy {
        LearningPolicy {
            fix_trigger_count: self.learning.fix_trigger_count.max(1),
            confirmations_required: self.learning.confirmations_required.max(1),
            auto_replace_threshold: self.terms.auto_replace_threshold.max(1),
            target_success_rate: self.learning.target_success_rate,
        }
    }

    /// Retry policy with a fresh cancellation token
    pub fn retry_policy(&self) -> RetryPolicy {
        let mut policy = RetryPolicy::new(self.retry.max_attempts);
        policy.attempt_timeout = non_zero_secs(self.retry.attempt_timeout_secs);
        policy.session_timeout = non_zero_secs(self.retry.session_timeout_secs);
        policy
    }

    pub fn severity_classifier(&self) -> SeverityClassifier {
        if self.severity_rules.is_empty() {
            SeverityClassifier::default()
        } else {
            SeverityClassifier::new(self.severity_rules.clone())
        }
    }

    pub fn generate_options(&self) -> GenerateOptions {
        GenerateOptions {
            temperature: self.backend.temperature,
            top_k: self.backend.top_k,
            top_p: self.backend.top_p,
            assets: Vec::new(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.backend.request_timeout_secs.max(1))
    }

    /// Learning database file
    pub fn store_path(&self) -> Result<PathBuf> {
        match &self.learning.store_path {
            Some(path) => Ok(path.clone()),
            None => Ok(data_dir()?.join("learning.json")),
        }
    }
}

fn project_dirs() -> Result<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "adaptive-qc", "adaptive-qc").context("Failed to get project directories")
}

/// Get the configuration file path
pub fn config_path() -> Result<PathBuf> {
    Ok(project_dirs()?.config_dir().join("config.toml"))
}

/// Get the data directory path
pub fn data_dir() -> Result<PathBuf> {
    Ok(project_dirs()?.data_dir().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::SeverityTier;

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [retry]
            max_attempts = 3

            [strategy]
            background_color = "white"
            "#,
        )
        .unwrap();
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.attempt_timeout_secs, 120);
        assert_eq!(config.strategy.background_color, "white");
        assert_eq!(config.strategy.forbidden_colors, vec!["blue", "navy"]);
        assert_eq!(config.learning.fix_trigger_count, 2);
        assert_eq!(config.terms.auto_replace_threshold, 5);
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config, Config::default());

        let mut changed = config.clone();
        changed.backend.top_k = 20;
        changed.learning.store_path = Some(dir.path().join("db.json"));
        changed.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), changed);
    }

    #[test]
    fn test_zero_timeouts_disable_deadlines() {
        let mut config = Config::default();
        config.retry.attempt_timeout_secs = 0;
        let policy = config.retry_policy();
        assert!(policy.attempt_timeout.is_none());
        assert_eq!(policy.session_timeout, Some(Duration::from_secs(900)));
        assert_eq!(policy.max_attempts, 5);
    }

    #[test]
    fn test_policy_from_config() {
        let mut config = Config::default();
        config.terms.auto_replace_threshold = 3;
        config.learning.fix_trigger_count = 0;
        let policy = config.learning_policy();
        assert_eq!(policy.auto_replace_threshold, 3);
        assert_eq!(policy.fix_trigger_count, 1);
        assert_eq!(policy.target_success_rate, 90.0);
    }

    #[test]
    fn test_default_toml_parses() {
        let parsed: Config = toml::from_str(&toml::to_string_pretty(&Config::default()).unwrap()).unwrap();
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn test_severity_rules_override_table() {
        let config: Config = toml::from_str(
            r#"
            [[severity_rules]]
            tier = "BLOCKING"
            patterns = ["Wrong_Disclaimer"]

            [[severity_rules]]
            tier = "LOW"
            patterns = ["spacing"]
            "#,
        )
        .unwrap();
        let classifier = config.severity_classifier();
        assert_eq!(classifier.rules().len(), 2);
        assert_eq!(classifier.classify("legal", "wrong_disclaimer"), SeverityTier::Blocking);
        assert_eq!(classifier.classify("spacing", "uneven"), SeverityTier::Low);

        let reparsed: Config = toml::from_str(&toml::to_string_pretty(&config).unwrap()).unwrap();
        assert_eq!(reparsed, config);

        assert_eq!(Config::default().severity_classifier(), SeverityClassifier::default());
    }
}
