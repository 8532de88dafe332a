//! Runtime configuration
//!
//! Every field has a default, so an empty or partial YAML file is valid.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Tuning for the exploration core
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExploreConfig {
    /// History records kept before the oldest are pruned
    pub max_records: usize,
    /// Ancestors included in an expansion's context block
    pub max_context_depth: usize,
    /// Character budget of an expansion's context block
    pub context_char_budget: usize,
    /// Attempts per request when the model's answer is malformed
    pub max_parse_attempts: usize,
    /// How long a segment must stay visible before it is prefetched
    pub prefetch_quiet_ms: u64,
    /// Cap on segments in one view once extended with "more"
    pub max_total_segments: usize,
    pub llm: LlmConfig,
}

impl Default for ExploreConfig {
    fn default() -> Self {
        Self {
            max_records: crate::storage::DEFAULT_MAX_RECORDS,
            max_context_depth: crate::context::DEFAULT_MAX_DEPTH,
            context_char_budget: crate::context::DEFAULT_CHAR_BUDGET,
            max_parse_attempts: 3,
            prefetch_quiet_ms: 2000,
            max_total_segments: 20,
            llm: LlmConfig::default(),
        }
    }
}

impl ExploreConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    pub fn prefetch_quiet_period(&self) -> Duration {
        Duration::from_millis(self.prefetch_quiet_ms)
    }
}

/// Where the completion service lives
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 60,
        }
    }
}
