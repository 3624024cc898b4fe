//! Configuration management

use crate::error::{DeepquestError, DeepquestResult, ErrorContext};
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level deepquest configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeepquestConfig {
    pub run: RunConfig,
    pub models: ModelConfig,
    pub retrieval: RetrievalConfig,
    pub logging: LoggingConfig,
}

/// Limits and policies for a single research run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Maximum recursion depth; a node at this depth is always solved
    /// atomically
    pub max_depth: usize,
    /// Maximum sub-questions per decomposition
    pub max_fanout: usize,
    /// Global ceiling on nodes created in one run
    pub max_total_nodes: usize,
    /// Fraction of failed children a parent tolerates before failing
    /// itself (all-failed always fails the parent)
    pub child_failure_tolerance: f64,
    /// Run-level timeout in seconds
    pub timeout_secs: u64,
    /// Cap on simultaneous in-flight model/retrieval calls
    pub max_concurrent_calls: usize,
    /// Minimum spacing between call starts, for upstream rate limits
    pub min_call_interval_ms: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_fanout: 5,
            max_total_nodes: 64,
            child_failure_tolerance: 0.5,
            timeout_secs: 900,
            max_concurrent_calls: 4,
            min_call_interval_ms: 0,
        }
    }
}

impl RunConfig {
    /// Recursion budget left for a node at the given depth
    pub fn remaining_budget(&self, depth: usize) -> usize {
        self.max_depth.saturating_sub(depth)
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }
}

/// Model provider configuration
///
/// Two model ids with different latency/capability tradeoffs: the fast
/// model serves classification, decomposition and leaf solves; the deep
/// model serves aggregation and report expansion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Provider type (openai, anthropic, ollama)
    pub provider: String,
    /// Low-latency model id
    pub fast_model: String,
    /// High-capability model id
    pub deep_model: String,
    /// API key (optional, can be set via environment)
    pub api_key: Option<String>,
    /// Base URL for self-hosted or proxied providers
    pub base_url: Option<String>,
    /// Sampling temperature
    pub temperature: f32,
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            fast_model: "gpt-4o-mini".to_string(),
            deep_model: "gpt-4o".to_string(),
            api_key: None,
            base_url: None,
            temperature: 0.7,
            max_tokens: Some(4000),
        }
    }
}

/// Retrieval enrichment configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Whether to run retrieval at all
    pub enabled: bool,
    /// SearxNG-compatible JSON search endpoint; web search is skipped
    /// when unset
    pub search_endpoint: Option<String>,
    /// Maximum snippets fed into a leaf solve
    pub max_results: usize,
    /// Retrieval only runs for nodes at or above this depth; deeper
    /// leaves solve reasoning-only
    pub max_retrieval_depth: usize,
    /// Per-search timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            search_endpoint: None,
            max_results: 5,
            max_retrieval_depth: 1,
            timeout_ms: 10_000,
        }
    }
}

impl DeepquestConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> DeepquestResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| DeepquestError::Config {
            message: format!("Failed to read config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("read_file")
                .with_suggestion("Check if the config file exists and is readable"),
        })?;

        let config: DeepquestConfig = toml::from_str(&content).map_err(|e| DeepquestError::Config {
            message: format!("Failed to parse config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("parse_toml")
                .with_suggestion("Check TOML syntax in config file"),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> DeepquestResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| DeepquestError::Config {
            message: format!("Failed to serialize config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config").with_operation("serialize_toml"),
        })?;

        std::fs::write(path, content).map_err(|e| DeepquestError::Config {
            message: format!("Failed to write config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("write_file")
                .with_suggestion("Check if the directory exists and is writable"),
        })?;

        Ok(())
    }

    /// Validate configuration invariants
    pub fn validate(&self) -> DeepquestResult<()> {
        if self.run.max_fanout == 0 {
            return Err(DeepquestError::Validation {
                message: "run.max_fanout must be greater than 0".to_string(),
                field: Some("run.max_fanout".to_string()),
                context: ErrorContext::new("config").with_operation("validate"),
            });
        }

        if self.run.max_total_nodes == 0 {
            return Err(DeepquestError::Validation {
                message: "run.max_total_nodes must be greater than 0".to_string(),
                field: Some("run.max_total_nodes".to_string()),
                context: ErrorContext::new("config").with_operation("validate"),
            });
        }

        if !(0.0..=1.0).contains(&self.run.child_failure_tolerance) {
            return Err(DeepquestError::Validation {
                message: "run.child_failure_tolerance must lie in [0, 1]".to_string(),
                field: Some("run.child_failure_tolerance".to_string()),
                context: ErrorContext::new("config").with_operation("validate"),
            });
        }

        if self.run.max_concurrent_calls == 0 {
            return Err(DeepquestError::Validation {
                message: "run.max_concurrent_calls must be greater than 0".to_string(),
                field: Some("run.max_concurrent_calls".to_string()),
                context: ErrorContext::new("config").with_operation("validate"),
            });
        }

        if self.models.fast_model.is_empty() || self.models.deep_model.is_empty() {
            return Err(DeepquestError::Validation {
                message: "models.fast_model and models.deep_model must be set".to_string(),
                field: Some("models".to_string()),
                context: ErrorContext::new("config").with_operation("validate"),
            });
        }

        Ok(())
    }

    /// Default per-user config file location
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("deepquest")
            .join("config.toml")
    }
}
