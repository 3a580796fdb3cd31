//! Configuration loading, validation, and management for Contextual.
//!
//! Loads configuration from `~/.contextual/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.contextual/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Context assembly settings
    #[serde(default)]
    pub context: ContextConfig,

    /// Memory store settings
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Background summarization and fact extraction
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Number of most-recent turns kept verbatim (includes the query turn)
    #[serde(default = "default_window")]
    pub window: usize,

    /// Memory chunks retrieved per assembly
    #[serde(default = "default_retrieve_k")]
    pub retrieve_k: usize,

    /// Upper bound on the estimated size of an assembled context
    #[serde(default = "default_token_budget")]
    pub token_budget: usize,

    /// Token estimation: characters per token (rounded up)
    #[serde(default = "default_chars_per_token")]
    pub chars_per_token: usize,

    /// Token estimation: fixed cost per turn, chunk or fact line
    #[serde(default = "default_per_item_overhead")]
    pub per_item_overhead: usize,
}

fn default_window() -> usize {
    8
}
fn default_retrieve_k() -> usize {
    3
}
fn default_token_budget() -> usize {
    4096
}
fn default_chars_per_token() -> usize {
    4
}
fn default_per_item_overhead() -> usize {
    4
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            window: default_window(),
            retrieve_k: default_retrieve_k(),
            token_budget: default_token_budget(),
            chars_per_token: default_chars_per_token(),
            per_item_overhead: default_per_item_overhead(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Embedding backend: "hash" or "none"
    #[serde(default = "default_embedder")]
    pub embedder: String,

    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: usize,

    /// Chunks scoring below this are never recalled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_similarity: Option<f32>,
}

fn default_embedder() -> String {
    "hash".into()
}
fn default_embedding_dimensions() -> usize {
    256
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            embedder: default_embedder(),
            embedding_dimensions: default_embedding_dimensions(),
            min_similarity: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceConfig {
    /// Summarize once this many turns have fallen out of the window unsummarized
    #[serde(default = "default_summarize_every")]
    pub summarize_every: usize,

    /// Largest turn range folded into a single chunk
    #[serde(default = "default_max_chunk_turns")]
    pub max_chunk_turns: usize,

    #[serde(default = "default_true")]
    pub extract_facts: bool,

    /// Pending background jobs per conversation
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Length cap for the local extractive summarizer
    #[serde(default = "default_summary_max_chars")]
    pub summary_max_chars: usize,
}

fn default_summarize_every() -> usize {
    10
}
fn default_max_chunk_turns() -> usize {
    20
}
fn default_true() -> bool {
    true
}
fn default_queue_capacity() -> usize {
    64
}
fn default_summary_max_chars() -> usize {
    600
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            summarize_every: default_summarize_every(),
            max_chunk_turns: default_max_chunk_turns(),
            extract_facts: true,
            queue_capacity: default_queue_capacity(),
            summary_max_chars: default_summary_max_chars(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.contextual/config.toml).
    ///
    /// Environment overrides (highest priority):
    /// - `CONTEXTUAL_TOKEN_BUDGET`
    /// - `CONTEXTUAL_WINDOW`
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_env(&Self::config_dir().join("config.toml"))
    }

    /// Load from `path`, then apply the environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".contextual")
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(budget) = env_usize("CONTEXTUAL_TOKEN_BUDGET")? {
            self.context.token_budget = budget;
        }
        if let Some(window) = env_usize("CONTEXTUAL_WINDOW")? {
            self.context.window = window;
        }
        Ok(())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.context.window == 0 {
            return Err(ConfigError::ValidationError(
                "context.window must be at least 1 (the query turn)".into(),
            ));
        }

        if self.context.token_budget == 0 {
            return Err(ConfigError::ValidationError(
                "context.token_budget must be > 0".into(),
            ));
        }

        if self.context.chars_per_token == 0 {
            return Err(ConfigError::ValidationError(
                "context.chars_per_token must be > 0".into(),
            ));
        }

        if !matches!(self.memory.embedder.as_str(), "hash" | "none") {
            return Err(ConfigError::ValidationError(format!(
                "memory.embedder must be \"hash\" or \"none\", got \"{}\"",
                self.memory.embedder
            )));
        }

        if self.memory.embedding_dimensions == 0 {
            return Err(ConfigError::ValidationError(
                "memory.embedding_dimensions must be > 0".into(),
            ));
        }

        if let Some(min) = self.memory.min_similarity {
            if !(-1.0..=1.0).contains(&min) {
                return Err(ConfigError::ValidationError(
                    "memory.min_similarity must be between -1.0 and 1.0".into(),
                ));
            }
        }

        if self.maintenance.summarize_every == 0 || self.maintenance.max_chunk_turns == 0 {
            return Err(ConfigError::ValidationError(
                "maintenance.summarize_every and max_chunk_turns must be > 0".into(),
            ));
        }

        if self.maintenance.queue_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "maintenance.queue_capacity must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for the `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

fn env_usize(name: &str) -> Result<Option<usize>, ConfigError> {
    let Ok(raw) = std::env::var(name) else {
        return Ok(None);
    };
    raw.trim().parse().map(Some).map_err(|_| {
        ConfigError::ValidationError(format!("{name} must be an integer, got \"{raw}\""))
    })
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
