//! Configuration management for revq
//!
//! Values load from `config.toml` in the platform config directory, with
//! defaults matching the conservative public OpenAI limits. Secrets are
//! never stored in the file; they come from the environment.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ReviewError;
use crate::segment::ExclusionPolicy;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub github: GitHubConfig,
    pub openai: OpenAiConfig,
    pub review: ReviewConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    pub owner: String,
    pub repo: String,
    pub api_url: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            owner: String::new(),
            repo: String::new(),
            api_url: "https://api.github.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub model: String,
    /// Response size ceiling per chunk request
    pub max_response_tokens: usize,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4".to_string(),
            max_response_tokens: 2048,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    /// Max tokens sent at once when splitting diffs
    pub max_chunk_tokens: usize,
    /// Diff size past which the review is skipped entirely
    pub max_diff_tokens: usize,
    /// Request allowance per rolling window
    pub max_requests_per_window: u64,
    /// Token allowance per rolling window
    pub max_tokens_per_window: u64,
    /// Filename patterns excluded as generated artifacts; empty means the
    /// built-in default
    pub exclude_patterns: Vec<String>,
    /// System-message preamble sent with every chunk
    pub preamble: String,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            max_chunk_tokens: 5120,
            max_diff_tokens: 30000,
            max_requests_per_window: 3,
            max_tokens_per_window: 10000,
            exclude_patterns: vec![ExclusionPolicy::DEFAULT_GENERATED_PATTERN.to_string()],
            preamble: DEFAULT_PREAMBLE.to_string(),
        }
    }
}

const DEFAULT_PREAMBLE: &str = "You are a code reviewer analyzing source-code diffs. \
Focus on style, best practices, and security. \
Due to token limits, some diffs may be partial; do your best with the available information. \
Skip minified JavaScript, CSS, or other build byproducts. \
If encountered, note: 'Skipping file.'";

impl Config {
    /// Load configuration from the default location or fall back to defaults
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "revq") {
            let config_dir = proj_dirs.config_dir();
            std::fs::create_dir_all(config_dir)?;
            Ok(config_dir.join("config.toml"))
        } else {
            Ok(PathBuf::from("config.toml"))
        }
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    /// GitHub API token from the environment
    pub fn github_token() -> Result<String, ReviewError> {
        std::env::var("GITHUB_TOKEN")
            .map_err(|_| ReviewError::Config("GITHUB_TOKEN environment variable not set".into()))
    }

    /// OpenAI API key from the environment
    pub fn openai_api_key() -> Result<String, ReviewError> {
        std::env::var("OPENAI_API_KEY")
            .map_err(|_| ReviewError::Config("OPENAI_API_KEY environment variable not set".into()))
    }
}
