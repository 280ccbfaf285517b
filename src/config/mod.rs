// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Configuration management for MagicHand

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    /// Directory to watch (the user's desktop)
    #[serde(default = "default_watch_dir")]
    pub watch_dir: PathBuf,

    /// Library layout
    #[serde(default)]
    pub library: LibraryConfig,

    /// File settling
    #[serde(default)]
    pub stability: StabilityConfig,

    /// Per-path retry budget
    #[serde(default)]
    pub retry: RetryConfig,

    /// Remote classification engine
    #[serde(default)]
    pub engine: EngineConfig,

    /// User-defined classification rules
    #[serde(default)]
    pub rules: RuleConfig,

    /// Extra ignore rules
    #[serde(default)]
    pub ignore: IgnoreConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LibraryConfig {
    /// Root folder holding both libraries; defaults to `<watch_dir>/Magic Hand`
    #[serde(default)]
    pub root: Option<PathBuf>,
    #[serde(default = "default_ai_library")]
    pub ai_library: String,
    #[serde(default = "default_manual_library")]
    pub manual_library: String,
    #[serde(default = "default_cache_file")]
    pub cache_file: String,
    #[serde(default = "default_history_file")]
    pub history_file: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StabilityConfig {
    #[serde(default = "default_quiescence_ms")]
    pub quiescence_ms: u64,
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_window")]
    pub window_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EngineConfig {
    /// Base URL of an OpenAI-compatible API
    #[serde(default = "default_engine_url")]
    pub url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
    /// Longest a worker waits for a rate limiter slot
    #[serde(default = "default_rate_wait")]
    pub max_rate_wait_secs: u64,
    /// Environment variable holding the API key. The key itself is never stored here.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_preview_bytes")]
    pub preview_bytes: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct RuleConfig {
    /// Extension (without dot) to category name, checked before the built-in table
    #[serde(default)]
    pub extensions: HashMap<String, String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct IgnoreConfig {
    /// Suffixes treated as in-progress downloads, on top of the built-in list
    #[serde(default)]
    pub temp_suffixes: Vec<String>,
}

// Default value functions
fn default_watch_dir() -> PathBuf {
    dirs::desktop_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join("Desktop")))
        .unwrap_or_else(|| PathBuf::from("Desktop"))
}
fn default_ai_library() -> String { "AI Library".to_string() }
fn default_manual_library() -> String { "Manual Library".to_string() }
fn default_cache_file() -> String { "classification_cache.json".to_string() }
fn default_history_file() -> String { "history.jsonl".to_string() }
fn default_quiescence_ms() -> u64 { 2000 }
fn default_tick_ms() -> u64 { 250 }
fn default_shutdown_grace_ms() -> u64 { 5000 }
fn default_max_attempts() -> u32 { 3 }
fn default_retry_window() -> u64 { 600 }
fn default_engine_url() -> String { "https://api.openai.com".to_string() }
fn default_model() -> String { "gpt-4o-mini".to_string() }
fn default_timeout() -> u64 { 20 }
fn default_requests_per_minute() -> u32 { 20 }
fn default_rate_wait() -> u64 { 30 }
fn default_api_key_env() -> String { "OPENAI_API_KEY".to_string() }
fn default_preview_bytes() -> usize { 1024 }

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            watch_dir: default_watch_dir(),
            library: LibraryConfig::default(),
            stability: StabilityConfig::default(),
            retry: RetryConfig::default(),
            engine: EngineConfig::default(),
            rules: RuleConfig::default(),
            ignore: IgnoreConfig::default(),
        }
    }
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            root: None,
            ai_library: default_ai_library(),
            manual_library: default_manual_library(),
            cache_file: default_cache_file(),
            history_file: default_history_file(),
        }
    }
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            quiescence_ms: default_quiescence_ms(),
            tick_ms: default_tick_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            window_secs: default_retry_window(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            url: default_engine_url(),
            model: default_model(),
            timeout_secs: default_timeout(),
            requests_per_minute: default_requests_per_minute(),
            max_rate_wait_secs: default_rate_wait(),
            api_key_env: default_api_key_env(),
            preview_bytes: default_preview_bytes(),
        }
    }
}

impl StabilityConfig {
    pub fn quiescence(&self) -> Duration {
        Duration::from_millis(self.quiescence_ms)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(10))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl RetryConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl EngineConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn max_rate_wait(&self) -> Duration {
        Duration::from_secs(self.max_rate_wait_secs)
    }

    /// Read the API key from the configured environment variable
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
    }
}

impl AppConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> crate::Result<Self> {
        let config: Self = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content)
                .map_err(|e| crate::MagicHandError::Config(format!("Failed to parse config: {}", e)))?
        } else {
            tracing::info!("Config file not found at {:?}, using defaults", path);
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check values that serde cannot
    pub fn validate(&self) -> crate::Result<()> {
        use crate::MagicHandError::Config;

        if self.library.ai_library == self.library.manual_library {
            return Err(Config("AI and Manual Library must be different folders".into()));
        }
        if self.engine.requests_per_minute == 0 {
            return Err(Config("engine.requests_per_minute must be at least 1".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(Config("retry.max_attempts must be at least 1".into()));
        }
        for (ext, category) in &self.rules.extensions {
            crate::Category::parse(category).map_err(|_| {
                Config(format!("rule for .{} names invalid category {:?}", ext, category))
            })?;
        }
        Ok(())
    }

    /// Folder holding both libraries
    pub fn library_root(&self) -> PathBuf {
        self.library
            .root
            .clone()
            .unwrap_or_else(|| self.watch_dir.join("Magic Hand"))
    }

    pub fn ai_library(&self) -> PathBuf {
        self.library_root().join(&self.library.ai_library)
    }

    pub fn manual_library(&self) -> PathBuf {
        self.library_root().join(&self.library.manual_library)
    }

    pub fn cache_path(&self) -> PathBuf {
        self.library_root().join(&self.library.cache_file)
    }

    pub fn history_path(&self) -> PathBuf {
        self.library_root().join(&self.library.history_file)
    }

    /// Create the watch directory and both libraries if missing
    pub fn ensure_dirs(&self) -> crate::Result<()> {
        for dir in [&self.watch_dir, &self.ai_library(), &self.manual_library()] {
            if !dir.exists() {
                std::fs::create_dir_all(dir)?;
                tracing::info!("Created directory: {:?}", dir);
            }
        }
        Ok(())
    }
}
