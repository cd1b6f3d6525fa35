// src/config/mod.rs
pub mod ai;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_CONFIG_PATH: &str = "NEWS_INTEL_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/news_intel.toml";

/// Process configuration: defaults, then an optional TOML file, then env vars.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub port: u16,
    pub db_path: PathBuf,
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub openai_model: String,
    pub target_lang: String,
    pub collect_interval_mins: u64,
    pub feed_timeout_secs: u64,
    /// Items handled by one "process unprocessed" trigger.
    pub process_limit: i64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 5555,
            db_path: PathBuf::from("./data/news.db"),
            openai_api_key: String::new(),
            openai_base_url: "https://api.openai.com/v1".to_string(),
            openai_model: "gpt-4o-mini".to_string(),
            target_lang: "zh-CN".to_string(),
            collect_interval_mins: 30,
            feed_timeout_secs: 30,
            process_limit: 10,
        }
    }
}

impl AppConfig {
    /// Load using env var + fallbacks:
    /// 1) $NEWS_INTEL_CONFIG (must exist when set)
    /// 2) config/news_intel.toml
    /// 3) built-in defaults
    ///
    /// Individual env vars override whatever the file provided.
    pub fn load() -> Result<Self> {
        let base = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            Self::from_file(&pb)?
        } else {
            let default_p = PathBuf::from(DEFAULT_CONFIG_PATH);
            if default_p.exists() {
                Self::from_file(&default_p)?
            } else {
                Self::default()
            }
        };
        Ok(base.with_env_overrides())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    fn with_env_overrides(mut self) -> Self {
        if let Some(v) = env_non_empty("PORT").and_then(|v| v.parse().ok()) {
            self.port = v;
        }
        if let Some(v) = env_non_empty("DB_PATH") {
            self.db_path = PathBuf::from(v);
        }
        if let Some(v) = env_non_empty("OPENAI_API_KEY") {
            self.openai_api_key = v;
        }
        if let Some(v) = env_non_empty("OPENAI_BASE_URL") {
            self.openai_base_url = v;
        }
        if let Some(v) = env_non_empty("OPENAI_MODEL") {
            self.openai_model = v;
        }
        if let Some(v) = env_non_empty("AI_TARGET_LANG") {
            self.target_lang = v;
        }
        if let Some(v) = env_non_empty("COLLECT_INTERVAL_MINS").and_then(|v| v.parse().ok()) {
            self.collect_interval_mins = v;
        }
        if let Some(v) = env_non_empty("FEED_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.feed_timeout_secs = v;
        }
        self
    }

    pub fn collect_interval(&self) -> Duration {
        Duration::from_secs(self.collect_interval_mins.max(1) * 60)
    }

    pub fn feed_timeout(&self) -> Duration {
        Duration::from_secs(self.feed_timeout_secs.max(1))
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
