// src/config/ai.rs
use serde::{Deserialize, Serialize};
use std::env;

use super::AppConfig;

fn default_provider() -> String {
    "openai".to_string()
}
fn default_true() -> bool {
    true
}
fn default_target_lang() -> String {
    "zh-CN".to_string()
}

/// LLM provider settings. Persisted in `ai_configs`; the enrichment engine
/// swaps its client whenever a new value is saved.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AiSettings {
    /// "openai" or any OpenAI-compatible endpoint (case-insensitive)
    #[serde(default = "default_provider")]
    pub provider: String,
    /// "ENV" means: read from OPENAI_API_KEY
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub model: String,
    #[serde(default = "default_true")]
    pub enable_trans: bool,
    #[serde(default = "default_true")]
    pub enable_summary: bool,
    /// Language tag, `ug`, or the bilingual `zh-ug` mode.
    #[serde(default = "default_target_lang")]
    pub target_lang: String,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_key: String::new(),
            base_url: String::new(),
            model: "gpt-4o-mini".to_string(),
            enable_trans: true,
            enable_summary: true,
            target_lang: default_target_lang(),
        }
    }
}

impl AiSettings {
    /// Settings derived from process configuration (used when nothing is persisted).
    pub fn from_app_config(cfg: &AppConfig) -> Self {
        Self {
            api_key: cfg.openai_api_key.clone(),
            base_url: cfg.openai_base_url.clone(),
            model: cfg.openai_model.clone(),
            target_lang: cfg.target_lang.clone(),
            ..Self::default()
        }
        .normalized()
    }

    /// Lowercase provider, resolve an "ENV" key, and fill blank model/base URL.
    pub fn normalized(mut self) -> Self {
        self.provider = self.provider.trim().to_lowercase();
        if self.provider.is_empty() {
            self.provider = default_provider();
        }
        if self.api_key.trim().eq_ignore_ascii_case("env") {
            self.api_key = env::var("OPENAI_API_KEY").unwrap_or_default();
        }
        if self.base_url.trim().is_empty() {
            self.base_url = "https://api.openai.com/v1".to_string();
        }
        self.base_url = self.base_url.trim_end_matches('/').to_string();
        if self.model.trim().is_empty() {
            self.model = "gpt-4o-mini".to_string();
        }
        if self.target_lang.trim().is_empty() {
            self.target_lang = default_target_lang();
        }
        self
    }

    /// Copy safe to hand out over the API: the key is reduced to a hint.
    pub fn redacted(&self) -> Self {
        let mut out = self.clone();
        if !out.api_key.is_empty() {
            let tail: String = out
                .api_key
                .chars()
                .rev()
                .take(4)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            out.api_key = format!("****{tail}");
        }
        out
    }
}
