//! LLM client abstraction: an OpenAI-compatible chat client plus a disabled stand-in.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ai::AiSettings;

/// Chat-style completion: model + prompt + temperature in, free-form text out.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat(&self, model: &str, prompt: &str, temperature: f32) -> Result<String>;

    /// Provider name for diagnostics.
    fn provider_name(&self) -> &'static str;

    /// `false` when no provider is configured; enrichment is skipped entirely.
    fn is_available(&self) -> bool {
        true
    }
}

/// Convenient alias used by callers.
pub type DynLlmClient = Arc<dyn LlmClient>;

/// Always errors; used when no API key is configured.
pub struct DisabledClient;

#[async_trait]
impl LlmClient for DisabledClient {
    async fn chat(&self, _model: &str, _prompt: &str, _temperature: f32) -> Result<String> {
        Err(anyhow!("AI is not configured (missing API key)"))
    }

    fn provider_name(&self) -> &'static str {
        "disabled"
    }

    fn is_available(&self) -> bool {
        false
    }
}

/// OpenAI Chat Completions (or any API speaking the same protocol).
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(api_key: &str, base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("news-intel/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(120))
            .build()
            .context("building llm http client")?;
        Ok(Self {
            http,
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn chat(&self, model: &str, prompt: &str, temperature: f32) -> Result<String> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            #[serde(default)]
            content: String,
        }

        let req = Req {
            model,
            messages: vec![Msg {
                role: "user",
                content: prompt,
            }],
            temperature,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .with_context(|| format!("POST {url}"))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(300).collect();
            return Err(anyhow!("llm http {status}: {snippet}"));
        }

        let body: Resp = resp.json().await.context("decoding chat completion")?;
        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .ok_or_else(|| anyhow!("no response from AI"))
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

/// Factory: a disabled client without an API key, otherwise an OpenAI-compatible one.
pub fn build_client(settings: &AiSettings) -> Result<DynLlmClient> {
    if settings.api_key.trim().is_empty() {
        return Ok(Arc::new(DisabledClient));
    }
    if settings.provider != "openai" {
        tracing::debug!(
            target: "enrich",
            provider = %settings.provider,
            "treating provider as OpenAI-compatible"
        );
    }
    Ok(Arc::new(OpenAiClient::new(
        &settings.api_key,
        &settings.base_url,
    )?))
}
