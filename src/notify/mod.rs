//! Delivery channels: resolution from stored records, rendering, transport.

pub mod email;
pub mod template;
pub mod webhook;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{EmailTemplate, NewsItem, PushChannel};
use email::{EmailConfig, EmailSender};
use webhook::{WebhookConfig, WebhookSender};

/// A delivery target, resolved once from its stored record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Channel {
    Email(EmailConfig),
    Webhook(WebhookConfig),
}

impl Channel {
    pub fn from_record(rec: &PushChannel) -> Result<Self> {
        match rec.kind.trim().to_ascii_lowercase().as_str() {
            "email" => {
                let cfg: EmailConfig = serde_json::from_str(&rec.config)
                    .with_context(|| format!("email config of channel {}", rec.name))?;
                Ok(Self::Email(cfg))
            }
            "ntfy" | "webhook" => {
                let cfg: WebhookConfig = serde_json::from_str(&rec.config)
                    .with_context(|| format!("webhook config of channel {}", rec.name))?;
                Ok(Self::Webhook(cfg))
            }
            other => Err(anyhow!("unsupported channel type: {other}")),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Email(_) => "email",
            Self::Webhook(_) => "webhook",
        }
    }

    /// Email renders the template (falling back to the built-in one); webhooks get
    /// the Markdown digest.
    pub fn render(
        &self,
        items: &[NewsItem],
        template: Option<&EmailTemplate>,
        default_subject: &str,
        now: DateTime<Utc>,
    ) -> Rendered {
        match self {
            Self::Email(_) => {
                let (content, subject) = match template {
                    Some(t) if !t.content.trim().is_empty() => (t.content.as_str(), t.subject.as_str()),
                    Some(t) => (template::DEFAULT_TEMPLATE, t.subject.as_str()),
                    None => (template::DEFAULT_TEMPLATE, ""),
                };
                let subject = if subject.trim().is_empty() {
                    default_subject.to_string()
                } else {
                    template::render(subject, items, now)
                };
                Rendered {
                    title: subject,
                    body: template::render(content, items, now),
                }
            }
            Self::Webhook(_) => Rendered {
                title: webhook::digest_title(items.len()),
                body: webhook::markdown_digest(items),
            },
        }
    }
}

/// Output of rendering: subject/title plus body (HTML for email, Markdown for webhooks).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub title: String,
    pub body: String,
}

/// Delivers a rendered message. `Ok` means the whole batch was accepted.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn deliver(&self, channel: &Channel, msg: &Rendered) -> Result<()>;
}

/// Network transport: SMTP for email, HTTP POST for webhooks.
pub struct LiveTransport {
    webhook: WebhookSender,
}

impl LiveTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("news-intel/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building webhook http client")?;
        Ok(Self {
            webhook: WebhookSender::new(client),
        })
    }
}

#[async_trait]
impl Transport for LiveTransport {
    async fn deliver(&self, channel: &Channel, msg: &Rendered) -> Result<()> {
        match channel {
            Channel::Email(cfg) => EmailSender::new(cfg)?.send_html(&msg.title, &msg.body).await,
            Channel::Webhook(cfg) => self.webhook.send(cfg, &msg.title, &msg.body).await,
        }
    }
}
