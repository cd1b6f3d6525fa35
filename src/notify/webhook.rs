use anyhow::{anyhow, Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::models::NewsItem;

/// At most this many items are listed in one digest message.
pub const DIGEST_MAX_ITEMS: usize = 10;
const DIGEST_SUMMARY_CHARS: usize = 100;

/// Stored configuration of a push-notification (ntfy-style) channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WebhookConfig {
    pub server_url: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub token: String,
}

impl WebhookConfig {
    /// `{server_url}/{topic}`
    pub fn endpoint(&self) -> String {
        let base = self.server_url.trim().trim_end_matches('/');
        let topic = self.topic.trim().trim_start_matches('/');
        if topic.is_empty() {
            base.to_string()
        } else {
            format!("{base}/{topic}")
        }
    }
}

/// Markdown digest body: numbered titles, truncated summaries, links.
pub fn markdown_digest(items: &[NewsItem]) -> String {
    let mut out = String::new();
    for (i, n) in items.iter().take(DIGEST_MAX_ITEMS).enumerate() {
        out.push_str(&format!("**{}. {}**\n", i + 1, n.display_title()));
        let summary = n.display_summary().trim();
        if !summary.is_empty() {
            if summary.chars().count() > DIGEST_SUMMARY_CHARS {
                let cut: String = summary.chars().take(DIGEST_SUMMARY_CHARS).collect();
                out.push_str(&format!("{cut}...\n"));
            } else {
                out.push_str(&format!("{summary}\n"));
            }
        }
        out.push_str(&format!("[Read more]({})\n\n", n.url));
    }
    if items.len() > DIGEST_MAX_ITEMS {
        out.push_str(&format!("...and {} more", items.len() - DIGEST_MAX_ITEMS));
    }
    out
}

pub fn digest_title(count: usize) -> String {
    format!("News digest - {count} items")
}

#[derive(Clone)]
pub struct WebhookSender {
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

impl WebhookSender {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            timeout: Duration::from_secs(10),
            max_retries: 3,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }

    fn headers(cfg: &WebhookConfig, title: &str) -> Result<HeaderMap> {
        let mut h = HeaderMap::new();
        h.insert(
            "title",
            HeaderValue::from_bytes(title.as_bytes()).context("title header")?,
        );
        h.insert("priority", HeaderValue::from_static("default"));
        h.insert("markdown", HeaderValue::from_static("yes"));
        if !cfg.token.trim().is_empty() {
            h.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", cfg.token.trim()))
                    .context("authorization header")?,
            );
        }
        Ok(h)
    }

    /// POST `body` to the channel endpoint. Connection errors and 5xx responses
    /// are retried with exponential backoff; 4xx fails immediately.
    pub async fn send(&self, cfg: &WebhookConfig, title: &str, body: &str) -> Result<()> {
        if cfg.server_url.trim().is_empty() {
            return Err(anyhow!("webhook server_url missing"));
        }
        let url = cfg.endpoint();
        let headers = Self::headers(cfg, title)?;

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&url)
                .timeout(self.timeout)
                .headers(headers.clone())
                .body(body.to_string())
                .send()
                .await;

            let retryable = match res {
                Ok(rsp) if rsp.status().is_success() => return Ok(()),
                Ok(rsp) => {
                    let status = rsp.status();
                    let text = rsp.text().await.unwrap_or_default();
                    let err = anyhow!("webhook HTTP {status}: {}", text.trim());
                    if !status.is_server_error() {
                        return Err(err);
                    }
                    err
                }
                Err(e) => anyhow!("webhook request failed: {e}"),
            };

            if attempt >= self.max_retries {
                return Err(retryable);
            }
            tracing::debug!(target: "dispatch", attempt, error = %retryable, "retrying webhook");
            tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(i: usize, summary: &str) -> NewsItem {
        NewsItem {
            title: format!("Title {i}"),
            trans_summary: summary.to_string(),
            url: format!("https://n/{i}"),
            ..Default::default()
        }
    }

    #[test]
    fn endpoint_joins_server_and_topic() {
        let c = WebhookConfig {
            server_url: "https://ntfy.sh/".into(),
            topic: "/news".into(),
            token: String::new(),
        };
        assert_eq!(c.endpoint(), "https://ntfy.sh/news");
    }

    #[test]
    fn digest_caps_items_and_truncates_summaries() {
        let long = "x".repeat(150);
        let items: Vec<_> = (1..=12).map(|i| item(i, &long)).collect();
        let md = markdown_digest(&items);
        assert!(md.starts_with("**1. Title 1**\n"));
        assert!(md.contains("**10. Title 10**"));
        assert!(!md.contains("Title 11"));
        assert!(md.contains(&format!("{}...\n", "x".repeat(100))));
        assert!(!md.contains(&"x".repeat(101)));
        assert!(md.ends_with("...and 2 more"));
        assert!(md.contains("[Read more](https://n/3)"));
    }

    #[test]
    fn headers_include_markdown_and_bearer() {
        let c = WebhookConfig {
            server_url: "https://ntfy.sh".into(),
            topic: "t".into(),
            token: "tok".into(),
        };
        let h = WebhookSender::headers(&c, "News digest - 2 items").unwrap();
        assert_eq!(h["markdown"], "yes");
        assert_eq!(h["priority"], "default");
        assert_eq!(h[AUTHORIZATION], "Bearer tok");
        assert_eq!(h["title"], "News digest - 2 items");
    }
}
