// tests/common/mod.rs
//
// Shared fixtures: a temp SQLite store and hand-written fakes for the feed,
// LLM and delivery collaborators.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tempfile::TempDir;

use news_intel::config::ai::AiSettings;
use news_intel::db::Db;
use news_intel::dispatch::Dispatcher;
use news_intel::enrich::llm::LlmClient;
use news_intel::enrich::Enricher;
use news_intel::ingest::types::{FeedEntry, FeedFetcher};
use news_intel::ingest::Collector;
use news_intel::models::{AutoPushPolicy, NewsItem, NewsSource, PushChannel};
use news_intel::notify::{Channel, Rendered, Transport};
use news_intel::pipeline::Pipeline;

pub async fn temp_db() -> (TempDir, Db) {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = Db::connect(&dir.path().join("news.db"))
        .await
        .expect("open db");
    (dir, db)
}

pub fn ai_settings() -> AiSettings {
    AiSettings {
        api_key: "test-key".into(),
        target_lang: "en".into(),
        ..AiSettings::default()
    }
}

pub fn source(name: &str, url: &str, category: &str) -> NewsSource {
    NewsSource {
        id: String::new(),
        name: name.into(),
        kind: "rss".into(),
        url: url.into(),
        category: category.into(),
        enabled: true,
        interval_mins: 30,
        created_at: None,
    }
}

pub fn entry(title: &str, link: &str, published: Option<DateTime<Utc>>) -> FeedEntry {
    FeedEntry {
        title: title.into(),
        description: format!("Body of {title}"),
        link: link.into(),
        published,
        ..FeedEntry::default()
    }
}

/// Insert an item straight into the store (bypassing the collector).
pub async fn insert_item(db: &Db, title: &str, category: &str) -> NewsItem {
    let item = NewsItem {
        id: uuid::Uuid::new_v4().to_string(),
        title: title.into(),
        content: format!("Body of {title}"),
        url: format!("https://news.test/{}", title.replace(' ', "-")),
        source: "test".into(),
        category: category.into(),
        published_at: Some(Utc::now()),
        created_at: Some(Utc::now()),
        ..NewsItem::default()
    };
    assert!(db.insert_if_absent(&item).await.expect("insert"));
    item
}

pub async fn webhook_channel(db: &Db, enabled: bool) -> PushChannel {
    db.create_channel(&PushChannel {
        id: String::new(),
        name: "phone".into(),
        kind: "ntfy".into(),
        config: r#"{"server_url":"https://ntfy.test","topic":"news"}"#.into(),
        enabled,
        created_at: None,
    })
    .await
    .expect("create channel")
}

pub async fn enable_auto_push(db: &Db, channel_id: &str, threshold: i64) {
    db.save_auto_push_policy(&AutoPushPolicy {
        enabled: true,
        threshold,
        channel_id: channel_id.into(),
        template_id: String::new(),
    })
    .await
    .expect("save policy");
}

// ---- feeds ----

#[derive(Default)]
pub struct FakeFetcher {
    feeds: Mutex<HashMap<String, Vec<FeedEntry>>>,
    failing: Mutex<HashSet<String>>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn with_feed(self, url: &str, entries: Vec<FeedEntry>) -> Self {
        self.feeds.lock().insert(url.into(), entries);
        self
    }

    pub fn with_failure(self, url: &str) -> Self {
        self.failing.lock().insert(url.into());
        self
    }
}

#[async_trait]
impl FeedFetcher for FakeFetcher {
    async fn fetch(&self, url: &str, _timeout: Duration) -> Result<Vec<FeedEntry>> {
        self.calls.lock().push(url.to_string());
        if self.failing.lock().contains(url) {
            return Err(anyhow!("connection refused: {url}"));
        }
        self.feeds
            .lock()
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow!("404 for {url}"))
    }
}

// ---- LLM ----

/// Deterministic LLM stand-in: titles become `T:<title>`, summaries `S:<body>`,
/// for both the batch protocol and the per-item prompts.
#[derive(Default)]
pub struct FakeLlm {
    pub fail_batch: bool,
    /// Batch indexes (1-based) left out of the response.
    pub omit: Vec<usize>,
    /// Batch indexes answered with a blank title.
    pub blank: Vec<usize>,
    /// Titles whose per-item translation fails.
    pub fail_titles: Vec<String>,
    /// Per-item prompts answered with an empty reply.
    pub empty_replies: bool,
    pub prompts: Mutex<Vec<String>>,
}

impl FakeLlm {
    pub fn batch_calls(&self) -> usize {
        self.prompts.lock().iter().filter(|p| is_batch(p)).count()
    }

    pub fn single_calls(&self) -> usize {
        self.prompts.lock().iter().filter(|p| !is_batch(p)).count()
    }

    fn answer_batch(&self, prompt: &str) -> Result<String> {
        if self.fail_batch {
            return Err(anyhow!("upstream 503"));
        }
        let mut out = Vec::new();
        for chunk in prompt.split("\n### Item ").skip(1) {
            let mut lines = chunk.lines();
            let index: usize = lines.next().unwrap_or_default().trim().parse()?;
            let title = lines
                .next()
                .and_then(|l| l.strip_prefix("Title: "))
                .unwrap_or_default();
            let body = lines
                .next()
                .and_then(|l| l.strip_prefix("Content: "))
                .unwrap_or_default();
            if self.omit.contains(&index) {
                continue;
            }
            let trans_title = if self.blank.contains(&index) {
                String::new()
            } else {
                format!("T:{title}")
            };
            out.push(serde_json::json!({
                "index": index,
                "trans_title": trans_title,
                "trans_summary": format!("S:{body}"),
            }));
        }
        Ok(format!("```json\n{}\n```", serde_json::Value::Array(out)))
    }
}

fn is_batch(prompt: &str) -> bool {
    prompt.contains("\n### Item 1\n")
}

fn payload(prompt: &str) -> &str {
    prompt.split_once("\n\n").map(|(_, t)| t).unwrap_or(prompt)
}

#[async_trait]
impl LlmClient for FakeLlm {
    async fn chat(&self, _model: &str, prompt: &str, _temperature: f32) -> Result<String> {
        self.prompts.lock().push(prompt.to_string());
        if is_batch(prompt) {
            return self.answer_batch(prompt);
        }
        let text = payload(prompt);
        if self.empty_replies {
            return Ok("  ".into());
        }
        if prompt.starts_with("Translate") {
            if self.fail_titles.iter().any(|t| t == text) {
                return Err(anyhow!("rate limited"));
            }
            return Ok(format!("T:{text}"));
        }
        if prompt.starts_with("Write a concise summary") {
            return Ok(format!("S:{text}"));
        }
        Ok("<html><body>{{#each news}}{{title}}{{/each}}</body></html>".into())
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }
}

// ---- delivery ----

#[derive(Default)]
pub struct RecordingTransport {
    pub fail: Mutex<bool>,
    pub sent: Mutex<Vec<(&'static str, Rendered)>>,
}

impl RecordingTransport {
    pub fn failing() -> Self {
        Self {
            fail: Mutex::new(true),
            ..Self::default()
        }
    }

    pub fn count(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn deliver(&self, channel: &Channel, msg: &Rendered) -> Result<()> {
        if *self.fail.lock() {
            return Err(anyhow!("smtp: connection reset"));
        }
        self.sent.lock().push((channel.kind(), msg.clone()));
        Ok(())
    }
}

// ---- wiring ----

pub struct Harness {
    pub _dir: TempDir,
    pub db: Db,
    pub fetcher: Arc<FakeFetcher>,
    pub llm: Arc<FakeLlm>,
    pub transport: Arc<RecordingTransport>,
    pub pipeline: Arc<Pipeline>,
}

pub async fn harness(fetcher: FakeFetcher, llm: FakeLlm, transport: RecordingTransport) -> Harness {
    let (dir, db) = temp_db().await;
    let fetcher = Arc::new(fetcher);
    let llm = Arc::new(llm);
    let transport = Arc::new(transport);

    let collector = Collector::new(db.clone(), fetcher.clone(), Duration::from_secs(5));
    let enricher = Arc::new(Enricher::with_client(db.clone(), ai_settings(), llm.clone()));
    let dispatcher = Arc::new(Dispatcher::new(db.clone(), transport.clone()));
    let pipeline = Arc::new(Pipeline::new(db.clone(), collector, enricher, dispatcher));

    Harness {
        _dir: dir,
        db,
        fetcher,
        llm,
        transport,
        pipeline,
    }
}
