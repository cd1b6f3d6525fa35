//! Row types shared by the store, the pipeline stages and the HTTP layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A collected news item. `url` is the natural key; `id` is an opaque UUID.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NewsItem {
    pub id: String,
    pub title: String,
    pub content: String,
    pub summary: String,
    pub url: String,
    pub source: String,
    pub category: String,
    pub image_url: String,
    pub author: String,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub translated: bool,
    pub trans_title: String,
    pub trans_content: String,
    pub trans_summary: String,
    pub is_filtered: bool,
    /// Comma separated free-form tags.
    pub tags: String,
    pub in_reading: bool,
    pub reading_at: Option<DateTime<Utc>>,
    pub pushed: bool,
    pub pushed_at: Option<DateTime<Utc>>,
}

/// Position of an item in the reading-window state machine.
///
/// ```text
/// New --enrich--> InWindowUnpushed --deliver--> InWindowPushed --sweep--> Cleared
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingState {
    New,
    InWindowUnpushed,
    InWindowPushed,
    Cleared,
}

impl NewsItem {
    pub fn reading_state(&self) -> ReadingState {
        match (self.in_reading, self.pushed) {
            (false, false) => ReadingState::New,
            (true, false) => ReadingState::InWindowUnpushed,
            (true, true) => ReadingState::InWindowPushed,
            (false, true) => ReadingState::Cleared,
        }
    }

    /// Title shown to readers: translated when available.
    pub fn display_title(&self) -> &str {
        if self.trans_title.is_empty() {
            &self.title
        } else {
            &self.trans_title
        }
    }

    /// Summary shown to readers: translated when available.
    pub fn display_summary(&self) -> &str {
        if self.trans_summary.is_empty() {
            &self.summary
        } else {
            &self.trans_summary
        }
    }

    /// Text fed to the summarizer: the body, or the title when the feed had none.
    pub fn summary_input(&self) -> &str {
        if self.content.trim().is_empty() {
            &self.title
        } else {
            &self.content
        }
    }
}

/// Result of enriching one item, written back in a single update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enrichment {
    pub trans_title: String,
    pub trans_summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewsSource {
    #[serde(default)]
    pub id: String,
    pub name: String,
    /// "rss" | "atom" (other kinds are stored but not collected)
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub category: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Poll interval in minutes.
    #[serde(default = "default_interval", rename = "interval")]
    pub interval_mins: i64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

fn default_interval() -> i64 {
    60
}

/// Stored channel record; `config` is the JSON blob for the channel kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PushChannel {
    #[serde(default)]
    pub id: String,
    pub name: String,
    /// "email" | "ntfy" | "webhook"
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub config: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EmailTemplate {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PushTask {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub cron_expr: String,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub template_id: String,
    /// Comma separated category filter; empty means every category.
    #[serde(default)]
    pub categories: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub last_run_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl PushTask {
    pub fn category_list(&self) -> Vec<String> {
        self.categories
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect()
    }
}

pub const DEFAULT_AUTO_PUSH_THRESHOLD: i64 = 6;

/// Auto-dispatch policy persisted in the settings table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AutoPushPolicy {
    pub enabled: bool,
    pub threshold: i64,
    pub channel_id: String,
    pub template_id: String,
}

impl Default for AutoPushPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: DEFAULT_AUTO_PUSH_THRESHOLD,
            channel_id: String::new(),
            template_id: String::new(),
        }
    }
}

impl AutoPushPolicy {
    /// Threshold with the non-positive fallback applied.
    pub fn effective_threshold(&self) -> i64 {
        if self.threshold > 0 {
            self.threshold
        } else {
            DEFAULT_AUTO_PUSH_THRESHOLD
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct Stats {
    pub total_news: i64,
    pub today_news: i64,
    pub sources_count: i64,
    pub channels_count: i64,
    pub reading_count: i64,
    pub pending_push: i64,
    pub by_category: std::collections::BTreeMap<String, i64>,
}
