// src/ingest/mod.rs
pub mod feed;
pub mod sources;
pub mod types;

use anyhow::Result;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use metrics::counter;
use once_cell::sync::OnceCell;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;

use crate::db::Db;
use crate::ingest::types::{FeedEntry, FeedFetcher};
use crate::models::{NewsItem, NewsSource};

/// Entries published longer ago than this are not collected.
pub const FRESHNESS_WINDOW_HOURS: i64 = 24;

const TITLE_MAX_CHARS: usize = 500;
const CONTENT_MAX_CHARS: usize = 5000;

/// Normalize feed text: decode entities, strip tags, collapse whitespace, cap length.
pub fn clean_text(s: &str, max_chars: usize) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Entities that were double-escaped in the feed
    out = html_escape::decode_html_entities(&out).to_string();

    // 4) Collapse whitespace
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").expect("ws regex"));
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // 5) Length cap
    if out.chars().count() > max_chars {
        out = out.chars().take(max_chars).collect();
    }
    out
}

/// `published` is within the freshness window of `now`. Undated entries count as fresh.
pub fn is_fresh(published: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match published {
        Some(p) => now.signed_duration_since(p) <= ChronoDuration::hours(FRESHNESS_WINDOW_HOURS),
        None => true,
    }
}

/// Turn a parsed entry into a store record, or `None` when stale or unlinkable.
pub fn entry_to_item(source: &NewsSource, entry: FeedEntry, now: DateTime<Utc>) -> Option<NewsItem> {
    if !is_fresh(entry.published, now) || entry.link.is_empty() {
        return None;
    }
    Some(NewsItem {
        id: uuid::Uuid::new_v4().to_string(),
        title: clean_text(&entry.title, TITLE_MAX_CHARS),
        content: clean_text(&entry.description, CONTENT_MAX_CHARS),
        url: entry.link,
        source: source.name.clone(),
        category: source.category.clone(),
        image_url: entry.image_url.unwrap_or_default(),
        author: entry.author.unwrap_or_default(),
        published_at: Some(entry.published.unwrap_or(now)),
        created_at: Some(now),
        ..Default::default()
    })
}

fn is_collectable(source: &NewsSource) -> bool {
    matches!(source.kind.to_ascii_lowercase().as_str(), "rss" | "atom")
}

/// Fetches every enabled source and persists the entries not seen before.
pub struct Collector {
    db: Db,
    fetcher: Arc<dyn FeedFetcher>,
    timeout: Duration,
}

impl Collector {
    pub fn new(db: Db, fetcher: Arc<dyn FeedFetcher>, timeout: Duration) -> Self {
        crate::metrics::describe_pipeline_metrics();
        Self {
            db,
            fetcher,
            timeout,
        }
    }

    /// Install the built-in sources when none are configured.
    pub async fn seed_default_sources(&self) -> Result<usize> {
        let n = self.db.seed_sources(&sources::default_sources()).await?;
        if n > 0 {
            tracing::info!(target: "collector", count = n, "default news sources initialized");
        }
        Ok(n)
    }

    /// Collect all enabled sources. Returns only the items newly persisted by this call.
    ///
    /// A failing source is logged and skipped; the others are still collected.
    pub async fn collect_all(&self) -> Result<Vec<NewsItem>> {
        let sources = self.db.enabled_sources().await?;
        let mut fresh = Vec::new();

        for source in &sources {
            if !is_collectable(source) {
                tracing::debug!(target: "collector", source = %source.name, kind = %source.kind, "skipping non-feed source");
                continue;
            }
            match self.collect_source(source).await {
                Ok(mut items) => {
                    tracing::info!(target: "collector", source = %source.name, count = items.len(), "collected");
                    fresh.append(&mut items);
                }
                Err(e) => {
                    tracing::warn!(target: "collector", error = ?e, source = %source.name, "source error");
                    counter!("collector_source_errors_total", "source" => source.name.clone())
                        .increment(1);
                }
            }
        }

        counter!("collector_new_items_total").increment(fresh.len() as u64);
        Ok(fresh)
    }

    /// Fetch one source and insert its fresh entries.
    pub async fn collect_source(&self, source: &NewsSource) -> Result<Vec<NewsItem>> {
        let entries = self.fetcher.fetch(&source.url, self.timeout).await?;
        let now = Utc::now();

        let mut saved = Vec::new();
        for entry in entries {
            let Some(item) = entry_to_item(source, entry, now) else {
                continue;
            };
            match self.db.insert_if_absent(&item).await {
                Ok(true) => saved.push(item),
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(target: "collector", error = ?e, url = %item.url, "failed to save news");
                }
            }
        }
        Ok(saved)
    }
}
