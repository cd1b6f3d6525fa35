// src/ingest/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// One parsed entry of an RSS/Atom feed, before it becomes a `NewsItem`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedEntry {
    pub title: String,
    pub description: String,
    pub link: String,
    pub image_url: Option<String>,
    pub author: Option<String>,
    pub published: Option<DateTime<Utc>>,
}

#[async_trait::async_trait]
pub trait FeedFetcher: Send + Sync {
    /// Fetch and parse the feed at `url`, giving up after `timeout`.
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<Vec<FeedEntry>>;
}
