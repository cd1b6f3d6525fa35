// src/ingest/feed.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quick_xml::de::from_str;
use serde::Deserialize;
use std::time::Duration;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::OffsetDateTime;

use crate::ingest::types::{FeedEntry, FeedFetcher};

// ---- RSS 2.0 ----

#[derive(Debug, Deserialize)]
struct Rss {
    channel: RssChannel,
}

#[derive(Debug, Deserialize)]
struct RssChannel {
    #[serde(rename = "item", default)]
    items: Vec<RssItem>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RssItem {
    title: Option<String>,
    link: Option<String>,
    description: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    author: Option<String>,
    #[serde(rename = "dc:creator", alias = "creator")]
    creator: Option<String>,
    enclosure: Option<MediaRef>,
    #[serde(rename = "media:thumbnail", alias = "thumbnail")]
    thumbnail: Option<MediaRef>,
    #[serde(rename = "media:content", alias = "content")]
    media: Vec<MediaRef>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MediaRef {
    #[serde(rename = "@url")]
    url: String,
    #[serde(rename = "@type")]
    kind: String,
}

impl RssItem {
    fn image(&self) -> Option<String> {
        let enclosure = self
            .enclosure
            .as_ref()
            .filter(|e| e.kind.is_empty() || e.kind.starts_with("image/"));
        enclosure
            .into_iter()
            .chain(self.thumbnail.as_ref())
            .chain(self.media.iter())
            .map(|m| m.url.trim())
            .find(|u| !u.is_empty())
            .map(str::to_string)
    }

    fn into_entry(self) -> FeedEntry {
        let image_url = self.image();
        let author = self
            .author
            .or(self.creator)
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty());
        FeedEntry {
            title: self.title.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            link: self.link.unwrap_or_default().trim().to_string(),
            image_url,
            author,
            published: self.pub_date.as_deref().and_then(parse_date),
        }
    }
}

// ---- Atom ----

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AtomEntry {
    title: Option<AtomText>,
    #[serde(rename = "link")]
    links: Vec<AtomLink>,
    summary: Option<AtomText>,
    content: Option<AtomText>,
    published: Option<String>,
    updated: Option<String>,
    author: Option<AtomAuthor>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AtomText {
    #[serde(rename = "$text")]
    value: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: String,
    #[serde(rename = "@rel")]
    rel: String,
    #[serde(rename = "@type")]
    kind: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AtomAuthor {
    name: String,
}

impl AtomEntry {
    fn into_entry(self) -> FeedEntry {
        let link = self
            .links
            .iter()
            .find(|l| l.rel.is_empty() || l.rel == "alternate")
            .or_else(|| self.links.first())
            .map(|l| l.href.trim().to_string())
            .unwrap_or_default();
        let image_url = self
            .links
            .iter()
            .find(|l| l.rel == "enclosure" && l.kind.starts_with("image/"))
            .map(|l| l.href.clone());
        let description = self
            .summary
            .map(|t| t.value)
            .filter(|s| !s.trim().is_empty())
            .or_else(|| self.content.map(|t| t.value))
            .unwrap_or_default();
        FeedEntry {
            title: self.title.map(|t| t.value).unwrap_or_default(),
            description,
            link,
            image_url,
            author: self.author.map(|a| a.name).filter(|n| !n.trim().is_empty()),
            published: self
                .published
                .as_deref()
                .or(self.updated.as_deref())
                .and_then(parse_date),
        }
    }
}

/// RFC 2822 (RSS) or RFC 3339 (Atom); falls back to chrono's more lenient parsers.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    let odt = OffsetDateTime::parse(s, &Rfc2822)
        .or_else(|_| OffsetDateTime::parse(s, &Rfc3339))
        .ok();
    if let Some(dt) = odt {
        return DateTime::from_timestamp(dt.unix_timestamp(), dt.nanosecond());
    }
    DateTime::parse_from_rfc2822(s)
        .or_else(|_| DateTime::parse_from_rfc3339(s))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse an RSS 2.0 or Atom document.
pub fn parse_feed(xml: &str) -> Result<Vec<FeedEntry>> {
    let xml_clean = scrub_html_entities_for_xml(xml);
    let is_atom = xml_clean.contains("<feed") && !xml_clean.contains("<rss");
    if is_atom {
        let feed: AtomFeed = from_str(&xml_clean).context("parsing atom xml")?;
        Ok(feed.entries.into_iter().map(AtomEntry::into_entry).collect())
    } else {
        let rss: Rss = from_str(&xml_clean).context("parsing rss xml")?;
        Ok(rss.channel.items.into_iter().map(RssItem::into_entry).collect())
    }
}

/// HTML entities that feeds emit but XML does not define.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
}

pub struct HttpFeedFetcher {
    client: reqwest::Client,
}

impl HttpFeedFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("news-intel/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building feed http client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<Vec<FeedEntry>> {
        let body = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?
            .error_for_status()
            .with_context(|| format!("GET {url}"))?
            .text()
            .await
            .context("feed http .text()")?;
        parse_feed(&body).with_context(|| format!("parsing feed {url}"))
    }
}
