// src/ingest/sources.rs
use crate::models::NewsSource;

fn rss(name: &str, url: &str, category: &str, interval_mins: i64) -> NewsSource {
    NewsSource {
        id: String::new(),
        name: name.to_string(),
        kind: "rss".to_string(),
        url: url.to_string(),
        category: category.to_string(),
        enabled: true,
        interval_mins,
        created_at: None,
    }
}

/// Feeds installed on first start, when no source has been configured yet.
pub fn default_sources() -> Vec<NewsSource> {
    vec![
        rss("Hacker News", "https://hnrss.org/frontpage", "tech", 30),
        rss("TechCrunch", "https://techcrunch.com/feed/", "tech", 60),
        rss("The Verge", "https://www.theverge.com/rss/index.xml", "tech", 60),
        rss(
            "Ars Technica",
            "https://feeds.arstechnica.com/arstechnica/index",
            "tech",
            60,
        ),
        rss(
            "MIT Tech Review",
            "https://www.technologyreview.com/feed/",
            "ai",
            60,
        ),
        rss(
            "AI News",
            "https://www.artificialintelligence-news.com/feed/",
            "ai",
            60,
        ),
        rss(
            "GitHub Trending",
            "https://ossinsight.io/blog/rss.xml",
            "github",
            120,
        ),
        rss(
            "Al Jazeera World",
            "https://www.aljazeera.com/xml/rss/all.xml",
            "international",
            60,
        ),
        rss(
            "BBC News",
            "https://feeds.bbci.co.uk/news/world/rss.xml",
            "international",
            60,
        ),
    ]
}
