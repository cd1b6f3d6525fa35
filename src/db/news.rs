use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Sqlite};
use std::collections::BTreeMap;

use super::{flag, ms, new_id, text, ts, Db};
use crate::models::{Enrichment, NewsItem, Stats};

const NEWS_COLUMNS: &str = "id, title, content, summary, url, source, category, image_url, \
     author, published_at, created_at, translated, trans_title, trans_content, trans_summary, \
     is_filtered, tags, in_reading, reading_at, pushed, pushed_at";

/// Paging filter for the main news list.
#[derive(Debug, Clone, Default)]
pub struct NewsFilter {
    pub category: Option<String>,
    pub source: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PushedFilter {
    #[default]
    All,
    Yes,
    No,
}

impl PushedFilter {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "yes" | "true" | "1" => Self::Yes,
            "no" | "false" | "0" => Self::No,
            _ => Self::All,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReadingFilter {
    pub category: Option<String>,
    pub pushed: PushedFilter,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReadingPage {
    pub data: Vec<NewsItem>,
    pub total: i64,
    pub unpushed_count: i64,
}

/// Ordering of dispatch candidates by `reading_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowOrder {
    NewestFirst,
    OldestFirst,
}

impl WindowOrder {
    fn sql(self) -> &'static str {
        match self {
            Self::NewestFirst => " ORDER BY reading_at DESC, created_at DESC",
            Self::OldestFirst => " ORDER BY reading_at ASC, created_at ASC",
        }
    }
}

fn news_from_row(row: &SqliteRow) -> NewsItem {
    NewsItem {
        id: text(row, "id"),
        title: text(row, "title"),
        content: text(row, "content"),
        summary: text(row, "summary"),
        url: text(row, "url"),
        source: text(row, "source"),
        category: text(row, "category"),
        image_url: text(row, "image_url"),
        author: text(row, "author"),
        published_at: ts(row, "published_at"),
        created_at: ts(row, "created_at"),
        translated: flag(row, "translated"),
        trans_title: text(row, "trans_title"),
        trans_content: text(row, "trans_content"),
        trans_summary: text(row, "trans_summary"),
        is_filtered: flag(row, "is_filtered"),
        tags: text(row, "tags"),
        in_reading: flag(row, "in_reading"),
        reading_at: ts(row, "reading_at"),
        pushed: flag(row, "pushed"),
        pushed_at: ts(row, "pushed_at"),
    }
}

fn push_categories(qb: &mut QueryBuilder<'_, Sqlite>, categories: &[String]) {
    if categories.is_empty() {
        return;
    }
    qb.push(" AND category IN (");
    let mut sep = qb.separated(", ");
    for c in categories {
        sep.push_bind(c.clone());
    }
    sep.push_unseparated(")");
}

impl Db {
    /// Insert unless an item with the same URL exists. Returns whether a row was written.
    pub async fn insert_if_absent(&self, item: &NewsItem) -> Result<bool> {
        let id = if item.id.is_empty() { new_id() } else { item.id.clone() };
        let created = item.created_at.unwrap_or_else(Utc::now);
        let res = sqlx::query(
            "INSERT OR IGNORE INTO news (id, title, content, summary, url, source, category, \
             image_url, author, published_at, created_at, tags) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&item.title)
        .bind(&item.content)
        .bind(&item.summary)
        .bind(&item.url)
        .bind(&item.source)
        .bind(&item.category)
        .bind(&item.image_url)
        .bind(&item.author)
        .bind(item.published_at.map(ms))
        .bind(ms(created))
        .bind(&item.tags)
        .execute(&self.pool)
        .await
        .with_context(|| format!("inserting news {}", item.url))?;
        Ok(res.rows_affected() == 1)
    }

    pub async fn get_news(&self, id: &str) -> Result<Option<NewsItem>> {
        let row = sqlx::query(&format!("SELECT {NEWS_COLUMNS} FROM news WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(news_from_row))
    }

    pub async fn get_news_by_url(&self, url: &str) -> Result<Option<NewsItem>> {
        let row = sqlx::query(&format!("SELECT {NEWS_COLUMNS} FROM news WHERE url = ?"))
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(news_from_row))
    }

    /// Newest-first page plus the total matching count.
    pub async fn list_news(&self, filter: &NewsFilter) -> Result<(Vec<NewsItem>, i64)> {
        fn where_clause(qb: &mut QueryBuilder<'_, Sqlite>, f: &NewsFilter) {
            qb.push(" WHERE is_filtered = 0");
            if let Some(c) = f.category.as_ref().filter(|c| !c.is_empty()) {
                qb.push(" AND category = ").push_bind(c.clone());
            }
            if let Some(s) = f.source.as_ref().filter(|s| !s.is_empty()) {
                qb.push(" AND source = ").push_bind(s.clone());
            }
        }

        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM news");
        where_clause(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {NEWS_COLUMNS} FROM news"));
        where_clause(&mut qb, filter);
        qb.push(" ORDER BY COALESCE(published_at, created_at) DESC LIMIT ")
            .push_bind(filter.limit.max(1))
            .push(" OFFSET ")
            .push_bind(filter.offset.max(0));
        let rows = qb.build().fetch_all(&self.pool).await?;
        Ok((rows.iter().map(news_from_row).collect(), total))
    }

    pub async fn delete_news(&self, id: &str) -> Result<bool> {
        let res = sqlx::query("DELETE FROM news WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    /// Not-yet-enriched items, most recently collected first.
    pub async fn unprocessed_news(&self, limit: i64) -> Result<Vec<NewsItem>> {
        let rows = sqlx::query(&format!(
            "SELECT {NEWS_COLUMNS} FROM news WHERE translated = 0 AND is_filtered = 0 \
             ORDER BY created_at DESC LIMIT ?"
        ))
        .bind(limit.max(1))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(news_from_row).collect())
    }

    /// Persist enrichment output and enter the reading window in one statement.
    pub async fn mark_enriched(
        &self,
        id: &str,
        enrichment: &Enrichment,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let res = sqlx::query(
            "UPDATE news SET trans_title = ?, trans_summary = ?, translated = 1, \
             in_reading = 1, reading_at = ? WHERE id = ?",
        )
        .bind(&enrichment.trans_title)
        .bind(&enrichment.trans_summary)
        .bind(ms(at))
        .bind(id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("marking {id} enriched"))?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn list_reading(&self, filter: &ReadingFilter) -> Result<ReadingPage> {
        fn where_clause(qb: &mut QueryBuilder<'_, Sqlite>, f: &ReadingFilter) {
            qb.push(" WHERE in_reading = 1");
            if let Some(c) = f.category.as_ref().filter(|c| !c.is_empty()) {
                qb.push(" AND category = ").push_bind(c.clone());
            }
            match f.pushed {
                PushedFilter::All => {}
                PushedFilter::Yes => {
                    qb.push(" AND pushed = 1");
                }
                PushedFilter::No => {
                    qb.push(" AND pushed = 0");
                }
            }
        }

        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM news");
        where_clause(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {NEWS_COLUMNS} FROM news"));
        where_clause(&mut qb, filter);
        qb.push(" ORDER BY reading_at DESC LIMIT ")
            .push_bind(filter.limit.max(1))
            .push(" OFFSET ")
            .push_bind(filter.offset.max(0));
        let rows = qb.build().fetch_all(&self.pool).await?;

        Ok(ReadingPage {
            data: rows.iter().map(news_from_row).collect(),
            total,
            unpushed_count: self.count_pending().await?,
        })
    }

    /// Put an enriched item (back) into the window with a fresh `reading_at`.
    pub async fn add_to_reading(&self, id: &str, at: DateTime<Utc>) -> Result<bool> {
        let res = sqlx::query(
            "UPDATE news SET in_reading = 1, reading_at = ? WHERE id = ? AND translated = 1",
        )
        .bind(ms(at))
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    /// Drop a delivered item from the window. Unpushed items are left alone.
    pub async fn remove_from_reading(&self, id: &str) -> Result<bool> {
        let res = sqlx::query(
            "UPDATE news SET in_reading = 0 WHERE id = ? AND in_reading = 1 AND pushed = 1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    /// Sweep every delivered item out of the window.
    pub async fn clear_pushed(&self) -> Result<u64> {
        let res = sqlx::query("UPDATE news SET in_reading = 0 WHERE in_reading = 1 AND pushed = 1")
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }

    /// Dispatch candidates: in the window, enriched and not yet delivered.
    pub async fn pending_for_push(
        &self,
        categories: &[String],
        order: WindowOrder,
        limit: i64,
    ) -> Result<Vec<NewsItem>> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {NEWS_COLUMNS} FROM news WHERE in_reading = 1 AND pushed = 0 AND translated = 1"
        ));
        push_categories(&mut qb, categories);
        qb.push(order.sql()).push(" LIMIT ").push_bind(limit.max(1));
        let rows = qb.build().fetch_all(&self.pool).await?;
        Ok(rows.iter().map(news_from_row).collect())
    }

    pub async fn count_pending(&self) -> Result<i64> {
        let n: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM news WHERE in_reading = 1 AND pushed = 0 AND translated = 1",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(n)
    }

    /// Recent window items used to preview templates.
    pub async fn recent_window_items(&self, limit: i64) -> Result<Vec<NewsItem>> {
        let rows = sqlx::query(&format!(
            "SELECT {NEWS_COLUMNS} FROM news WHERE in_reading = 1 AND translated = 1 \
             ORDER BY reading_at DESC LIMIT ?"
        ))
        .bind(limit.max(1))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(news_from_row).collect())
    }

    /// Flag a delivered batch. All rows change or none do.
    pub async fn mark_pushed(&self, ids: &[String], at: DateTime<Utc>) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut changed = 0;
        for id in ids {
            let res = sqlx::query(
                "UPDATE news SET pushed = 1, pushed_at = ? WHERE id = ? AND pushed = 0",
            )
            .bind(ms(at))
            .bind(id)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("marking {id} pushed"))?;
            changed += res.rows_affected();
        }
        tx.commit().await?;
        Ok(changed)
    }

    pub async fn stats(&self) -> Result<Stats> {
        let today_start = Utc::now()
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|d| d.and_utc().timestamp_millis())
            .unwrap_or_default();

        let total_news: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM news")
            .fetch_one(&self.pool)
            .await?;
        let today_news: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM news WHERE created_at >= ?")
            .bind(today_start)
            .fetch_one(&self.pool)
            .await?;
        let sources_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM news_sources WHERE enabled = 1")
                .fetch_one(&self.pool)
                .await?;
        let channels_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM push_channels WHERE enabled = 1")
                .fetch_one(&self.pool)
                .await?;
        let reading_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM news WHERE in_reading = 1")
                .fetch_one(&self.pool)
                .await?;

        let rows: Vec<(Option<String>, i64)> =
            sqlx::query_as("SELECT category, COUNT(*) FROM news GROUP BY category")
                .fetch_all(&self.pool)
                .await?;
        let by_category: BTreeMap<String, i64> = rows
            .into_iter()
            .map(|(c, n)| (c.unwrap_or_default(), n))
            .collect();

        Ok(Stats {
            total_news,
            today_news,
            sources_count,
            channels_count,
            reading_count,
            pending_push: self.count_pending().await?,
            by_category,
        })
    }
}
