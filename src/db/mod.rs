//! SQLite-backed store for news items and the administrative tables.
//!
//! Timestamps are stored as INTEGER unix milliseconds, booleans as 0/1.
//! Row readers are lenient: a NULL or mistyped column yields the field's
//! default instead of failing the whole query.

mod admin;
mod news;

pub use news::{NewsFilter, PushedFilter, ReadingFilter, ReadingPage, WindowOrder};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;
use std::time::Duration;

#[derive(Clone)]
pub struct Db {
    pool: SqlitePool,
}

impl Db {
    /// Open (creating if needed) the database at `path` and apply the schema.
    pub async fn connect(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("opening sqlite db {}", path.display()))?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Idempotent schema setup.
    pub async fn migrate(&self) -> Result<()> {
        for stmt in SCHEMA {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .with_context(|| format!("applying schema: {}", first_line(stmt)))?;
        }
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS news (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        content TEXT,
        summary TEXT,
        url TEXT UNIQUE,
        source TEXT,
        category TEXT,
        image_url TEXT,
        author TEXT,
        published_at INTEGER,
        created_at INTEGER NOT NULL,
        translated INTEGER NOT NULL DEFAULT 0,
        trans_title TEXT,
        trans_content TEXT,
        trans_summary TEXT,
        is_filtered INTEGER NOT NULL DEFAULT 0,
        tags TEXT,
        in_reading INTEGER NOT NULL DEFAULT 0,
        reading_at INTEGER,
        pushed INTEGER NOT NULL DEFAULT 0,
        pushed_at INTEGER
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS news_sources (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        type TEXT NOT NULL,
        url TEXT,
        category TEXT,
        enabled INTEGER NOT NULL DEFAULT 1,
        interval_mins INTEGER NOT NULL DEFAULT 60,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS push_channels (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        type TEXT NOT NULL,
        config TEXT,
        enabled INTEGER NOT NULL DEFAULT 1,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS email_templates (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        subject TEXT,
        content TEXT,
        is_default INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS ai_configs (
        id TEXT PRIMARY KEY,
        provider TEXT NOT NULL,
        api_key TEXT,
        base_url TEXT,
        model TEXT,
        enable_trans INTEGER NOT NULL DEFAULT 1,
        enable_summary INTEGER NOT NULL DEFAULT 1,
        target_lang TEXT NOT NULL DEFAULT 'zh-CN',
        updated_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS push_tasks (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        cron_expr TEXT,
        channel_id TEXT,
        template_id TEXT,
        categories TEXT,
        enabled INTEGER NOT NULL DEFAULT 1,
        last_run_at INTEGER,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS settings (
        key TEXT PRIMARY KEY,
        value TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_news_source ON news(source)",
    "CREATE INDEX IF NOT EXISTS idx_news_category ON news(category)",
    "CREATE INDEX IF NOT EXISTS idx_news_created ON news(created_at)",
    "CREATE INDEX IF NOT EXISTS idx_news_published ON news(published_at)",
    "CREATE INDEX IF NOT EXISTS idx_news_reading ON news(in_reading, pushed, reading_at)",
    "CREATE INDEX IF NOT EXISTS idx_news_translated ON news(translated)",
];

fn first_line(stmt: &str) -> &str {
    stmt.trim().lines().next().unwrap_or_default()
}

// --- lenient column readers ---

pub(crate) fn text(row: &SqliteRow, col: &str) -> String {
    row.try_get::<Option<String>, _>(col)
        .ok()
        .flatten()
        .unwrap_or_default()
}

pub(crate) fn flag(row: &SqliteRow, col: &str) -> bool {
    row.try_get::<Option<i64>, _>(col)
        .ok()
        .flatten()
        .unwrap_or(0)
        != 0
}

pub(crate) fn int(row: &SqliteRow, col: &str) -> i64 {
    row.try_get::<Option<i64>, _>(col)
        .ok()
        .flatten()
        .unwrap_or(0)
}

pub(crate) fn ts(row: &SqliteRow, col: &str) -> Option<DateTime<Utc>> {
    row.try_get::<Option<i64>, _>(col)
        .ok()
        .flatten()
        .and_then(DateTime::from_timestamp_millis)
}

pub(crate) fn ms(t: DateTime<Utc>) -> i64 {
    t.timestamp_millis()
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
