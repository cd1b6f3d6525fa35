use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;

use super::{flag, int, ms, new_id, text, ts, Db};
use crate::config::ai::AiSettings;
use crate::models::{AutoPushPolicy, EmailTemplate, NewsSource, PushChannel, PushTask};

const KEY_AUTO_PUSH_ENABLED: &str = "auto_push_enabled";
const KEY_AUTO_PUSH_THRESHOLD: &str = "auto_push_threshold";
const KEY_AUTO_PUSH_CHANNEL: &str = "auto_push_channel_id";
const KEY_AUTO_PUSH_TEMPLATE: &str = "auto_push_template_id";

const AI_CONFIG_ID: &str = "default";

fn source_from_row(row: &SqliteRow) -> NewsSource {
    NewsSource {
        id: text(row, "id"),
        name: text(row, "name"),
        kind: text(row, "type"),
        url: text(row, "url"),
        category: text(row, "category"),
        enabled: flag(row, "enabled"),
        interval_mins: int(row, "interval_mins"),
        created_at: ts(row, "created_at"),
    }
}

fn channel_from_row(row: &SqliteRow) -> PushChannel {
    PushChannel {
        id: text(row, "id"),
        name: text(row, "name"),
        kind: text(row, "type"),
        config: text(row, "config"),
        enabled: flag(row, "enabled"),
        created_at: ts(row, "created_at"),
    }
}

fn template_from_row(row: &SqliteRow) -> EmailTemplate {
    EmailTemplate {
        id: text(row, "id"),
        name: text(row, "name"),
        subject: text(row, "subject"),
        content: text(row, "content"),
        is_default: flag(row, "is_default"),
        created_at: ts(row, "created_at"),
    }
}

fn task_from_row(row: &SqliteRow) -> PushTask {
    PushTask {
        id: text(row, "id"),
        name: text(row, "name"),
        cron_expr: text(row, "cron_expr"),
        channel_id: text(row, "channel_id"),
        template_id: text(row, "template_id"),
        categories: text(row, "categories"),
        enabled: flag(row, "enabled"),
        last_run_at: ts(row, "last_run_at"),
        created_at: ts(row, "created_at"),
    }
}

impl Db {
    // ---- sources ----

    pub async fn list_sources(&self) -> Result<Vec<NewsSource>> {
        let rows = sqlx::query("SELECT * FROM news_sources ORDER BY created_at ASC, name ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(source_from_row).collect())
    }

    pub async fn enabled_sources(&self) -> Result<Vec<NewsSource>> {
        let rows = sqlx::query(
            "SELECT * FROM news_sources WHERE enabled = 1 ORDER BY created_at ASC, name ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(source_from_row).collect())
    }

    pub async fn create_source(&self, src: &NewsSource) -> Result<NewsSource> {
        let mut out = src.clone();
        out.id = new_id();
        let now = Utc::now();
        out.created_at = Some(now);
        sqlx::query(
            "INSERT INTO news_sources (id, name, type, url, category, enabled, interval_mins, \
             created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&out.id)
        .bind(&out.name)
        .bind(&out.kind)
        .bind(&out.url)
        .bind(&out.category)
        .bind(out.enabled)
        .bind(out.interval_mins)
        .bind(ms(now))
        .bind(ms(now))
        .execute(&self.pool)
        .await
        .with_context(|| format!("creating source {}", out.name))?;
        Ok(out)
    }

    pub async fn update_source(&self, id: &str, src: &NewsSource) -> Result<bool> {
        let res = sqlx::query(
            "UPDATE news_sources SET name = ?, type = ?, url = ?, category = ?, enabled = ?, \
             interval_mins = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&src.name)
        .bind(&src.kind)
        .bind(&src.url)
        .bind(&src.category)
        .bind(src.enabled)
        .bind(src.interval_mins)
        .bind(ms(Utc::now()))
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn delete_source(&self, id: &str) -> Result<bool> {
        let res = sqlx::query("DELETE FROM news_sources WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    /// Insert `defaults` only when the source table is empty. Returns how many were added.
    pub async fn seed_sources(&self, defaults: &[NewsSource]) -> Result<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM news_sources")
            .fetch_one(&self.pool)
            .await?;
        if n > 0 {
            return Ok(0);
        }
        for src in defaults {
            self.create_source(src).await?;
        }
        Ok(defaults.len())
    }

    // ---- channels ----

    pub async fn list_channels(&self) -> Result<Vec<PushChannel>> {
        let rows = sqlx::query("SELECT * FROM push_channels ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(channel_from_row).collect())
    }

    pub async fn get_channel(&self, id: &str) -> Result<Option<PushChannel>> {
        let row = sqlx::query("SELECT * FROM push_channels WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(channel_from_row))
    }

    pub async fn create_channel(&self, ch: &PushChannel) -> Result<PushChannel> {
        let mut out = ch.clone();
        out.id = new_id();
        let now = Utc::now();
        out.created_at = Some(now);
        sqlx::query(
            "INSERT INTO push_channels (id, name, type, config, enabled, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&out.id)
        .bind(&out.name)
        .bind(&out.kind)
        .bind(&out.config)
        .bind(out.enabled)
        .bind(ms(now))
        .bind(ms(now))
        .execute(&self.pool)
        .await
        .with_context(|| format!("creating channel {}", out.name))?;
        Ok(out)
    }

    pub async fn update_channel(&self, id: &str, ch: &PushChannel) -> Result<bool> {
        let res = sqlx::query(
            "UPDATE push_channels SET name = ?, type = ?, config = ?, enabled = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(&ch.name)
        .bind(&ch.kind)
        .bind(&ch.config)
        .bind(ch.enabled)
        .bind(ms(Utc::now()))
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn delete_channel(&self, id: &str) -> Result<bool> {
        let res = sqlx::query("DELETE FROM push_channels WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    // ---- templates ----

    pub async fn list_templates(&self) -> Result<Vec<EmailTemplate>> {
        let rows = sqlx::query("SELECT * FROM email_templates ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(template_from_row).collect())
    }

    pub async fn get_template(&self, id: &str) -> Result<Option<EmailTemplate>> {
        let row = sqlx::query("SELECT * FROM email_templates WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(template_from_row))
    }

    /// The template flagged `is_default`, if any.
    pub async fn default_template(&self) -> Result<Option<EmailTemplate>> {
        let row = sqlx::query(
            "SELECT * FROM email_templates WHERE is_default = 1 ORDER BY updated_at DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(template_from_row))
    }

    pub async fn create_template(&self, t: &EmailTemplate) -> Result<EmailTemplate> {
        let mut out = t.clone();
        out.id = new_id();
        let now = Utc::now();
        out.created_at = Some(now);
        sqlx::query(
            "INSERT INTO email_templates (id, name, subject, content, is_default, created_at, \
             updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&out.id)
        .bind(&out.name)
        .bind(&out.subject)
        .bind(&out.content)
        .bind(out.is_default)
        .bind(ms(now))
        .bind(ms(now))
        .execute(&self.pool)
        .await
        .with_context(|| format!("creating template {}", out.name))?;
        Ok(out)
    }

    pub async fn update_template(&self, id: &str, t: &EmailTemplate) -> Result<bool> {
        let res = sqlx::query(
            "UPDATE email_templates SET name = ?, subject = ?, content = ?, is_default = ?, \
             updated_at = ? WHERE id = ?",
        )
        .bind(&t.name)
        .bind(&t.subject)
        .bind(&t.content)
        .bind(t.is_default)
        .bind(ms(Utc::now()))
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn delete_template(&self, id: &str) -> Result<bool> {
        let res = sqlx::query("DELETE FROM email_templates WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    // ---- push tasks ----

    pub async fn list_tasks(&self) -> Result<Vec<PushTask>> {
        let rows = sqlx::query("SELECT * FROM push_tasks ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(task_from_row).collect())
    }

    pub async fn enabled_tasks(&self) -> Result<Vec<PushTask>> {
        let rows = sqlx::query("SELECT * FROM push_tasks WHERE enabled = 1 ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(task_from_row).collect())
    }

    pub async fn get_task(&self, id: &str) -> Result<Option<PushTask>> {
        let row = sqlx::query("SELECT * FROM push_tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(task_from_row))
    }

    pub async fn create_task(&self, t: &PushTask) -> Result<PushTask> {
        let mut out = t.clone();
        out.id = new_id();
        let now = Utc::now();
        out.created_at = Some(now);
        out.last_run_at = None;
        sqlx::query(
            "INSERT INTO push_tasks (id, name, cron_expr, channel_id, template_id, categories, \
             enabled, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&out.id)
        .bind(&out.name)
        .bind(&out.cron_expr)
        .bind(&out.channel_id)
        .bind(&out.template_id)
        .bind(&out.categories)
        .bind(out.enabled)
        .bind(ms(now))
        .bind(ms(now))
        .execute(&self.pool)
        .await
        .with_context(|| format!("creating task {}", out.name))?;
        Ok(out)
    }

    pub async fn update_task(&self, id: &str, t: &PushTask) -> Result<bool> {
        let res = sqlx::query(
            "UPDATE push_tasks SET name = ?, cron_expr = ?, channel_id = ?, template_id = ?, \
             categories = ?, enabled = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&t.name)
        .bind(&t.cron_expr)
        .bind(&t.channel_id)
        .bind(&t.template_id)
        .bind(&t.categories)
        .bind(t.enabled)
        .bind(ms(Utc::now()))
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn delete_task(&self, id: &str) -> Result<bool> {
        let res = sqlx::query("DELETE FROM push_tasks WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn touch_task_run(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE push_tasks SET last_run_at = ? WHERE id = ?")
            .bind(ms(at))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ---- settings ----

    pub async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let v: Option<Option<String>> =
            sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(v.flatten())
    }

    pub async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO settings (key, value) VALUES (?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .with_context(|| format!("saving setting {key}"))?;
        Ok(())
    }

    /// Auto-dispatch policy; missing or malformed values fall back to defaults.
    pub async fn load_auto_push_policy(&self) -> Result<AutoPushPolicy> {
        let mut policy = AutoPushPolicy::default();
        if let Some(v) = self.get_setting(KEY_AUTO_PUSH_ENABLED).await? {
            policy.enabled = v.trim() == "1" || v.trim().eq_ignore_ascii_case("true");
        }
        if let Some(v) = self.get_setting(KEY_AUTO_PUSH_THRESHOLD).await? {
            policy.threshold = v.trim().parse().unwrap_or(policy.threshold);
        }
        if let Some(v) = self.get_setting(KEY_AUTO_PUSH_CHANNEL).await? {
            policy.channel_id = v;
        }
        if let Some(v) = self.get_setting(KEY_AUTO_PUSH_TEMPLATE).await? {
            policy.template_id = v;
        }
        Ok(policy)
    }

    pub async fn save_auto_push_policy(&self, policy: &AutoPushPolicy) -> Result<()> {
        let enabled = if policy.enabled { "1" } else { "0" };
        self.set_setting(KEY_AUTO_PUSH_ENABLED, enabled).await?;
        self.set_setting(KEY_AUTO_PUSH_THRESHOLD, &policy.threshold.to_string())
            .await?;
        self.set_setting(KEY_AUTO_PUSH_CHANNEL, &policy.channel_id)
            .await?;
        self.set_setting(KEY_AUTO_PUSH_TEMPLATE, &policy.template_id)
            .await?;
        Ok(())
    }

    // ---- AI settings ----

    pub async fn load_ai_settings(&self) -> Result<Option<AiSettings>> {
        let row = sqlx::query("SELECT * FROM ai_configs WHERE id = ?")
            .bind(AI_CONFIG_ID)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| AiSettings {
            provider: text(&r, "provider"),
            api_key: text(&r, "api_key"),
            base_url: text(&r, "base_url"),
            model: text(&r, "model"),
            enable_trans: flag(&r, "enable_trans"),
            enable_summary: flag(&r, "enable_summary"),
            target_lang: text(&r, "target_lang"),
        }))
    }

    pub async fn save_ai_settings(&self, s: &AiSettings) -> Result<()> {
        sqlx::query(
            "INSERT INTO ai_configs (id, provider, api_key, base_url, model, enable_trans, \
             enable_summary, target_lang, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET provider = excluded.provider, \
             api_key = excluded.api_key, base_url = excluded.base_url, model = excluded.model, \
             enable_trans = excluded.enable_trans, enable_summary = excluded.enable_summary, \
             target_lang = excluded.target_lang, updated_at = excluded.updated_at",
        )
        .bind(AI_CONFIG_ID)
        .bind(&s.provider)
        .bind(&s.api_key)
        .bind(&s.base_url)
        .bind(&s.model)
        .bind(s.enable_trans)
        .bind(s.enable_summary)
        .bind(&s.target_lang)
        .bind(ms(Utc::now()))
        .execute(&self.pool)
        .await
        .context("saving ai settings")?;
        Ok(())
    }
}
