//! Reading-window administration and the dispatch controller.
//!
//! Items move `New -> InWindowUnpushed -> InWindowPushed -> Cleared`. Dispatch
//! only marks items pushed after the transport confirmed delivery of the whole
//! batch; a failed delivery leaves every selected item untouched.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use serde::Serialize;

use crate::db::{Db, ReadingFilter, ReadingPage, WindowOrder};
use crate::models::{AutoPushPolicy, EmailTemplate, NewsItem, PushTask, ReadingState};
use crate::notify::{template, Channel, Transport};

/// Upper bound on items delivered by one push task run.
pub const MANUAL_PUSH_LIMIT: i64 = 20;
const PREVIEW_ITEMS: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// Nothing eligible; no delivery attempted.
    Empty,
    Delivered { count: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AutoPushOutcome {
    Disabled,
    NoChannel,
    Waiting { pending: i64, threshold: i64 },
    Pushed { count: usize },
}

#[derive(Debug, Clone, Serialize)]
pub struct Preview {
    pub html: String,
    pub news_count: usize,
}

/// Result of a manual reading-window edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowChange {
    Updated,
    NotFound,
    /// The item's state does not allow the transition.
    Rejected(&'static str),
}

pub struct Dispatcher {
    db: Db,
    transport: Arc<dyn Transport>,
}

impl Dispatcher {
    pub fn new(db: Db, transport: Arc<dyn Transport>) -> Self {
        crate::metrics::describe_pipeline_metrics();
        Self { db, transport }
    }

    /// Deliver up to [`MANUAL_PUSH_LIMIT`] unpushed window items, newest first,
    /// restricted to the task's categories.
    pub async fn execute_push_task(&self, task: &PushTask) -> Result<DispatchOutcome> {
        let rec = self
            .db
            .get_channel(&task.channel_id)
            .await?
            .ok_or_else(|| anyhow!("channel not found"))?;
        if !rec.enabled {
            return Err(anyhow!("channel {} is disabled", rec.name));
        }
        let channel = Channel::from_record(&rec)?;

        let items = self
            .db
            .pending_for_push(&task.category_list(), WindowOrder::NewestFirst, MANUAL_PUSH_LIMIT)
            .await?;
        if items.is_empty() {
            tracing::info!(target: "dispatch", task = %task.name, "no news to push");
            return Ok(DispatchOutcome::Empty);
        }

        let tpl = self.resolve_template(&task.template_id).await?;
        let now = Utc::now();
        let subject = format!("News Intel Daily - {}", now.format("%Y-%m-%d"));
        let count = self
            .deliver_and_mark(&channel, &items, tpl.as_ref(), &subject, now)
            .await?;
        tracing::info!(target: "dispatch", task = %task.name, channel = %rec.name, count, "push task delivered");
        Ok(DispatchOutcome::Delivered { count })
    }

    /// Level-triggered auto-dispatch check against the stored policy.
    pub async fn check_and_auto_push(&self) -> Result<AutoPushOutcome> {
        let policy: AutoPushPolicy = self.db.load_auto_push_policy().await?;
        if !policy.enabled {
            return Ok(AutoPushOutcome::Disabled);
        }
        if policy.channel_id.trim().is_empty() {
            tracing::warn!(target: "dispatch", "auto push enabled but no channel configured");
            return Ok(AutoPushOutcome::NoChannel);
        }
        let Some(rec) = self.db.get_channel(&policy.channel_id).await? else {
            tracing::warn!(target: "dispatch", channel_id = %policy.channel_id, "auto push channel not found");
            return Ok(AutoPushOutcome::NoChannel);
        };
        if !rec.enabled {
            tracing::warn!(target: "dispatch", channel = %rec.name, "auto push channel is disabled");
            return Ok(AutoPushOutcome::NoChannel);
        }

        let threshold = policy.effective_threshold();
        let pending = self.db.count_pending().await?;
        gauge!("reading_pending_items").set(pending as f64);
        if pending < threshold {
            tracing::info!(target: "dispatch", pending, threshold, "waiting for more news before auto push");
            return Ok(AutoPushOutcome::Waiting { pending, threshold });
        }

        let channel = Channel::from_record(&rec)?;
        let items = self
            .db
            .pending_for_push(&[], WindowOrder::OldestFirst, threshold)
            .await?;
        let tpl = self.resolve_template(&policy.template_id).await?;
        let now = Utc::now();
        let subject = format!("News Intel - {}", now.format("%Y-%m-%d %H:%M"));
        let count = self
            .deliver_and_mark(&channel, &items, tpl.as_ref(), &subject, now)
            .await?;
        tracing::info!(target: "dispatch", channel = %rec.name, count, threshold, "auto push delivered");
        Ok(AutoPushOutcome::Pushed { count })
    }

    async fn deliver_and_mark(
        &self,
        channel: &Channel,
        items: &[NewsItem],
        tpl: Option<&EmailTemplate>,
        default_subject: &str,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let msg = channel.render(items, tpl, default_subject, now);
        if let Err(e) = self.transport.deliver(channel, &msg).await {
            counter!("dispatch_failures_total", "channel" => channel.kind()).increment(1);
            tracing::warn!(target: "dispatch", error = ?e, channel = channel.kind(), count = items.len(), "delivery failed");
            return Err(e.context("delivery failed"));
        }

        let ids: Vec<String> = items.iter().map(|n| n.id.clone()).collect();
        let marked = self.db.mark_pushed(&ids, now).await?;
        counter!("dispatch_items_pushed_total").increment(marked);
        if let Ok(n) = self.db.count_pending().await {
            gauge!("reading_pending_items").set(n as f64);
        }
        Ok(marked as usize)
    }

    /// The requested template, else the one flagged default, else none (built-in).
    async fn resolve_template(&self, id: &str) -> Result<Option<EmailTemplate>> {
        if !id.trim().is_empty() {
            if let Some(t) = self.db.get_template(id).await? {
                return Ok(Some(t));
            }
            tracing::warn!(target: "dispatch", template_id = %id, "template not found, using default");
        }
        self.db.default_template().await
    }

    /// Send the sample digest through a channel to check its configuration.
    pub async fn send_test(&self, channel_id: &str) -> Result<()> {
        let rec = self
            .db
            .get_channel(channel_id)
            .await?
            .ok_or_else(|| anyhow!("channel not found"))?;
        let channel = Channel::from_record(&rec)?;
        let now = Utc::now();
        let subject = format!("News Intel test - {}", now.format("%Y-%m-%d %H:%M"));
        let msg = channel.render(&template::sample_items(), None, &subject, now);
        self.transport.deliver(&channel, &msg).await
    }

    /// Render `content` against the newest window items, or sample items when
    /// `use_real` is false or the window is empty.
    pub async fn preview_template(&self, content: &str, use_real: bool) -> Result<Preview> {
        let mut items = if use_real {
            self.db.recent_window_items(PREVIEW_ITEMS).await?
        } else {
            Vec::new()
        };
        if items.is_empty() {
            items = template::sample_items();
        }
        let content = if content.trim().is_empty() {
            template::DEFAULT_TEMPLATE
        } else {
            content
        };
        Ok(Preview {
            html: template::render(content, &items, Utc::now()),
            news_count: items.len(),
        })
    }

    // ---- reading window ----

    pub async fn list_reading(&self, filter: &ReadingFilter) -> Result<ReadingPage> {
        self.db.list_reading(filter).await
    }

    /// (Re-)enter the window with a fresh `reading_at`. Unenriched items are rejected.
    pub async fn add_to_reading(&self, id: &str) -> Result<WindowChange> {
        let Some(item) = self.db.get_news(id).await? else {
            return Ok(WindowChange::NotFound);
        };
        if !item.translated {
            return Ok(WindowChange::Rejected("news has not been processed yet"));
        }
        self.db.add_to_reading(id, Utc::now()).await?;
        Ok(WindowChange::Updated)
    }

    /// Remove one item from the window; only delivered items may leave.
    pub async fn remove_from_reading(&self, id: &str) -> Result<WindowChange> {
        let Some(item) = self.db.get_news(id).await? else {
            return Ok(WindowChange::NotFound);
        };
        match item.reading_state() {
            ReadingState::InWindowPushed => {
                self.db.remove_from_reading(id).await?;
                Ok(WindowChange::Updated)
            }
            ReadingState::InWindowUnpushed => {
                Ok(WindowChange::Rejected("news has not been pushed yet"))
            }
            ReadingState::New | ReadingState::Cleared => {
                Ok(WindowChange::Rejected("news is not in the reading window"))
            }
        }
    }

    pub async fn clear_pushed(&self) -> Result<u64> {
        let n = self.db.clear_pushed().await?;
        tracing::info!(target: "dispatch", count = n, "cleared pushed news from reading window");
        Ok(n)
    }

    pub async fn pending_count(&self) -> Result<i64> {
        self.db.count_pending().await
    }
}
