//! Orchestration of collect -> enrich -> auto-push, serialised by one run lock.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::db::Db;
use crate::dispatch::{AutoPushOutcome, DispatchOutcome, Dispatcher};
use crate::enrich::{EnrichReport, Enricher};
use crate::ingest::Collector;
use crate::models::PushTask;

#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub collected: usize,
    pub enrichment: EnrichReport,
    /// `None` when the check itself failed (logged).
    pub auto_push: Option<AutoPushOutcome>,
}

pub struct Pipeline {
    db: Db,
    collector: Collector,
    enricher: Arc<Enricher>,
    dispatcher: Arc<Dispatcher>,
    run_lock: Mutex<()>,
}

impl Pipeline {
    pub fn new(
        db: Db,
        collector: Collector,
        enricher: Arc<Enricher>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            db,
            collector,
            enricher,
            dispatcher,
            run_lock: Mutex::new(()),
        }
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub fn collector(&self) -> &Collector {
        &self.collector
    }

    pub fn enricher(&self) -> &Arc<Enricher> {
        &self.enricher
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// One full pass: collect, enrich what is new, then always re-check auto-push.
    pub async fn run_once(&self) -> Result<PipelineReport> {
        let _guard = self.run_lock.lock().await;

        let fresh = self.collector.collect_all().await?;
        tracing::info!(target: "scheduler", count = fresh.len(), "collection finished");

        let enrichment = if fresh.is_empty() {
            EnrichReport::default()
        } else {
            self.enricher.process_and_move_to_reading(&fresh).await?
        };

        let auto_push = self.auto_push_logged().await;
        Ok(PipelineReport {
            collected: fresh.len(),
            enrichment,
            auto_push,
        })
    }

    /// Enrich up to `limit` items left unenriched by earlier passes.
    pub async fn process_unprocessed(&self, limit: i64) -> Result<EnrichReport> {
        let _guard = self.run_lock.lock().await;
        let report = self.enricher.process_unprocessed_news(limit).await?;
        self.auto_push_logged().await;
        Ok(report)
    }

    /// Run a push task and record `last_run_at`.
    pub async fn run_push_task(&self, task: &PushTask) -> Result<DispatchOutcome> {
        let _guard = self.run_lock.lock().await;
        let outcome = self.dispatcher.execute_push_task(task).await;
        if let Err(e) = self.db.touch_task_run(&task.id, Utc::now()).await {
            tracing::warn!(target: "scheduler", error = ?e, task = %task.name, "failed to record task run");
        }
        outcome
    }

    /// Look a task up by id and run it.
    pub async fn run_push_task_by_id(&self, id: &str) -> Result<DispatchOutcome> {
        let task = self
            .db
            .get_task(id)
            .await?
            .ok_or_else(|| anyhow!("task not found"))?;
        self.run_push_task(&task).await
    }

    async fn auto_push_logged(&self) -> Option<AutoPushOutcome> {
        match self.dispatcher.check_and_auto_push().await {
            Ok(o) => Some(o),
            Err(e) => {
                tracing::warn!(target: "dispatch", error = ?e, "auto push check failed");
                None
            }
        }
    }
}
