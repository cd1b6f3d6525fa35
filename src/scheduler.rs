//! Time-based triggers: the periodic pipeline loop and cron-driven push tasks.

use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::models::PushTask;
use crate::pipeline::Pipeline;

/// Resolves the next fire time of a schedule expression.
pub trait Calendar: Send + Sync {
    fn next_after(&self, expr: &str, after: DateTime<Utc>) -> Result<DateTime<Utc>>;
}

/// Cron calendar. Classic 5-field expressions get a leading seconds field.
#[derive(Debug, Clone, Copy, Default)]
pub struct CronCalendar;

impl CronCalendar {
    fn normalize(expr: &str) -> String {
        let expr = expr.trim();
        if expr.split_whitespace().count() == 5 {
            format!("0 {expr}")
        } else {
            expr.to_string()
        }
    }
}

impl Calendar for CronCalendar {
    fn next_after(&self, expr: &str, after: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let normalized = Self::normalize(expr);
        let schedule = cron::Schedule::from_str(&normalized)
            .map_err(|e| anyhow!("invalid cron expression {expr:?}: {e}"))?;
        schedule
            .after(&after)
            .next()
            .ok_or_else(|| anyhow!("cron expression {expr:?} never fires"))
    }
}

pub struct Scheduler {
    pipeline: Arc<Pipeline>,
    calendar: Arc<dyn Calendar>,
    interval: Duration,
    pipeline_loop: Mutex<Option<JoinHandle<()>>>,
    task_loops: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(pipeline: Arc<Pipeline>, calendar: Arc<dyn Calendar>, interval: Duration) -> Self {
        Self {
            pipeline,
            calendar,
            interval,
            pipeline_loop: Mutex::new(None),
            task_loops: Mutex::new(Vec::new()),
        }
    }

    /// Check an expression before it is stored.
    pub fn validate(&self, expr: &str) -> Result<()> {
        self.calendar.next_after(expr, Utc::now()).map(|_| ())
    }

    /// Start the pipeline loop and arm every enabled push task.
    pub async fn start(&self) -> Result<usize> {
        self.start_pipeline_loop();
        self.reload_tasks().await
    }

    /// The first tick fires immediately, which doubles as the start-up pass.
    pub fn start_pipeline_loop(&self) {
        let pipeline = self.pipeline.clone();
        let every = self.interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match pipeline.run_once().await {
                    Ok(report) => tracing::info!(
                        target: "scheduler",
                        collected = report.collected,
                        enriched = report.enrichment.enriched,
                        failed = report.enrichment.failed,
                        "pipeline pass finished"
                    ),
                    Err(e) => tracing::warn!(target: "scheduler", error = ?e, "pipeline pass failed"),
                }
            }
        });

        let mut slot = self.pipeline_loop.lock().expect("scheduler mutex poisoned");
        if let Some(old) = slot.replace(handle) {
            old.abort();
        }
        tracing::info!(target: "scheduler", interval_secs = every.as_secs(), "pipeline loop started");
    }

    /// Drop all armed push tasks and arm the enabled ones from storage again.
    /// Returns how many were armed; tasks with an invalid expression are skipped.
    pub async fn reload_tasks(&self) -> Result<usize> {
        let tasks = self
            .pipeline
            .db()
            .enabled_tasks()
            .await
            .context("loading push tasks")?;

        let now = Utc::now();
        let mut armed = Vec::with_capacity(tasks.len());
        for task in tasks {
            if let Err(e) = self.calendar.next_after(&task.cron_expr, now) {
                tracing::warn!(target: "scheduler", task = %task.name, error = ?e, "skipping push task");
                continue;
            }
            armed.push(spawn_task_loop(self.pipeline.clone(), self.calendar.clone(), task));
        }
        let count = armed.len();

        let mut loops = self.task_loops.lock().expect("scheduler mutex poisoned");
        for old in loops.drain(..) {
            old.abort();
        }
        *loops = armed;
        tracing::info!(target: "scheduler", count, "push tasks armed");
        Ok(count)
    }

    pub fn armed_tasks(&self) -> usize {
        self.task_loops
            .lock()
            .expect("scheduler mutex poisoned")
            .iter()
            .filter(|h| !h.is_finished())
            .count()
    }

    pub fn stop(&self) {
        if let Some(h) = self.pipeline_loop.lock().expect("scheduler mutex poisoned").take() {
            h.abort();
        }
        for h in self.task_loops.lock().expect("scheduler mutex poisoned").drain(..) {
            h.abort();
        }
        tracing::info!(target: "scheduler", "scheduler stopped");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.pipeline_loop.lock() {
            if let Some(h) = slot.take() {
                h.abort();
            }
        }
        if let Ok(mut loops) = self.task_loops.lock() {
            for h in loops.drain(..) {
                h.abort();
            }
        }
    }
}

fn spawn_task_loop(
    pipeline: Arc<Pipeline>,
    calendar: Arc<dyn Calendar>,
    task: PushTask,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let now = Utc::now();
            let next = match calendar.next_after(&task.cron_expr, now) {
                Ok(t) => t,
                Err(e) => {
                    tracing::warn!(target: "scheduler", task = %task.name, error = ?e, "push task disarmed");
                    return;
                }
            };
            let wait = (next - now).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;

            tracing::info!(target: "scheduler", task = %task.name, "executing push task");
            match pipeline.run_push_task(&task).await {
                Ok(outcome) => {
                    tracing::info!(target: "scheduler", task = %task.name, ?outcome, "push task finished")
                }
                Err(e) => tracing::warn!(target: "scheduler", task = %task.name, error = ?e, "push task failed"),
            }
        }
    })
}
