// src/lib.rs
// Library surface shared by the server binary, the one-shot binary and tests.

pub mod api;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod enrich;
pub mod ingest;
pub mod metrics;
pub mod models;
pub mod notify;
pub mod pipeline;
pub mod scheduler;

pub use crate::api::router;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{ai::AiSettings, AppConfig};
use crate::db::Db;
use crate::dispatch::Dispatcher;
use crate::enrich::Enricher;
use crate::ingest::{feed::HttpFeedFetcher, Collector};
use crate::notify::LiveTransport;
use crate::pipeline::Pipeline;

/// Compact logs filtered by `RUST_LOG`, defaulting to `news_intel=info,warn`.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("news_intel=info,warn"));

    // A second init (tests, repeated calls) is not an error worth surfacing.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init();
}

/// Open the store, seed default sources and wire the live collaborators.
///
/// Persisted AI settings win over the ones derived from the environment.
pub async fn build_pipeline(cfg: &AppConfig) -> Result<Arc<Pipeline>> {
    let db = Db::connect(&cfg.db_path)
        .await
        .with_context(|| format!("opening database {}", cfg.db_path.display()))?;

    let fetcher = Arc::new(HttpFeedFetcher::new()?);
    let collector = Collector::new(db.clone(), fetcher, cfg.feed_timeout());
    let seeded = collector.seed_default_sources().await?;
    if seeded > 0 {
        tracing::info!(count = seeded, "seeded default news sources");
    }

    let settings = match db.load_ai_settings().await? {
        Some(stored) => stored.normalized(),
        None => AiSettings::from_app_config(cfg),
    };
    let enricher = Arc::new(Enricher::new(db.clone(), settings)?);
    if !enricher.is_available() {
        tracing::warn!("no AI API key configured; enrichment is disabled");
    }

    let transport = Arc::new(LiveTransport::new()?);
    let dispatcher = Arc::new(Dispatcher::new(db.clone(), transport));

    Ok(Arc::new(Pipeline::new(db, collector, enricher, dispatcher)))
}
