//! News Intel server entrypoint.
//! Boots the store, the pipeline scheduler and the Axum admin API.

use std::sync::Arc;

use anyhow::Context;
use news_intel::{
    api::AppState,
    config::AppConfig,
    metrics::Metrics,
    scheduler::{CronCalendar, Scheduler},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    news_intel::init_tracing();

    let cfg = AppConfig::load()?;
    let metrics = Metrics::init()?;
    let pipeline = news_intel::build_pipeline(&cfg).await?;

    let scheduler = Arc::new(Scheduler::new(
        pipeline.clone(),
        Arc::new(CronCalendar),
        cfg.collect_interval(),
    ));
    let armed = scheduler.start().await?;
    tracing::info!(tasks = armed, "scheduler started");

    let state = AppState {
        pipeline: pipeline.clone(),
        scheduler: scheduler.clone(),
        process_limit: cfg.process_limit,
    };
    let app = news_intel::router(state).merge(metrics.router());

    let addr = format!("0.0.0.0:{}", cfg.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "news-intel listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    scheduler.stop();
    pipeline.db().close().await;
    tracing::info!("shut down");
    Ok(())
}
