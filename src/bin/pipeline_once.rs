//! Run one collect -> enrich -> auto-push pass and print the report.

use news_intel::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    news_intel::init_tracing();

    let cfg = AppConfig::load()?;
    let pipeline = news_intel::build_pipeline(&cfg).await?;

    let report = pipeline.run_once().await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    pipeline.db().close().await;
    Ok(())
}
