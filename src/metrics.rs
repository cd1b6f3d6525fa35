use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder and register pipeline series.
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| anyhow::anyhow!("prometheus: install recorder: {e}"))?;

        describe_pipeline_metrics();

        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

/// One-time metrics registration (so series show up on /metrics).
pub fn describe_pipeline_metrics() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "collector_new_items_total",
            "Items persisted for the first time by the collector."
        );
        describe_counter!(
            "collector_source_errors_total",
            "Feed fetch/parse failures, per source."
        );
        describe_counter!(
            "enrich_items_total",
            "Items enriched and moved into the reading window."
        );
        describe_counter!(
            "enrich_batch_fallback_total",
            "Items routed from a batch call to per-item enrichment."
        );
        describe_counter!(
            "enrich_item_failures_total",
            "Items left unenriched after the per-item fallback failed."
        );
        describe_counter!(
            "dispatch_items_pushed_total",
            "Items marked pushed after a confirmed delivery."
        );
        describe_counter!("dispatch_failures_total", "Failed channel deliveries.");
        describe_gauge!(
            "reading_pending_items",
            "Enriched, unpushed items currently in the reading window."
        );
    });
}
