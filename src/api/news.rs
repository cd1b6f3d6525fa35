use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::{success, ApiError, ApiResult, AppState};
use crate::db::{NewsFilter, PushedFilter, ReadingFilter, ReadingPage};
use crate::dispatch::WindowChange;
use crate::models::{NewsItem, Stats};

const DEFAULT_PAGE: i64 = 50;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/news", get(list_news))
        .route("/news/collect", post(trigger_collect))
        .route("/news/process", post(trigger_process))
        .route("/news/{id}", get(news_detail).delete(delete_news))
        .route("/reading", get(list_reading))
        .route("/reading/clear-pushed", post(clear_pushed))
        .route("/reading/{id}/add", post(add_to_reading))
        .route("/reading/{id}/remove", post(remove_from_reading))
        .route("/stats", get(stats))
}

#[derive(Debug, Default, Deserialize)]
struct PageQuery {
    category: Option<String>,
    source: Option<String>,
    pushed: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

impl PageQuery {
    fn limit(&self) -> i64 {
        self.limit.filter(|l| *l > 0).unwrap_or(DEFAULT_PAGE)
    }

    fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

fn non_empty(v: &Option<String>) -> Option<String> {
    v.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

async fn list_news(
    State(state): State<AppState>,
    Query(q): Query<PageQuery>,
) -> ApiResult<serde_json::Value> {
    let filter = NewsFilter {
        category: non_empty(&q.category),
        source: non_empty(&q.source),
        limit: q.limit(),
        offset: q.offset(),
    };
    let (data, total) = state.pipeline.db().list_news(&filter).await?;
    Ok(Json(json!({ "data": data, "total": total })))
}

async fn news_detail(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<NewsItem> {
    state
        .pipeline
        .db()
        .get_news(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("news"))
}

async fn delete_news(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<serde_json::Value> {
    if !state.pipeline.db().delete_news(&id).await? {
        return Err(ApiError::not_found("news"));
    }
    Ok(Json(success()))
}

/// Full pass in the background; the response does not wait for it.
async fn trigger_collect(State(state): State<AppState>) -> Json<serde_json::Value> {
    let pipeline = state.pipeline.clone();
    tokio::spawn(async move {
        if let Err(e) = pipeline.run_once().await {
            tracing::warn!(target: "api", error = ?e, "manual collection failed");
        }
    });
    Json(json!({ "message": "Collection and enrichment started" }))
}

async fn trigger_process(State(state): State<AppState>) -> Json<serde_json::Value> {
    let pipeline = state.pipeline.clone();
    let limit = state.process_limit;
    tokio::spawn(async move {
        if let Err(e) = pipeline.process_unprocessed(limit).await {
            tracing::warn!(target: "api", error = ?e, "manual processing failed");
        }
    });
    Json(json!({ "message": "Processing started" }))
}

async fn list_reading(
    State(state): State<AppState>,
    Query(q): Query<PageQuery>,
) -> ApiResult<ReadingPage> {
    let filter = ReadingFilter {
        category: non_empty(&q.category),
        pushed: q.pushed.as_deref().map(PushedFilter::parse).unwrap_or_default(),
        limit: q.limit(),
        offset: q.offset(),
    };
    Ok(Json(state.pipeline.dispatcher().list_reading(&filter).await?))
}

fn window_response(change: WindowChange) -> ApiResult<serde_json::Value> {
    match change {
        WindowChange::Updated => Ok(Json(success())),
        WindowChange::NotFound => Err(ApiError::not_found("news")),
        WindowChange::Rejected(reason) => Err(ApiError::conflict(reason)),
    }
}

async fn add_to_reading(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<serde_json::Value> {
    window_response(state.pipeline.dispatcher().add_to_reading(&id).await?)
}

async fn remove_from_reading(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<serde_json::Value> {
    window_response(state.pipeline.dispatcher().remove_from_reading(&id).await?)
}

async fn clear_pushed(State(state): State<AppState>) -> ApiResult<serde_json::Value> {
    let cleared = state.pipeline.dispatcher().clear_pushed().await?;
    Ok(Json(json!({
        "success": true,
        "cleared": cleared,
        "message": "Cleared pushed news from reading",
    })))
}

async fn stats(State(state): State<AppState>) -> ApiResult<Stats> {
    Ok(Json(state.pipeline.db().stats().await?))
}
