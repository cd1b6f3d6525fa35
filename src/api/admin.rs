use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{success, ApiError, ApiResult, AppState};
use crate::config::ai::AiSettings;
use crate::dispatch::Preview;
use crate::models::{AutoPushPolicy, EmailTemplate, NewsSource, PushChannel, PushTask};
use crate::notify::Channel;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/sources", get(list_sources).post(create_source))
        .route("/sources/{id}", put(update_source).delete(delete_source))
        .route("/channels", get(list_channels).post(create_channel))
        .route("/channels/{id}", put(update_channel).delete(delete_channel))
        .route("/channels/{id}/test", post(test_channel))
        .route("/tasks", get(list_tasks).post(create_task))
        .route("/tasks/{id}", put(update_task).delete(delete_task))
        .route("/tasks/{id}/run", post(run_task))
        .route("/auto-push/config", get(auto_push_config).post(save_auto_push_config))
        .route("/auto-push/status", get(auto_push_status))
        .route("/templates", get(list_templates).post(create_template))
        .route("/templates/preview", post(preview_template))
        .route("/templates/ai-generate", post(generate_template))
        .route("/templates/{id}", put(update_template).delete(delete_template))
        .route("/ai/config", get(ai_config).post(save_ai_config))
        .route("/ai/translate", post(translate))
        .route("/ai/summarize", post(summarize))
}

fn require(value: &str, field: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::bad_request(format!("{field} is required")));
    }
    Ok(())
}

fn updated(found: bool, what: &str) -> ApiResult<serde_json::Value> {
    if found {
        Ok(Json(success()))
    } else {
        Err(ApiError::not_found(what))
    }
}

// ---- sources ----

async fn list_sources(State(state): State<AppState>) -> ApiResult<Vec<NewsSource>> {
    Ok(Json(state.pipeline.db().list_sources().await?))
}

async fn create_source(
    State(state): State<AppState>,
    Json(src): Json<NewsSource>,
) -> ApiResult<NewsSource> {
    require(&src.name, "name")?;
    require(&src.url, "url")?;
    Ok(Json(state.pipeline.db().create_source(&src).await?))
}

async fn update_source(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(src): Json<NewsSource>,
) -> ApiResult<serde_json::Value> {
    updated(state.pipeline.db().update_source(&id, &src).await?, "source")
}

async fn delete_source(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<serde_json::Value> {
    updated(state.pipeline.db().delete_source(&id).await?, "source")
}

// ---- channels ----

fn validate_channel(ch: &PushChannel) -> Result<(), ApiError> {
    require(&ch.name, "name")?;
    Channel::from_record(ch).map_err(|e| ApiError::bad_request(format!("{e:#}")))?;
    Ok(())
}

async fn list_channels(State(state): State<AppState>) -> ApiResult<Vec<PushChannel>> {
    Ok(Json(state.pipeline.db().list_channels().await?))
}

async fn create_channel(
    State(state): State<AppState>,
    Json(ch): Json<PushChannel>,
) -> ApiResult<PushChannel> {
    validate_channel(&ch)?;
    Ok(Json(state.pipeline.db().create_channel(&ch).await?))
}

async fn update_channel(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(ch): Json<PushChannel>,
) -> ApiResult<serde_json::Value> {
    validate_channel(&ch)?;
    updated(state.pipeline.db().update_channel(&id, &ch).await?, "channel")
}

async fn delete_channel(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<serde_json::Value> {
    updated(state.pipeline.db().delete_channel(&id).await?, "channel")
}

async fn test_channel(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<serde_json::Value> {
    if state.pipeline.db().get_channel(&id).await?.is_none() {
        return Err(ApiError::not_found("channel"));
    }
    state.pipeline.dispatcher().send_test(&id).await?;
    Ok(Json(json!({ "success": true, "message": "Test sent successfully" })))
}

// ---- push tasks ----

fn validate_task(state: &AppState, t: &PushTask) -> Result<(), ApiError> {
    require(&t.name, "name")?;
    require(&t.channel_id, "channel_id")?;
    state
        .scheduler
        .validate(&t.cron_expr)
        .map_err(|e| ApiError::bad_request(format!("{e:#}")))
}

async fn rearm(state: &AppState) {
    if let Err(e) = state.scheduler.reload_tasks().await {
        tracing::warn!(target: "api", error = ?e, "failed to re-arm push tasks");
    }
}

async fn list_tasks(State(state): State<AppState>) -> ApiResult<Vec<PushTask>> {
    Ok(Json(state.pipeline.db().list_tasks().await?))
}

async fn create_task(
    State(state): State<AppState>,
    Json(t): Json<PushTask>,
) -> ApiResult<PushTask> {
    validate_task(&state, &t)?;
    let created = state.pipeline.db().create_task(&t).await?;
    rearm(&state).await;
    Ok(Json(created))
}

async fn update_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(t): Json<PushTask>,
) -> ApiResult<serde_json::Value> {
    validate_task(&state, &t)?;
    let found = state.pipeline.db().update_task(&id, &t).await?;
    rearm(&state).await;
    updated(found, "task")
}

async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<serde_json::Value> {
    let found = state.pipeline.db().delete_task(&id).await?;
    rearm(&state).await;
    updated(found, "task")
}

async fn run_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<serde_json::Value> {
    let Some(task) = state.pipeline.db().get_task(&id).await? else {
        return Err(ApiError::not_found("task"));
    };
    if state.pipeline.db().get_channel(&task.channel_id).await?.is_none() {
        return Err(ApiError::not_found("channel"));
    }
    let pipeline = state.pipeline.clone();
    tokio::spawn(async move {
        match pipeline.run_push_task(&task).await {
            Ok(outcome) => {
                tracing::info!(target: "api", task = %task.name, ?outcome, "manual push task finished")
            }
            Err(e) => tracing::warn!(target: "api", error = ?e, task = %task.name, "manual push task failed"),
        }
    });
    Ok(Json(json!({ "success": true, "message": "Push task started" })))
}

// ---- auto push ----

#[derive(Debug, Serialize)]
struct AutoPushView {
    #[serde(flatten)]
    policy: AutoPushPolicy,
    pending_count: i64,
}

async fn auto_push_config(State(state): State<AppState>) -> ApiResult<AutoPushView> {
    let db = state.pipeline.db();
    let policy = db.load_auto_push_policy().await?;
    let pending_count = db.count_pending().await?;
    Ok(Json(AutoPushView {
        policy,
        pending_count,
    }))
}

async fn save_auto_push_config(
    State(state): State<AppState>,
    Json(mut policy): Json<AutoPushPolicy>,
) -> ApiResult<serde_json::Value> {
    policy.threshold = policy.effective_threshold();
    state.pipeline.db().save_auto_push_policy(&policy).await?;
    tracing::info!(
        target: "api",
        enabled = policy.enabled,
        threshold = policy.threshold,
        "auto push policy saved"
    );
    Ok(Json(success()))
}

async fn auto_push_status(State(state): State<AppState>) -> ApiResult<serde_json::Value> {
    let db = state.pipeline.db();
    let policy = db.load_auto_push_policy().await?;
    let threshold = policy.effective_threshold();
    let pending = db.count_pending().await?;
    Ok(Json(json!({
        "enabled": policy.enabled,
        "threshold": threshold,
        "pending_count": pending,
        "ready": pending >= threshold,
    })))
}

// ---- templates ----

async fn list_templates(State(state): State<AppState>) -> ApiResult<Vec<EmailTemplate>> {
    Ok(Json(state.pipeline.db().list_templates().await?))
}

async fn create_template(
    State(state): State<AppState>,
    Json(t): Json<EmailTemplate>,
) -> ApiResult<EmailTemplate> {
    require(&t.name, "name")?;
    Ok(Json(state.pipeline.db().create_template(&t).await?))
}

async fn update_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(t): Json<EmailTemplate>,
) -> ApiResult<serde_json::Value> {
    updated(state.pipeline.db().update_template(&id, &t).await?, "template")
}

async fn delete_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<serde_json::Value> {
    updated(state.pipeline.db().delete_template(&id).await?, "template")
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct PreviewReq {
    #[serde(default)]
    content: String,
    #[serde(default = "default_true")]
    use_real: bool,
}

async fn preview_template(
    State(state): State<AppState>,
    Json(req): Json<PreviewReq>,
) -> ApiResult<Preview> {
    let preview = state
        .pipeline
        .dispatcher()
        .preview_template(&req.content, req.use_real)
        .await?;
    Ok(Json(preview))
}

#[derive(Debug, Deserialize)]
struct GenerateReq {
    #[serde(default)]
    description: String,
    #[serde(default)]
    current_template: String,
}

async fn generate_template(
    State(state): State<AppState>,
    Json(req): Json<GenerateReq>,
) -> ApiResult<serde_json::Value> {
    require(&req.description, "description")?;
    let template = state
        .pipeline
        .enricher()
        .generate_template(&req.description, &req.current_template)
        .await?;
    Ok(Json(json!({ "template": template })))
}

// ---- AI ----

async fn ai_config(State(state): State<AppState>) -> Json<AiSettings> {
    Json(state.pipeline.enricher().settings().redacted())
}

/// A redacted key sent back unchanged keeps the stored key.
async fn save_ai_config(
    State(state): State<AppState>,
    Json(mut settings): Json<AiSettings>,
) -> ApiResult<serde_json::Value> {
    let enricher = state.pipeline.enricher();
    if settings.api_key.starts_with("****") {
        settings.api_key = enricher.settings().api_key;
    }
    let settings = settings.normalized();
    state.pipeline.db().save_ai_settings(&settings).await?;
    enricher.reload(settings)?;
    Ok(Json(success()))
}

#[derive(Debug, Deserialize)]
struct TextReq {
    text: String,
    #[serde(default)]
    target_lang: Option<String>,
}

async fn translate(
    State(state): State<AppState>,
    Json(req): Json<TextReq>,
) -> ApiResult<serde_json::Value> {
    require(&req.text, "text")?;
    let result = state
        .pipeline
        .enricher()
        .translate(&req.text, req.target_lang.as_deref())
        .await?;
    Ok(Json(json!({ "result": result })))
}

async fn summarize(
    State(state): State<AppState>,
    Json(req): Json<TextReq>,
) -> ApiResult<serde_json::Value> {
    require(&req.text, "text")?;
    let result = state.pipeline.enricher().summarize(&req.text).await?;
    Ok(Json(json!({ "result": result })))
}
