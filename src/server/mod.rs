//! HTTP surface over the sync service.
use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::error::SyncError;
use crate::model::JobKind;
use crate::sync::SyncService;

pub const SECRET_HEADER: &str = "x-webhook-secret";

type ApiResult<T> = Result<T, SyncError>;

/// Successful responses carry `success: true` next to the payload fields.
#[derive(Debug, Serialize)]
struct Envelope<T> {
    success: bool,
    #[serde(flatten)]
    data: T,
}

fn ok<T: Serialize>(status: StatusCode, data: T) -> Response {
    (status, Json(Envelope { success: true, data })).into_response()
}

impl SyncError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            SyncError::Validation(_) => StatusCode::BAD_REQUEST,
            SyncError::Unauthorized => StatusCode::UNAUTHORIZED,
            SyncError::ProviderRejected { .. } => StatusCode::BAD_GATEWAY,
            SyncError::ProviderUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            SyncError::NotConfigured(_) | SyncError::Store(_) | SyncError::Fatal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for SyncError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "request failed");
        }
        let body = json!({ "success": false, "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}

pub fn router(service: SyncService) -> Router {
    let webhook_path = service.config.webhook.path.clone();
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/sync/start", post(start_sync))
        .route("/sync/status", post(check_sync))
        .route("/sync/background", post(start_background_sync))
        .route(&webhook_path, post(webhook))
        .route("/stories/download", post(download_stories))
        .route("/creators", post(create_creator))
        .route("/creators/:id", get(get_creator))
        .route("/creators/:id/posts", get(list_posts))
        .route("/creators/:id/highlights", get(list_highlights))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

fn parse_kind(raw: Option<&str>) -> ApiResult<JobKind> {
    match raw.map(str::trim).filter(|k| !k.is_empty()) {
        None => Ok(JobKind::Posts),
        Some(k) => {
            JobKind::parse_kind(k).ok_or_else(|| SyncError::validation(format!("unknown kind: {}", k)))
        }
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartSyncBody {
    #[serde(default, alias = "creator_id")]
    owner_id: String,
    #[serde(default, alias = "profile_url")]
    target: String,
    kind: Option<String>,
    #[serde(alias = "date_from")]
    date_from: Option<String>,
}

async fn start_sync(
    State(svc): State<SyncService>,
    Json(body): Json<StartSyncBody>,
) -> ApiResult<Response> {
    let kind = parse_kind(body.kind.as_deref())?;
    let job = svc
        .start_sync(&body.owner_id, &body.target, kind, body.date_from.as_deref())
        .await?;
    Ok(ok(
        StatusCode::ACCEPTED,
        json!({
            "status": "processing",
            "jobId": job.job_id,
            "kind": job.kind,
            "ownerId": job.owner_id,
        }),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckSyncBody {
    #[serde(default, alias = "run_id")]
    job_id: String,
    #[serde(default, alias = "creator_id")]
    owner_id: String,
    kind: Option<String>,
    #[serde(alias = "date_to")]
    date_to: Option<String>,
}

async fn check_sync(
    State(svc): State<SyncService>,
    Json(body): Json<CheckSyncBody>,
) -> ApiResult<Response> {
    let kind = parse_kind(body.kind.as_deref())?;
    let outcome = svc
        .check_sync(&body.job_id, &body.owner_id, kind, body.date_to.as_deref())
        .await?;
    Ok(ok(StatusCode::OK, outcome))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BackgroundBody {
    #[serde(default, alias = "creator_id")]
    owner_id: String,
    #[serde(default, alias = "instagram_username")]
    target: String,
}

async fn start_background_sync(
    State(svc): State<SyncService>,
    Json(body): Json<BackgroundBody>,
) -> ApiResult<Response> {
    let started = svc.start_background_sync(&body.owner_id, &body.target).await?;
    Ok(ok(StatusCode::ACCEPTED, started))
}

async fn webhook(
    State(svc): State<SyncService>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> ApiResult<Response> {
    let header_secret = headers
        .get(SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let query_secret = query.get("secret").map(String::as_str).unwrap_or_default();
    let provided = [header_secret, query_secret];

    // Malformed bodies are rejected after the secret check.
    let payload: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let outcome = svc.handle_webhook(&payload, &provided).await?;
    Ok(ok(StatusCode::OK, outcome))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoriesBody {
    #[serde(default, alias = "highlight_id")]
    highlight_id: String,
    #[serde(alias = "highlight_title")]
    highlight_title: Option<String>,
    #[serde(alias = "creator_id")]
    owner_id: Option<String>,
}

async fn download_stories(
    State(svc): State<SyncService>,
    Json(body): Json<StoriesBody>,
) -> ApiResult<Response> {
    let stories = svc
        .download_stories(
            &body.highlight_id,
            body.highlight_title.as_deref(),
            body.owner_id.as_deref(),
        )
        .await?;
    Ok(ok(
        StatusCode::OK,
        json!({ "count": stories.len(), "stories": stories }),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateCreatorBody {
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    handle: String,
}

async fn create_creator(
    State(svc): State<SyncService>,
    Json(body): Json<CreateCreatorBody>,
) -> ApiResult<Response> {
    let creator = svc.create_creator(&body.display_name, &body.handle).await?;
    Ok(ok(StatusCode::CREATED, json!({ "creator": creator })))
}

async fn get_creator(
    State(svc): State<SyncService>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    match svc.sync_status(&id).await? {
        Some(creator) => Ok(ok(StatusCode::OK, json!({ "creator": creator }))),
        None => Ok((
            StatusCode::NOT_FOUND,
            Json(json!({ "success": false, "error": format!("creator not found: {}", id) })),
        )
            .into_response()),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostsQuery {
    date_from: Option<String>,
    date_to: Option<String>,
}

async fn list_posts(
    State(svc): State<SyncService>,
    Path(id): Path<String>,
    Query(query): Query<PostsQuery>,
) -> ApiResult<Response> {
    let posts = svc
        .load_posts(&id, query.date_from.as_deref(), query.date_to.as_deref())
        .await?;
    Ok(ok(StatusCode::OK, json!({ "count": posts.len(), "posts": posts })))
}

async fn list_highlights(
    State(svc): State<SyncService>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let highlights = svc.load_highlights(&id).await?;
    Ok(ok(
        StatusCode::OK,
        json!({ "count": highlights.len(), "highlights": highlights }),
    ))
}
