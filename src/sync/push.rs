use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, info, instrument, warn};

use super::{require_owner, require_username, SyncService};
use crate::db;
use crate::error::{SyncError, SyncResult};
use crate::model::{JobKind, JobState, SyncStatus};
use crate::provider::{Callback, SubmitOptions};
use crate::writer::upsert_batch;

/// Result of starting both background jobs. A failed submission leaves its
/// job id empty and reports the error next to it.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundSync {
    pub owner_id: String,
    pub posts_job_id: Option<String>,
    pub highlights_job_id: Option<String>,
    pub posts_error: Option<String>,
    pub highlights_error: Option<String>,
    pub sync_status: SyncStatus,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WebhookOutcome {
    pub owner_id: String,
    pub kind: JobKind,
    pub job_succeeded: bool,
    pub saved_count: usize,
    pub sync_status: Option<SyncStatus>,
}

/// Completion event delivered by the provider, in either envelope shape.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookPayload {
    pub owner_id: String,
    pub kind: JobKind,
    pub job_id: Option<String>,
    pub result_handle: Option<String>,
    /// Terminal state when the envelope reports one.
    pub state: Option<JobState>,
}

impl WebhookPayload {
    fn failed(&self) -> bool {
        self.state.as_ref().map(JobState::is_failure).unwrap_or(false)
    }
}

/// Correlation payload the provider echoes back with the completion event.
pub fn correlation_payload(owner_id: &str, kind: JobKind) -> Value {
    json!({
        "creator_id": owner_id,
        "sync_type": kind.as_str(),
        "run_id": "{{runId}}",
        "dataset_id": "{{defaultDatasetId}}",
    })
}

/// Parse the direct shape (`creator_id`, `sync_type`, `run_id`, `dataset_id`)
/// or the provider-wrapped shape (`eventType`, `eventData`, `resource`).
/// Unsubstituted `{{...}}` placeholders count as absent.
pub fn parse_webhook_payload(body: &Value) -> SyncResult<WebhookPayload> {
    let obj = body
        .as_object()
        .ok_or_else(|| SyncError::validation("webhook payload must be a JSON object"))?;
    let text = |v: Option<&Value>| -> Option<String> {
        let s = v?.as_str()?.trim();
        if s.is_empty() || (s.starts_with("{{") && s.ends_with("}}")) {
            None
        } else {
            Some(s.to_string())
        }
    };
    let field = |keys: &[&str]| keys.iter().find_map(|k| text(obj.get(*k)));

    let event_data = obj.get("eventData");
    let resource = obj.get("resource");
    let direct = obj.contains_key("creator_id") || obj.contains_key("ownerId");
    if !direct && event_data.is_none() {
        return Err(SyncError::validation("unknown webhook payload format"));
    }

    let owner_id = field(&["creator_id", "ownerId"])
        .ok_or_else(|| SyncError::validation("missing required field: creator_id"))?;
    let raw_kind = field(&["sync_type", "jobKind"])
        .ok_or_else(|| SyncError::validation("missing required field: sync_type"))?;
    let kind = JobKind::parse_kind(&raw_kind)
        .ok_or_else(|| SyncError::validation(format!("unknown sync_type: {}", raw_kind)))?;

    let job_id = field(&["run_id", "jobId"])
        .or_else(|| text(event_data.and_then(|d| d.get("actorRunId"))))
        .or_else(|| text(resource.and_then(|r| r.get("id"))));
    let result_handle = field(&["dataset_id", "resultHandle"])
        .or_else(|| text(event_data.and_then(|d| d.get("defaultDatasetId"))))
        .or_else(|| text(resource.and_then(|r| r.get("defaultDatasetId"))));
    let state = text(resource.and_then(|r| r.get("status")))
        .or_else(|| field(&["status"]))
        .or_else(|| {
            field(&["eventType"])
                .and_then(|e| e.strip_prefix("ACTOR.RUN.").map(str::to_string))
        })
        .map(|s| JobState::parse_state(&s));

    let payload = WebhookPayload {
        owner_id,
        kind,
        job_id,
        result_handle,
        state,
    };
    if !payload.failed() && payload.result_handle.is_none() {
        return Err(SyncError::validation("missing required field: dataset_id"));
    }
    Ok(payload)
}

/// Byte comparison whose running time does not depend on where the inputs differ.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn secret_matches(candidates: &[&str], expected: &str) -> bool {
    candidates
        .iter()
        .filter(|c| !c.is_empty())
        .fold(false, |ok, c| constant_time_eq(c.as_bytes(), expected.as_bytes()) | ok)
}

impl SyncService {
    /// Submit posts and highlights jobs that report back through the webhook.
    #[instrument(skip_all, fields(owner_id = %owner_id))]
    pub async fn start_background_sync(
        &self,
        owner_id: &str,
        target: &str,
    ) -> SyncResult<BackgroundSync> {
        let owner_id = require_owner(owner_id)?;
        let username = require_username(target)?;
        let url = self.config.callback_url().ok_or(SyncError::NotConfigured("URL"))?;
        let secret = self
            .config
            .webhook
            .secret
            .clone()
            .ok_or(SyncError::NotConfigured("SYNC_WEBHOOK_SECRET"))?;
        let previous = db::fetch_creator(&self.pool, owner_id)
            .await
            .map_err(SyncError::store)?
            .ok_or_else(|| SyncError::validation(format!("unknown creator: {}", owner_id)))?
            .sync_status;
        db::reserve_background_sync(&self.pool, owner_id)
            .await
            .map_err(SyncError::store)?;

        let mut submitted = Vec::with_capacity(2);
        for kind in [JobKind::Posts, JobKind::Highlights] {
            let mut options = SubmitOptions {
                callback: Some(Callback {
                    url: url.clone(),
                    payload: correlation_payload(owner_id, kind),
                    secret: Some(secret.clone()),
                }),
                ..SubmitOptions::default()
            };
            if kind == JobKind::Posts {
                options.only_newer_than = Some(self.config.sync.background_posts_window.clone());
                options.results_limit = Some(self.config.provider.results_limit);
            }
            match self.provider.submit_job(kind, &username, &options).await {
                Ok(job_id) => submitted.push((Some(job_id), None)),
                Err(e @ SyncError::NotConfigured(_)) => {
                    self.abandon_reservation(owner_id, previous).await;
                    return Err(e);
                }
                Err(e) => {
                    warn!(kind = kind.as_str(), error = %e, "background job submission failed");
                    submitted.push((None, Some(e.to_string())));
                }
            }
        }
        let (posts_job_id, posts_error) = submitted.remove(0);
        let (highlights_job_id, highlights_error) = submitted.remove(0);

        db::begin_background_sync(
            &self.pool,
            owner_id,
            posts_job_id.as_deref(),
            highlights_job_id.as_deref(),
        )
        .await
        .map_err(SyncError::store)?;
        if posts_job_id.is_none() && highlights_job_id.is_none() {
            db::mark_run_failed(&self.pool, owner_id)
                .await
                .map_err(SyncError::store)?;
        } else {
            // Webhooks that arrived during submission may have cleared both fields.
            db::complete_sync_if_cleared(&self.pool, owner_id, Utc::now())
                .await
                .map_err(SyncError::store)?;
        }
        let status = self
            .current_status(owner_id)
            .await?
            .unwrap_or(SyncStatus::Failed);
        info!(
            posts_job_id = ?posts_job_id,
            highlights_job_id = ?highlights_job_id,
            status = status.as_str(),
            "background sync started"
        );

        Ok(BackgroundSync {
            owner_id: owner_id.to_string(),
            posts_job_id,
            highlights_job_id,
            posts_error,
            highlights_error,
            sync_status: status,
        })
    }

    /// Verify and apply one completion event. `provided_secrets` holds every
    /// secret the request carried (header, query).
    #[instrument(skip_all)]
    pub async fn handle_webhook(
        &self,
        body: &Value,
        provided_secrets: &[&str],
    ) -> SyncResult<WebhookOutcome> {
        let expected = self
            .config
            .webhook
            .secret
            .as_deref()
            .ok_or(SyncError::NotConfigured("SYNC_WEBHOOK_SECRET"))?;
        if !secret_matches(provided_secrets, expected) {
            warn!("webhook rejected: secret mismatch");
            return Err(SyncError::Unauthorized);
        }
        let payload = parse_webhook_payload(body)?;

        match self.apply_webhook(&payload).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                error!(owner_id = %payload.owner_id, kind = payload.kind.as_str(), error = %e, "webhook processing failed");
                if let Err(mark) =
                    db::set_sync_status(&self.pool, &payload.owner_id, SyncStatus::Failed).await
                {
                    error!(owner_id = %payload.owner_id, error = %format!("{mark:#}"), "failed to mark sync as failed");
                }
                Err(e)
            }
        }
    }

    async fn apply_webhook(&self, payload: &WebhookPayload) -> SyncResult<WebhookOutcome> {
        let owner_id = payload.owner_id.as_str();
        let kind = payload.kind;

        if payload.failed() {
            let cleared =
                db::clear_pending_job(&self.pool, owner_id, kind, payload.job_id.as_deref())
                    .await
                    .map_err(SyncError::store)?;
            if cleared {
                db::mark_run_failed(&self.pool, owner_id)
                    .await
                    .map_err(SyncError::store)?;
            }
            warn!(owner_id, kind = kind.as_str(), job_id = ?payload.job_id, cleared, "background job failed");
            return Ok(WebhookOutcome {
                owner_id: owner_id.to_string(),
                kind,
                job_succeeded: false,
                saved_count: 0,
                sync_status: self.current_status(owner_id).await?,
            });
        }

        let handle = payload
            .result_handle
            .as_deref()
            .ok_or_else(|| SyncError::validation("missing required field: dataset_id"))?;
        let raw = self.provider.fetch_items(handle).await?;
        let items = self.normalizer().normalize_all(&raw, kind, owner_id);
        let report = upsert_batch(
            &self.pool,
            self.media_host(),
            items,
            self.config.sync.upload_concurrency,
        )
        .await;

        db::clear_pending_job(&self.pool, owner_id, kind, payload.job_id.as_deref())
            .await
            .map_err(SyncError::store)?;
        let completed = db::complete_sync_if_cleared(&self.pool, owner_id, Utc::now())
            .await
            .map_err(SyncError::store)?;
        info!(
            owner_id,
            kind = kind.as_str(),
            saved = report.saved_count,
            completed,
            "webhook processed"
        );

        Ok(WebhookOutcome {
            owner_id: owner_id.to_string(),
            kind,
            job_succeeded: true,
            saved_count: report.saved_count,
            sync_status: self.current_status(owner_id).await?,
        })
    }

    async fn abandon_reservation(&self, owner_id: &str, previous: SyncStatus) {
        if let Err(e) = db::begin_background_sync(&self.pool, owner_id, None, None).await {
            error!(owner_id, error = %format!("{e:#}"), "failed to release sync reservation");
        }
        if let Err(e) = db::set_sync_status(&self.pool, owner_id, previous).await {
            error!(owner_id, error = %format!("{e:#}"), "failed to release sync reservation");
        }
    }

    async fn current_status(&self, owner_id: &str) -> SyncResult<Option<SyncStatus>> {
        let creator = db::fetch_creator(&self.pool, owner_id)
            .await
            .map_err(SyncError::store)?;
        Ok(creator.map(|c| c.sync_status))
    }
}
