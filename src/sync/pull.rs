use serde::Serialize;
use tracing::{info, instrument, warn};

use super::{require_owner, require_username, SyncService};
use crate::error::{SyncError, SyncResult};
use crate::model::{ContentItem, JobKind, JobState, SyncJob};
use crate::normalize::{filter_posted_before, parse_date_bound};
use crate::poller::poll_status;
use crate::provider::SubmitOptions;
use crate::writer::upsert_batch;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CheckOutcome {
    pub status: CheckStatus,
    pub job_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<ContentItem>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckOutcome {
    fn processing(job_id: &str, state: &JobState) -> Self {
        Self {
            status: CheckStatus::Processing,
            job_id: job_id.to_string(),
            run_status: Some(state.as_str().to_string()),
            saved_count: None,
            items: None,
            error: None,
        }
    }
}

impl SyncService {
    /// Submit one scrape job and return its handle without waiting.
    #[instrument(skip_all, fields(owner_id = %owner_id, kind = kind.as_str()))]
    pub async fn start_sync(
        &self,
        owner_id: &str,
        target: &str,
        kind: JobKind,
        date_from: Option<&str>,
    ) -> SyncResult<SyncJob> {
        let owner_id = require_owner(owner_id)?;
        let username = require_username(target)?;
        let options = match kind {
            JobKind::Posts => SubmitOptions {
                only_newer_than: date_from
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .map(str::to_string),
                results_limit: Some(self.config.provider.results_limit),
                callback: None,
            },
            JobKind::Highlights => SubmitOptions::default(),
        };
        let job_id = self.provider.submit_job(kind, &username, &options).await?;
        info!(job_id = %job_id, username = %username, "sync job submitted");
        Ok(SyncJob {
            job_id,
            kind,
            owner_id: owner_id.to_string(),
        })
    }

    /// Poll a job once; on success normalize and persist its items.
    #[instrument(skip_all, fields(job_id = %job_id, owner_id = %owner_id, kind = kind.as_str()))]
    pub async fn check_sync(
        &self,
        job_id: &str,
        owner_id: &str,
        kind: JobKind,
        date_to: Option<&str>,
    ) -> SyncResult<CheckOutcome> {
        if job_id.trim().is_empty() {
            return Err(SyncError::validation("jobId is required"));
        }
        let owner_id = require_owner(owner_id)?;
        let date_to = match date_to.map(str::trim).filter(|d| !d.is_empty()) {
            Some(raw) => Some(
                parse_date_bound(raw, true)
                    .ok_or_else(|| SyncError::validation(format!("invalid dateTo: {}", raw)))?,
            ),
            None => None,
        };

        let outcome = poll_status(self.provider.as_ref(), job_id).await?;
        match (&outcome.state, outcome.items) {
            (JobState::Succeeded, Some(raw)) => {
                let raw = match (kind, date_to) {
                    (JobKind::Posts, Some(bound)) => filter_posted_before(raw, bound),
                    _ => raw,
                };
                let items = self.normalizer().normalize_all(&raw, kind, owner_id);
                let report = upsert_batch(
                    &self.pool,
                    self.media_host(),
                    items,
                    self.config.sync.upload_concurrency,
                )
                .await;
                info!(saved = report.saved_count, "sync job completed");
                Ok(CheckOutcome {
                    status: CheckStatus::Completed,
                    job_id: job_id.to_string(),
                    run_status: Some(outcome.state.as_str().to_string()),
                    saved_count: Some(report.saved_count),
                    items: Some(report.saved),
                    error: None,
                })
            }
            (state, _) if state.is_failure() => {
                warn!(state = state.as_str(), "sync job did not succeed");
                Ok(CheckOutcome {
                    status: CheckStatus::Failed,
                    job_id: job_id.to_string(),
                    run_status: Some(state.as_str().to_string()),
                    saved_count: None,
                    items: None,
                    error: Some(format!("Run {}", state.as_str().to_ascii_lowercase())),
                })
            }
            (state, _) => Ok(CheckOutcome::processing(job_id, state)),
        }
    }
}
