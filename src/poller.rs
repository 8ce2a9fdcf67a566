use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::error::{SyncError, SyncResult};
use crate::model::JobState;
use crate::provider::JobProvider;

/// Current state of a job, with its raw items once it has succeeded.
#[derive(Debug, Clone, PartialEq)]
pub struct PollOutcome {
    pub state: JobState,
    pub items: Option<Vec<Value>>,
}

/// Query a job once. Safe to call repeatedly while the job is running.
#[instrument(skip_all, fields(job_id = %job_id))]
pub async fn poll_status(provider: &dyn JobProvider, job_id: &str) -> SyncResult<PollOutcome> {
    let run = provider.job_status(job_id).await?;
    let items = match &run.state {
        JobState::Succeeded => {
            let handle = run.result_handle.as_deref().ok_or_else(|| {
                SyncError::ProviderRejected {
                    status: 200,
                    body: format!("job {} succeeded without a result set", job_id),
                }
            })?;
            let items = provider.fetch_items(handle).await?;
            info!(job_id, count = items.len(), "job succeeded");
            Some(items)
        }
        JobState::Unknown(raw) => {
            warn!(job_id, state = %raw, "unrecognized provider state");
            None
        }
        _ => None,
    };
    Ok(PollOutcome {
        state: run.state,
        items,
    })
}
