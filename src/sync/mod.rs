//! Sync orchestration over the provider, the record store and the media host.
//!
//! - `pull`: submit a job and let the caller poll it to completion.
//! - `push`: submit both jobs with a callback and finish from the webhook.
//! - `stories`: on-demand story download for one highlight.
//! - `reader`: read-side queries used by the dashboard.

use std::sync::Arc;

use crate::cdn::MediaHost;
use crate::config::Config;
use crate::db::Pool;
use crate::error::{SyncError, SyncResult};
use crate::normalize::{extract_username, Normalizer};
use crate::provider::JobProvider;

pub mod pull;
pub mod push;
pub mod reader;
pub mod stories;

pub use pull::{CheckOutcome, CheckStatus};
pub use push::{BackgroundSync, WebhookOutcome};

/// Injected dependencies shared by every orchestration entry point.
#[derive(Clone)]
pub struct SyncService {
    pub pool: Pool,
    pub provider: Arc<dyn JobProvider>,
    pub media_host: Option<Arc<dyn MediaHost>>,
    pub config: Arc<Config>,
}

impl SyncService {
    pub fn new(
        pool: Pool,
        provider: Arc<dyn JobProvider>,
        media_host: Option<Arc<dyn MediaHost>>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            pool,
            provider,
            media_host,
            config,
        }
    }

    fn normalizer(&self) -> Normalizer {
        Normalizer::new(self.config.sync.min_highlight_id_len)
    }

    fn media_host(&self) -> Option<&dyn MediaHost> {
        self.media_host.as_deref()
    }
}

fn require_owner(owner_id: &str) -> SyncResult<&str> {
    let owner_id = owner_id.trim();
    if owner_id.is_empty() {
        return Err(SyncError::validation("ownerId is required"));
    }
    Ok(owner_id)
}

fn require_username(target: &str) -> SyncResult<String> {
    if target.trim().is_empty() {
        return Err(SyncError::validation("target is required"));
    }
    extract_username(target)
        .ok_or_else(|| SyncError::validation(format!("not a valid profile: {}", target.trim())))
}
