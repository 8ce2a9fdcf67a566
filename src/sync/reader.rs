use chrono::{DateTime, Utc};
use tracing::instrument;
use uuid::Uuid;

use super::SyncService;
use crate::db;
use crate::error::{SyncError, SyncResult};
use crate::model::{ContentItem, Creator};
use crate::normalize::{extract_username, parse_date_bound};

/// Owner ids are UUIDs; anything else cannot own rows.
fn is_owner_id(owner_id: &str) -> bool {
    Uuid::parse_str(owner_id.trim()).is_ok()
}

fn date_bound(raw: Option<&str>, end_of_day: bool, name: &str) -> SyncResult<Option<DateTime<Utc>>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => parse_date_bound(s, end_of_day)
            .map(Some)
            .ok_or_else(|| SyncError::validation(format!("invalid {}: {}", name, s))),
        None => Ok(None),
    }
}

impl SyncService {
    #[instrument(skip_all)]
    pub async fn create_creator(&self, display_name: &str, handle: &str) -> SyncResult<Creator> {
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(SyncError::validation("displayName is required"));
        }
        let handle = extract_username(handle)
            .ok_or_else(|| SyncError::validation(format!("not a valid profile: {}", handle.trim())))?;
        db::create_creator(&self.pool, display_name, &handle)
            .await
            .map_err(SyncError::store)
    }

    /// The creator row, including its sync status.
    #[instrument(skip_all)]
    pub async fn sync_status(&self, owner_id: &str) -> SyncResult<Option<Creator>> {
        if !is_owner_id(owner_id) {
            return Ok(None);
        }
        db::fetch_creator(&self.pool, owner_id.trim())
            .await
            .map_err(SyncError::store)
    }

    /// Saved posts newest first. A bare-date `date_to` covers the whole day.
    #[instrument(skip_all)]
    pub async fn load_posts(
        &self,
        owner_id: &str,
        date_from: Option<&str>,
        date_to: Option<&str>,
    ) -> SyncResult<Vec<ContentItem>> {
        let from = date_bound(date_from, false, "dateFrom")?;
        let to = date_bound(date_to, true, "dateTo")?;
        if !is_owner_id(owner_id) {
            return Ok(Vec::new());
        }
        db::list_posts(&self.pool, owner_id.trim(), from, to)
            .await
            .map_err(SyncError::store)
    }

    #[instrument(skip_all)]
    pub async fn load_highlights(&self, owner_id: &str) -> SyncResult<Vec<ContentItem>> {
        if !is_owner_id(owner_id) {
            return Ok(Vec::new());
        }
        db::list_highlights(&self.pool, owner_id.trim())
            .await
            .map_err(SyncError::store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_ids_must_be_uuids() {
        assert!(is_owner_id("6f1c2a1e-1d44-4a55-9a43-8f0f6b2d7c11"));
        assert!(!is_owner_id("creator-1"));
        assert!(!is_owner_id(""));
    }

    #[test]
    fn date_bounds_parse_or_reject() {
        assert_eq!(date_bound(None, false, "dateFrom").unwrap(), None);
        assert_eq!(date_bound(Some("  "), false, "dateFrom").unwrap(), None);
        let end = date_bound(Some("2024-06-01"), true, "dateTo").unwrap().unwrap();
        assert_eq!(end.to_rfc3339(), "2024-06-01T23:59:59.999+00:00");
        assert!(matches!(
            date_bound(Some("June"), false, "dateFrom"),
            Err(SyncError::Validation(_))
        ));
    }
}
