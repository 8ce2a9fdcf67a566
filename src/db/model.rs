//! Row models used by repositories.
//!
//! Keep these structs focused on the data returned by queries; conversion
//! into domain types happens in the `From` impls below.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::model::{ContentDetail, ContentItem, Creator, MediaType, Metrics, SyncStatus};

#[derive(Debug, Clone, FromRow)]
pub struct CreatorRow {
    pub id: String,
    pub display_name: String,
    pub handle: String,
    pub sync_status: String,
    pub pending_posts_job_id: Option<String>,
    pub pending_highlights_job_id: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl From<CreatorRow> for Creator {
    fn from(row: CreatorRow) -> Self {
        Creator {
            id: row.id,
            display_name: row.display_name,
            handle: row.handle,
            // Unknown values only appear if the column was edited by hand.
            sync_status: SyncStatus::parse_status(&row.sync_status).unwrap_or(SyncStatus::Idle),
            pending_posts_job_id: row.pending_posts_job_id,
            pending_highlights_job_id: row.pending_highlights_job_id,
            last_synced_at: row.last_synced_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct PostRow {
    pub owner_id: String,
    pub shortcode: String,
    pub provider_id: Option<String>,
    pub media_type: String,
    pub caption: Option<String>,
    pub media_url: Option<String>,
    pub source_media_url: Option<String>,
    pub video_url: Option<String>,
    pub likes_count: Option<i64>,
    pub comments_count: Option<i64>,
    pub location_name: Option<String>,
    pub posted_at: Option<DateTime<Utc>>,
    pub synced_at: DateTime<Utc>,
}

impl From<PostRow> for ContentItem {
    fn from(row: PostRow) -> Self {
        ContentItem {
            owner_id: row.owner_id,
            external_id: row.shortcode,
            media_type: MediaType::parse_media(&row.media_type),
            caption: row.caption,
            media_url: row.media_url,
            source_media_url: row.source_media_url,
            posted_at: row.posted_at,
            synced_at: row.synced_at,
            detail: ContentDetail::Post {
                provider_id: row.provider_id,
                video_url: row.video_url,
                location_name: row.location_name,
                metrics: Metrics {
                    likes: row.likes_count,
                    comments: row.comments_count,
                },
            },
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct HighlightRow {
    pub owner_id: String,
    pub highlight_id: String,
    pub title: Option<String>,
    pub media_type: String,
    pub cover_url: Option<String>,
    pub source_cover_url: Option<String>,
    pub stories_count: i64,
    pub synced_at: DateTime<Utc>,
}

impl From<HighlightRow> for ContentItem {
    fn from(row: HighlightRow) -> Self {
        ContentItem {
            owner_id: row.owner_id,
            external_id: row.highlight_id,
            media_type: MediaType::parse_media(&row.media_type),
            caption: row.title,
            media_url: row.cover_url,
            source_media_url: row.source_cover_url,
            posted_at: None,
            synced_at: row.synced_at,
            detail: ContentDetail::Highlight {
                stories_count: row.stories_count,
            },
        }
    }
}
