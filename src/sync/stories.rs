use chrono::Utc;
use futures::stream::{self, StreamExt};
use tracing::{info, instrument, warn};

use super::SyncService;
use crate::cdn::MediaUpload;
use crate::db;
use crate::error::{SyncError, SyncResult};
use crate::model::StoryItem;
use crate::normalize::strip_highlight_prefix;

pub const STORY_UPLOAD_CONCURRENCY: usize = 3;

impl SyncService {
    /// Fetch every story frame of one highlight. Frames are persisted only
    /// when `owner_id` is given; otherwise they are returned as fetched.
    #[instrument(skip_all, fields(highlight_id = %highlight_id))]
    pub async fn download_stories(
        &self,
        highlight_id: &str,
        highlight_title: Option<&str>,
        owner_id: Option<&str>,
    ) -> SyncResult<Vec<StoryItem>> {
        let highlight_id = strip_highlight_prefix(highlight_id.trim()).trim();
        if highlight_id.is_empty() {
            return Err(SyncError::validation("highlightId is required"));
        }

        let raw = self.provider.run_stories(highlight_id).await?;
        let normalizer = self.normalizer();
        let stories: Vec<StoryItem> = raw
            .iter()
            .enumerate()
            .map(|(index, item)| normalizer.normalize_story(item, index, highlight_id))
            .collect();
        info!(count = stories.len(), "fetched highlight stories");

        let Some(owner_id) = owner_id.map(str::trim).filter(|o| !o.is_empty()) else {
            return Ok(stories);
        };

        let stories: Vec<StoryItem> = stream::iter(stories)
            .map(|story| self.rehost_story(owner_id, story))
            .buffered(STORY_UPLOAD_CONCURRENCY)
            .collect()
            .await;

        let synced_at = Utc::now();
        let mut saved = 0usize;
        for story in &stories {
            match db::upsert_story(&self.pool, owner_id, highlight_title, story, synced_at).await {
                Ok(()) => saved += 1,
                Err(e) => warn!(
                    owner_id,
                    story_id = %story.external_id,
                    error = %format!("{e:#}"),
                    "failed to save story"
                ),
            }
        }
        info!(owner_id, saved, total = stories.len(), "stories saved");
        Ok(stories)
    }

    async fn rehost_story(&self, owner_id: &str, mut story: StoryItem) -> StoryItem {
        let Some(host) = self.media_host() else {
            return story;
        };
        let Some(source) = story.media_url.clone().or_else(|| story.thumbnail_url.clone()) else {
            return story;
        };
        let upload = MediaUpload::story(owner_id, &story.external_id, story.media_type, &source);
        match host.upload(&upload).await {
            Ok(hosted) => story.media_url = Some(hosted),
            Err(e) => warn!(
                story_id = %story.external_id,
                error = %format!("{e:#}"),
                "story upload failed, keeping source URL"
            ),
        }
        story
    }
}
