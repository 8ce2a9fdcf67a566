use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which slice of a creator's profile a provider job scrapes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Posts,
    Highlights,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Posts => "posts",
            JobKind::Highlights => "highlights",
        }
    }

    pub fn parse_kind(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "posts" | "post" => Some(JobKind::Posts),
            "highlights" | "highlight" => Some(JobKind::Highlights),
            _ => None,
        }
    }
}

/// Lifecycle of a provider job as reported by the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum JobState {
    Running,
    Succeeded,
    Failed,
    Aborted,
    TimedOut,
    /// A state value this build does not recognize; carried verbatim.
    Unknown(String),
}

impl JobState {
    pub fn parse_state(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().replace('_', "-").as_str() {
            "READY" | "RUNNING" => JobState::Running,
            "SUCCEEDED" => JobState::Succeeded,
            "FAILED" => JobState::Failed,
            "ABORTED" => JobState::Aborted,
            "TIMED-OUT" => JobState::TimedOut,
            // ABORTING and TIMING-OUT land here; the run has not stopped yet.
            _ => JobState::Unknown(raw.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::Aborted | JobState::TimedOut
        )
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            JobState::Failed | JobState::Aborted | JobState::TimedOut
        )
    }

    pub fn as_str(&self) -> &str {
        match self {
            JobState::Running => "RUNNING",
            JobState::Succeeded => "SUCCEEDED",
            JobState::Failed => "FAILED",
            JobState::Aborted => "ABORTED",
            JobState::TimedOut => "TIMED-OUT",
            JobState::Unknown(raw) => raw.as_str(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Idle,
    Syncing,
    Completed,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Idle => "idle",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Completed => "completed",
            SyncStatus::Failed => "failed",
        }
    }

    pub fn parse_status(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(SyncStatus::Idle),
            "syncing" => Some(SyncStatus::Syncing),
            "completed" => Some(SyncStatus::Completed),
            "failed" => Some(SyncStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Image => "image",
            MediaType::Video => "video",
        }
    }

    pub fn parse_media(s: &str) -> Self {
        if s.eq_ignore_ascii_case("video") {
            MediaType::Video
        } else {
            MediaType::Image
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Creator {
    pub id: String,
    pub display_name: String,
    pub handle: String,
    pub sync_status: SyncStatus,
    pub pending_posts_job_id: Option<String>,
    pub pending_highlights_job_id: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub likes: Option<i64>,
    pub comments: Option<i64>,
}

/// Variant-specific fields of a synced content record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ContentDetail {
    #[serde(rename_all = "camelCase")]
    Post {
        provider_id: Option<String>,
        video_url: Option<String>,
        location_name: Option<String>,
        metrics: Metrics,
    },
    #[serde(rename_all = "camelCase")]
    Highlight { stories_count: i64 },
}

/// Canonical record for a post or a story highlight.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    pub owner_id: String,
    pub external_id: String,
    pub media_type: MediaType,
    /// Caption for posts, title for highlights.
    pub caption: Option<String>,
    pub media_url: Option<String>,
    pub source_media_url: Option<String>,
    pub posted_at: Option<DateTime<Utc>>,
    pub synced_at: DateTime<Utc>,
    #[serde(flatten)]
    pub detail: ContentDetail,
}

impl ContentItem {
    pub fn kind(&self) -> JobKind {
        match self.detail {
            ContentDetail::Post { .. } => JobKind::Posts,
            ContentDetail::Highlight { .. } => JobKind::Highlights,
        }
    }
}

/// One frame of a highlight, fetched on demand.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoryItem {
    pub highlight_id: String,
    pub external_id: String,
    pub media_type: MediaType,
    pub media_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub duration_seconds: Option<f64>,
}

/// A submitted provider job, as known to the orchestrators.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SyncJob {
    pub job_id: String,
    pub kind: JobKind,
    pub owner_id: String,
}
