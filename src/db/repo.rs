use super::model::{CreatorRow, HighlightRow, PostRow};
use crate::model::{ContentDetail, ContentItem, Creator, JobKind, StoryItem, SyncStatus};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::instrument;
use uuid::Uuid;

pub type Pool = SqlitePool;

const CREATOR_COLUMNS: &str = "id, display_name, handle, sync_status, pending_posts_job_id, \
     pending_highlights_job_id, last_synced_at";

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect(&normalized)
        .await
        .with_context(|| format!("failed to open record store at {}", normalized))?;
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// For file-backed SQLite URLs, expand a leading `~/`, make sure the parent
/// directory exists and ask SQLite to create the file. In-memory and
/// non-sqlite URLs pass through.
fn prepare_sqlite_url(url: &str) -> String {
    let Some(rest) = url.strip_prefix("sqlite:") else {
        return url.to_string();
    };
    if rest.starts_with(":memory") {
        return url.to_string();
    }

    let rest = rest.strip_prefix("//").unwrap_or(rest);
    let (path, query) = match rest.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (rest, None),
    };
    if path.is_empty() {
        return url.to_string();
    }

    let path = match (path.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(tail), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), tail),
        _ => path.to_string(),
    };
    if let Some(parent) = std::path::Path::new(&path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let query = match query {
        Some(q) if q.contains("mode=") => q.to_string(),
        Some(q) => format!("{}&mode=rwc", q),
        None => "mode=rwc".to_string(),
    };
    format!("sqlite://{}?{}", path, query)
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn pending_column(kind: JobKind) -> &'static str {
    match kind {
        JobKind::Posts => "pending_posts_job_id",
        JobKind::Highlights => "pending_highlights_job_id",
    }
}

#[instrument(skip_all)]
pub async fn create_creator(pool: &Pool, display_name: &str, handle: &str) -> Result<Creator> {
    let id = Uuid::new_v4().to_string();
    sqlx::query("INSERT INTO creators (id, display_name, handle, sync_status) VALUES (?, ?, ?, ?)")
        .bind(&id)
        .bind(display_name)
        .bind(handle)
        .bind(SyncStatus::Idle.as_str())
        .execute(pool)
        .await
        .context("failed to insert creator")?;
    Ok(Creator {
        id,
        display_name: display_name.to_string(),
        handle: handle.to_string(),
        sync_status: SyncStatus::Idle,
        pending_posts_job_id: None,
        pending_highlights_job_id: None,
        last_synced_at: None,
    })
}

#[instrument(skip_all)]
pub async fn fetch_creator(pool: &Pool, creator_id: &str) -> Result<Option<Creator>> {
    let row = sqlx::query_as::<_, CreatorRow>(&format!(
        "SELECT {} FROM creators WHERE id = ?",
        CREATOR_COLUMNS
    ))
    .bind(creator_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(Creator::from))
}

/// Placeholder held in a pending field while its job is being submitted.
pub const SUBMITTING: &str = "submitting";

/// Mark a creator as syncing before any job is submitted. Both pending
/// fields hold [`SUBMITTING`] until [`begin_background_sync`] records the
/// real handles. Returns false when the creator does not exist.
#[instrument(skip_all)]
pub async fn reserve_background_sync(pool: &Pool, creator_id: &str) -> Result<bool> {
    let res = sqlx::query(
        "UPDATE creators SET sync_status = 'syncing', run_failed = 0, \
             pending_posts_job_id = ?, pending_highlights_job_id = ? \
         WHERE id = ?",
    )
    .bind(SUBMITTING)
    .bind(SUBMITTING)
    .bind(creator_id)
    .execute(pool)
    .await
    .context("failed to reserve background sync")?;
    Ok(res.rows_affected() > 0)
}

/// Swap the submission placeholders for the handles of the submitted jobs
/// (`None` for a failed submission). A field already cleared by an early
/// webhook stays cleared.
#[instrument(skip_all)]
pub async fn begin_background_sync(
    pool: &Pool,
    creator_id: &str,
    posts_job_id: Option<&str>,
    highlights_job_id: Option<&str>,
) -> Result<()> {
    sqlx::query(
        "UPDATE creators SET \
             pending_posts_job_id = CASE WHEN pending_posts_job_id = ? \
                 THEN ? ELSE pending_posts_job_id END, \
             pending_highlights_job_id = CASE WHEN pending_highlights_job_id = ? \
                 THEN ? ELSE pending_highlights_job_id END \
         WHERE id = ?",
    )
    .bind(SUBMITTING)
    .bind(posts_job_id)
    .bind(SUBMITTING)
    .bind(highlights_job_id)
    .bind(creator_id)
    .execute(pool)
    .await
    .context("failed to record pending sync jobs")?;
    Ok(())
}

/// Clear the pending job field for `kind`. When `job_id` is given, the field
/// is only cleared if it still holds that job, so a late delivery from an
/// older sync cannot clear a newer job. A field still holding
/// [`SUBMITTING`] is cleared by any delivery. Returns whether a row changed.
#[instrument(skip_all)]
pub async fn clear_pending_job(
    pool: &Pool,
    creator_id: &str,
    kind: JobKind,
    job_id: Option<&str>,
) -> Result<bool> {
    let column = pending_column(kind);
    let res = match job_id {
        Some(job_id) => sqlx::query(&format!(
            "UPDATE creators SET {col} = NULL WHERE id = ? AND {col} IN (?, ?)",
            col = column
        ))
        .bind(creator_id)
        .bind(job_id)
        .bind(SUBMITTING)
        .execute(pool)
        .await,
        None => sqlx::query(&format!(
            "UPDATE creators SET {col} = NULL WHERE id = ? AND {col} IS NOT NULL",
            col = column
        ))
        .bind(creator_id)
        .execute(pool)
        .await,
    }
    .context("failed to clear pending job")?;
    Ok(res.rows_affected() > 0)
}

/// Flip a creator to completed once both pending fields are empty. A
/// `failed` status left by a processing error is accepted so a retried
/// delivery can still finish the sync; a failed run is not. This is one
/// conditional statement, so two concurrent deliveries cannot both observe
/// a half-cleared row and disagree.
#[instrument(skip_all)]
pub async fn complete_sync_if_cleared(
    pool: &Pool,
    creator_id: &str,
    now: DateTime<Utc>,
) -> Result<bool> {
    let res = sqlx::query(
        "UPDATE creators SET sync_status = 'completed', last_synced_at = ? \
         WHERE id = ? \
           AND (sync_status = 'syncing' OR (sync_status = 'failed' AND run_failed = 0)) \
           AND pending_posts_job_id IS NULL AND pending_highlights_job_id IS NULL",
    )
    .bind(now)
    .bind(creator_id)
    .execute(pool)
    .await
    .context("failed to complete sync")?;
    Ok(res.rows_affected() > 0)
}

/// Record that a provider job ended in failure. Unlike [`set_sync_status`],
/// this blocks completion until the next background sync starts.
#[instrument(skip_all)]
pub async fn mark_run_failed(pool: &Pool, creator_id: &str) -> Result<()> {
    sqlx::query("UPDATE creators SET sync_status = 'failed', run_failed = 1 WHERE id = ?")
        .bind(creator_id)
        .execute(pool)
        .await
        .context("failed to mark run failed")?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn set_sync_status(pool: &Pool, creator_id: &str, status: SyncStatus) -> Result<()> {
    sqlx::query("UPDATE creators SET sync_status = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(creator_id)
        .execute(pool)
        .await
        .context("failed to update sync status")?;
    Ok(())
}

/// Insert or refresh one content record keyed by `(owner_id, external_id)`.
#[instrument(skip_all)]
pub async fn upsert_content(pool: &Pool, item: &ContentItem) -> Result<()> {
    match &item.detail {
        ContentDetail::Post {
            provider_id,
            video_url,
            location_name,
            metrics,
        } => {
            sqlx::query(
                "INSERT INTO creator_posts (owner_id, shortcode, provider_id, media_type, caption, \
                     media_url, source_media_url, video_url, likes_count, comments_count, \
                     location_name, posted_at, synced_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
                 ON CONFLICT (owner_id, shortcode) DO UPDATE SET \
                     provider_id = excluded.provider_id, \
                     media_type = excluded.media_type, \
                     caption = excluded.caption, \
                     media_url = excluded.media_url, \
                     source_media_url = excluded.source_media_url, \
                     video_url = excluded.video_url, \
                     likes_count = excluded.likes_count, \
                     comments_count = excluded.comments_count, \
                     location_name = excluded.location_name, \
                     posted_at = excluded.posted_at, \
                     synced_at = excluded.synced_at",
            )
            .bind(&item.owner_id)
            .bind(&item.external_id)
            .bind(provider_id)
            .bind(item.media_type.as_str())
            .bind(&item.caption)
            .bind(&item.media_url)
            .bind(&item.source_media_url)
            .bind(video_url)
            .bind(metrics.likes)
            .bind(metrics.comments)
            .bind(location_name)
            .bind(item.posted_at)
            .bind(item.synced_at)
            .execute(pool)
            .await
            .with_context(|| format!("failed to upsert post {}", item.external_id))?;
        }
        ContentDetail::Highlight { stories_count } => {
            sqlx::query(
                "INSERT INTO creator_highlights (owner_id, highlight_id, title, media_type, \
                     cover_url, source_cover_url, stories_count, synced_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
                 ON CONFLICT (owner_id, highlight_id) DO UPDATE SET \
                     title = excluded.title, \
                     media_type = excluded.media_type, \
                     cover_url = excluded.cover_url, \
                     source_cover_url = excluded.source_cover_url, \
                     stories_count = excluded.stories_count, \
                     synced_at = excluded.synced_at",
            )
            .bind(&item.owner_id)
            .bind(&item.external_id)
            .bind(&item.caption)
            .bind(item.media_type.as_str())
            .bind(&item.media_url)
            .bind(&item.source_media_url)
            .bind(stories_count)
            .bind(item.synced_at)
            .execute(pool)
            .await
            .with_context(|| format!("failed to upsert highlight {}", item.external_id))?;
        }
    }
    Ok(())
}

#[instrument(skip_all)]
pub async fn upsert_story(
    pool: &Pool,
    owner_id: &str,
    highlight_title: Option<&str>,
    story: &StoryItem,
    synced_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO creator_stories (owner_id, highlight_id, story_id, highlight_title, \
             media_type, media_url, thumbnail_url, taken_at, duration_seconds, synced_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT (owner_id, highlight_id, story_id) DO UPDATE SET \
             highlight_title = excluded.highlight_title, \
             media_type = excluded.media_type, \
             media_url = excluded.media_url, \
             thumbnail_url = excluded.thumbnail_url, \
             taken_at = excluded.taken_at, \
             duration_seconds = excluded.duration_seconds, \
             synced_at = excluded.synced_at",
    )
    .bind(owner_id)
    .bind(&story.highlight_id)
    .bind(&story.external_id)
    .bind(highlight_title)
    .bind(story.media_type.as_str())
    .bind(&story.media_url)
    .bind(&story.thumbnail_url)
    .bind(story.timestamp)
    .bind(story.duration_seconds)
    .bind(synced_at)
    .execute(pool)
    .await
    .with_context(|| format!("failed to upsert story {}", story.external_id))?;
    Ok(())
}

/// Saved posts, newest first, optionally bounded by posting time.
#[instrument(skip_all)]
pub async fn list_posts(
    pool: &Pool,
    owner_id: &str,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
) -> Result<Vec<ContentItem>> {
    let rows = sqlx::query_as::<_, PostRow>(
        "SELECT owner_id, shortcode, provider_id, media_type, caption, media_url, \
             source_media_url, video_url, likes_count, comments_count, location_name, \
             posted_at, synced_at \
         FROM creator_posts \
         WHERE owner_id = ? \
           AND (? IS NULL OR posted_at >= ?) \
           AND (? IS NULL OR posted_at <= ?) \
         ORDER BY posted_at DESC",
    )
    .bind(owner_id)
    .bind(from)
    .bind(from)
    .bind(to)
    .bind(to)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(ContentItem::from).collect())
}

#[instrument(skip_all)]
pub async fn list_highlights(pool: &Pool, owner_id: &str) -> Result<Vec<ContentItem>> {
    let rows = sqlx::query_as::<_, HighlightRow>(
        "SELECT owner_id, highlight_id, title, media_type, cover_url, source_cover_url, \
             stories_count, synced_at \
         FROM creator_highlights WHERE owner_id = ? ORDER BY title ASC",
    )
    .bind(owner_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(ContentItem::from).collect())
}

#[instrument(skip_all)]
pub async fn count_stories(pool: &Pool, owner_id: &str, highlight_id: &str) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM creator_stories WHERE owner_id = ? AND highlight_id = ?",
    )
    .bind(owner_id)
    .bind(highlight_id)
    .fetch_one(pool)
    .await?;
    Ok(count)
}
