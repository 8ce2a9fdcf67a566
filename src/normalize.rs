//! Maps raw provider items onto the canonical content records.
//!
//! Provider field names drift between actor versions, so every logical
//! attribute is resolved through an ordered list of candidate JSON paths.
//! The first present, non-null, non-empty value wins. Adding a renamed field
//! is a one-line change to the tables below.
//!
//! Loose `serde_json::Value` input stops at this module; everything returned
//! is a strict [`ContentItem`] or [`StoryItem`].
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::model::{ContentDetail, ContentItem, JobKind, MediaType, Metrics, StoryItem};

type Probe = &'static [&'static [&'static str]];

const POST_SHORTCODE: Probe = &[&["shortCode"], &["shortcode"], &["code"]];
const POST_PROVIDER_ID: Probe = &[&["id"], &["pk"], &["media_id"]];
const POST_CAPTION: Probe = &[&["caption"], &["text"], &["description"]];
const POST_DISPLAY_URL: Probe = &[
    &["displayUrl"],
    &["display_url"],
    &["imageUrl"],
    &["image_url"],
    &["thumbnail_src"],
];
const POST_VIDEO_URL: Probe = &[&["videoUrl"], &["video_url"]];
const POST_LIKES: Probe = &[&["likesCount"], &["likes_count"], &["like_count"]];
const POST_COMMENTS: Probe = &[&["commentsCount"], &["comments_count"], &["comment_count"]];
const POST_LOCATION: Probe = &[&["locationName"], &["location_name"], &["location", "name"]];
const POST_TIMESTAMP: Probe = &[&["timestamp"], &["taken_at"], &["takenAt"], &["created_at"]];

const HIGHLIGHT_ID: Probe = &[&["pk"], &["highlight_id"], &["highlightId"], &["id"]];
const HIGHLIGHT_TITLE: Probe = &[&["title"], &["name"]];
const HIGHLIGHT_COVER: Probe = &[
    &["coverUrl"],
    &["cover_url"],
    &["cover_media"],
    &["cover_media", "cropped_image_version", "url"],
    &["cover_media", "thumbnail_src"],
    &["cover_media_cropped_thumbnail", "url"],
    &["thumbnail_src"],
    &["thumbnail"],
    &["image_url"],
    &["profilePicUrl"],
];
const HIGHLIGHT_COUNT: Probe = &[
    &["media_count"],
    &["storiesCount"],
    &["stories_count"],
    &["count"],
];

const STORY_ID: Probe = &[&["storyId"], &["id"], &["pk"], &["media_id"]];
const STORY_VIDEO_URL: Probe = &[&["videoUrl"], &["video_url"]];
const STORY_IMAGE_URL: Probe = &[
    &["imageUrl"],
    &["image_url"],
    &["display_url"],
    &["url"],
];
const STORY_THUMBNAIL: Probe = &[
    &["imageUrl"],
    &["thumbnail_url"],
    &["display_url"],
    &["thumbnail"],
    &["image_url"],
];
const STORY_TIMESTAMP: Probe = &[&["taken_at"], &["timestamp"], &["created_at"]];
const STORY_DURATION: Probe = &[&["video_duration"], &["duration"]];

/// Numeric media-type codes; `2` is video.
const VIDEO_CODE_FIELDS: Probe = &[&["media_type"], &["mediaType"]];
const VIDEO_FLAG_FIELDS: Probe = &[&["is_video"], &["isVideo"]];
const VIDEO_TYPE_FIELDS: Probe = &[&["type"], &["storyType"], &["media_type"], &["mediaType"]];
const VIDEO_MEDIA_CODE: i64 = 2;

const HIGHLIGHT_PREFIX: &str = "highlight:";
const RESERVED_PATHS: &[&str] = &["p", "reel", "tv", "stories", "explore", "accounts", "direct"];

static PROFILE_URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"instagram\.com/([A-Za-z0-9._]+)").expect("valid profile regex"));
static HANDLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._]+$").expect("valid handle regex"));

/// Why a raw item did not produce a record.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Rejection {
    #[error("no identifier in any known field")]
    MissingId,
    #[error("identifier {0:?} is shorter than {1} characters")]
    ShortId(String, usize),
}

/// Walk a dotted path through nested objects.
fn lookup<'a>(item: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(item, |node, key| node.get(key))
}

fn first<'a, T>(
    item: &'a Value,
    probe: Probe,
    read: impl Fn(&'a Value) -> Option<T>,
) -> Option<T> {
    probe
        .iter()
        .filter_map(|path| lookup(item, path))
        .find_map(read)
}

fn as_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn as_int(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_float(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_timestamp(v: &Value) -> Option<DateTime<Utc>> {
    match v {
        Value::String(s) => parse_timestamp(s),
        Value::Number(n) => {
            let raw = n.as_i64()?;
            // Millisecond epochs are 13 digits.
            if raw > 100_000_000_000 {
                Utc.timestamp_millis_opt(raw).single()
            } else {
                Utc.timestamp_opt(raw, 0).single()
            }
        }
        _ => None,
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    if let Ok(secs) = s.parse::<i64>() {
        return as_timestamp(&Value::from(secs));
    }
    None
}

/// Parse a caller-supplied date bound. A bare `YYYY-MM-DD` upper bound
/// covers the whole day.
pub fn parse_date_bound(s: &str, end_of_day: bool) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let start = Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?);
        return Some(if end_of_day {
            start + Duration::days(1) - Duration::milliseconds(1)
        } else {
            start
        });
    }
    parse_timestamp(s)
}

/// Video if any known signal says so, image otherwise.
pub fn classify_media(item: &Value) -> MediaType {
    let coded = first(item, VIDEO_CODE_FIELDS, |v| v.as_i64()) == Some(VIDEO_MEDIA_CODE);
    let flagged = first(item, VIDEO_FLAG_FIELDS, |v| v.as_bool().filter(|b| *b)).is_some();
    let typed = VIDEO_TYPE_FIELDS
        .iter()
        .filter_map(|path| lookup(item, path))
        .filter_map(Value::as_str)
        .any(|s| s.to_ascii_lowercase().contains("video"));
    if coded || flagged || typed {
        MediaType::Video
    } else {
        MediaType::Image
    }
}

/// Resolve a creator's handle from a bare handle or a profile URL.
pub fn extract_username(input: &str) -> Option<String> {
    let input = input.trim();
    if let Some(caps) = PROFILE_URL_RE.captures(input) {
        let name = &caps[1];
        if !RESERVED_PATHS.contains(&name.to_ascii_lowercase().as_str()) {
            return Some(name.to_string());
        }
        return None;
    }
    let handle = input.trim_start_matches('@');
    if HANDLE_RE.is_match(handle) {
        return Some(handle.to_string());
    }
    None
}

/// Drop the `highlight:` prefix some actors put on highlight ids.
pub fn strip_highlight_prefix(id: &str) -> &str {
    match id.find(HIGHLIGHT_PREFIX) {
        Some(pos) => &id[pos + HIGHLIGHT_PREFIX.len()..],
        None => id,
    }
}

/// Keep raw post items taken at or before `date_to`. Items without a
/// readable timestamp are kept.
pub fn filter_posted_before(items: Vec<Value>, date_to: DateTime<Utc>) -> Vec<Value> {
    items
        .into_iter()
        .filter(|item| match first(item, POST_TIMESTAMP, as_timestamp) {
            Some(ts) => ts <= date_to,
            None => true,
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct Normalizer {
    min_highlight_id_len: usize,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(17)
    }
}

impl Normalizer {
    pub fn new(min_highlight_id_len: usize) -> Self {
        Self {
            min_highlight_id_len,
        }
    }

    pub fn normalize(
        &self,
        raw: &Value,
        kind: JobKind,
        owner_id: &str,
        synced_at: DateTime<Utc>,
    ) -> Result<ContentItem, Rejection> {
        match kind {
            JobKind::Posts => normalize_post(raw, owner_id, synced_at),
            JobKind::Highlights => self.normalize_highlight(raw, owner_id, synced_at),
        }
    }

    /// Normalize a whole result set, logging and skipping rejected items.
    pub fn normalize_all(&self, raw: &[Value], kind: JobKind, owner_id: &str) -> Vec<ContentItem> {
        let synced_at = Utc::now();
        let items: Vec<ContentItem> = raw
            .iter()
            .enumerate()
            .filter_map(|(index, item)| match self.normalize(item, kind, owner_id, synced_at) {
                Ok(content) => Some(content),
                Err(reason) => {
                    warn!(
                        owner_id,
                        kind = kind.as_str(),
                        index,
                        %reason,
                        "skipping provider item"
                    );
                    None
                }
            })
            .collect();
        debug!(
            kind = kind.as_str(),
            valid = items.len(),
            total = raw.len(),
            "normalized provider items"
        );
        items
    }

    fn normalize_highlight(
        &self,
        raw: &Value,
        owner_id: &str,
        synced_at: DateTime<Utc>,
    ) -> Result<ContentItem, Rejection> {
        let id = first(raw, HIGHLIGHT_ID, as_text).ok_or(Rejection::MissingId)?;
        let id = strip_highlight_prefix(&id).trim().to_string();
        if id.chars().count() < self.min_highlight_id_len {
            return Err(Rejection::ShortId(id, self.min_highlight_id_len));
        }
        let cover = first(raw, HIGHLIGHT_COVER, as_text);
        let stories_count = first(raw, HIGHLIGHT_COUNT, as_int)
            .or_else(|| {
                raw.get("items")
                    .and_then(Value::as_array)
                    .map(|a| a.len() as i64)
            })
            .unwrap_or(0);

        Ok(ContentItem {
            owner_id: owner_id.to_string(),
            external_id: id,
            media_type: classify_media(raw),
            caption: first(raw, HIGHLIGHT_TITLE, as_text),
            media_url: cover.clone(),
            source_media_url: cover,
            posted_at: None,
            synced_at,
            detail: ContentDetail::Highlight { stories_count },
        })
    }

    /// Stories never drop: a missing id becomes `story-<index>`.
    pub fn normalize_story(&self, raw: &Value, index: usize, highlight_id: &str) -> StoryItem {
        let media_type = classify_media(raw);
        let media_url = match media_type {
            MediaType::Video => first(raw, STORY_VIDEO_URL, as_text)
                .or_else(|| first(raw, STORY_IMAGE_URL, as_text)),
            MediaType::Image => first(raw, STORY_IMAGE_URL, as_text)
                .or_else(|| first(raw, STORY_VIDEO_URL, as_text)),
        };
        StoryItem {
            highlight_id: highlight_id.to_string(),
            external_id: first(raw, STORY_ID, as_text)
                .unwrap_or_else(|| format!("story-{}", index)),
            media_type,
            media_url,
            thumbnail_url: first(raw, STORY_THUMBNAIL, as_text),
            timestamp: first(raw, STORY_TIMESTAMP, as_timestamp),
            duration_seconds: first(raw, STORY_DURATION, as_float),
        }
    }
}

fn normalize_post(
    raw: &Value,
    owner_id: &str,
    synced_at: DateTime<Utc>,
) -> Result<ContentItem, Rejection> {
    let shortcode = first(raw, POST_SHORTCODE, as_text).ok_or(Rejection::MissingId)?;
    let display = first(raw, POST_DISPLAY_URL, as_text);
    Ok(ContentItem {
        owner_id: owner_id.to_string(),
        external_id: shortcode,
        media_type: classify_media(raw),
        caption: first(raw, POST_CAPTION, as_text),
        media_url: display.clone(),
        source_media_url: display,
        posted_at: first(raw, POST_TIMESTAMP, as_timestamp),
        synced_at,
        detail: ContentDetail::Post {
            provider_id: first(raw, POST_PROVIDER_ID, as_text),
            video_url: first(raw, POST_VIDEO_URL, as_text),
            location_name: first(raw, POST_LOCATION, as_text),
            metrics: Metrics {
                likes: first(raw, POST_LIKES, as_int),
                comments: first(raw, POST_COMMENTS, as_int),
            },
        },
    })
}
