use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::cdn::{thumbnail_url, MediaHost, MediaUpload};
use crate::db::{self, Pool};
use crate::model::{ContentDetail, ContentItem};

pub const DEFAULT_UPLOAD_CONCURRENCY: usize = 5;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ItemResult {
    pub external_id: String,
    pub saved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of a batch write. A failed item never aborts the batch.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub saved_count: usize,
    pub results: Vec<ItemResult>,
    #[serde(skip)]
    pub saved: Vec<ContentItem>,
}

/// Re-host media where possible, then upsert each item keyed by
/// `(owner_id, external_id)`.
#[instrument(skip_all, fields(count = items.len()))]
pub async fn upsert_batch(
    pool: &Pool,
    media_host: Option<&dyn MediaHost>,
    items: Vec<ContentItem>,
    concurrency: usize,
) -> BatchReport {
    let items: Vec<ContentItem> = match media_host {
        Some(host) => {
            stream::iter(items)
                .map(|item| rehost(host, item))
                .buffered(concurrency.max(1))
                .collect()
                .await
        }
        None => items,
    };

    let mut report = BatchReport::default();
    for item in items {
        match db::upsert_content(pool, &item).await {
            Ok(()) => {
                report.results.push(ItemResult {
                    external_id: item.external_id.clone(),
                    saved: true,
                    error: None,
                });
                report.saved.push(item);
            }
            Err(e) => {
                warn!(
                    owner_id = %item.owner_id,
                    external_id = %item.external_id,
                    error = %format!("{e:#}"),
                    "failed to save item"
                );
                report.results.push(ItemResult {
                    external_id: item.external_id,
                    saved: false,
                    error: Some(format!("{e:#}")),
                });
            }
        }
    }
    report.saved_count = report.saved.len();
    info!(
        saved = report.saved_count,
        total = report.results.len(),
        "batch written"
    );
    report
}

/// Swap the media URL for a CDN thumbnail. Upload failure keeps the source URL.
async fn rehost(host: &dyn MediaHost, mut item: ContentItem) -> ContentItem {
    let Some(source) = item.source_media_url.clone() else {
        return item;
    };
    let upload = match item.detail {
        ContentDetail::Post { .. } => {
            MediaUpload::post_thumbnail(&item.owner_id, &item.external_id, &source)
        }
        ContentDetail::Highlight { .. } => {
            MediaUpload::highlight_cover(&item.owner_id, &item.external_id, &source)
        }
    };
    match host.upload(&upload).await {
        Ok(hosted) => item.media_url = Some(thumbnail_url(&hosted)),
        Err(e) => {
            warn!(
                external_id = %item.external_id,
                error = %format!("{e:#}"),
                "media upload failed, keeping source URL"
            );
            item.media_url = Some(source);
        }
    }
    item
}
