//! Optional media re-hosting on a Cloudinary-style CDN.
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::debug;

use crate::config::Cdn;
use crate::model::MediaType;

const THUMBNAIL_TRANSFORM: &str = "w_200,h_200,c_fill,f_auto,q_auto";

/// One media file to copy from its source URL onto the CDN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaUpload {
    pub source_url: String,
    pub folder: String,
    pub public_id: String,
    pub media_type: MediaType,
}

impl MediaUpload {
    pub fn post_thumbnail(owner_id: &str, shortcode: &str, source_url: &str) -> Self {
        Self {
            source_url: source_url.to_string(),
            folder: format!("creators/{}/thumbnails", sanitize_id(owner_id)),
            public_id: format!("thumb_{}", sanitize_id(shortcode)),
            media_type: MediaType::Image,
        }
    }

    pub fn highlight_cover(owner_id: &str, highlight_id: &str, source_url: &str) -> Self {
        Self {
            source_url: source_url.to_string(),
            folder: format!("creators/{}/highlights", sanitize_id(owner_id)),
            public_id: format!("cover_{}", sanitize_id(highlight_id)),
            media_type: MediaType::Image,
        }
    }

    pub fn story(owner_id: &str, story_id: &str, media_type: MediaType, source_url: &str) -> Self {
        Self {
            source_url: source_url.to_string(),
            folder: format!("creators/{}/stories", sanitize_id(owner_id)),
            public_id: format!("story-{}", sanitize_id(story_id)),
            media_type,
        }
    }
}

#[async_trait]
pub trait MediaHost: Send + Sync {
    /// Copy the media onto the CDN and return its hosted URL.
    async fn upload(&self, media: &MediaUpload) -> Result<String>;
}

#[derive(Clone)]
pub struct CloudinaryClient {
    http: Client,
    base_url: Url,
    cloud_name: String,
    api_key: String,
    api_secret: String,
}

impl fmt::Debug for CloudinaryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudinaryClient")
            .field("base_url", &self.base_url)
            .field("cloud_name", &self.cloud_name)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
}

impl CloudinaryClient {
    pub fn from_config(cdn: &Cdn) -> Result<Self> {
        let base_url = Url::parse(&cdn.base_url).context("invalid CDN base URL")?;
        let http = Client::builder()
            .user_agent("creator-sync/0.1")
            .build()
            .context("failed to build CDN HTTP client")?;
        Ok(Self {
            http,
            base_url,
            cloud_name: cdn.cloud_name.clone(),
            api_key: cdn.api_key.clone(),
            api_secret: cdn.api_secret.clone(),
        })
    }

    fn upload_endpoint(&self, media_type: MediaType) -> Result<Url> {
        let path = format!("v1_1/{}/{}/upload", self.cloud_name, media_type.as_str());
        self.base_url
            .join(&path)
            .map_err(|e| anyhow!("invalid CDN URL {path}: {e}"))
    }

    /// Form fields of a signed upload at `timestamp`.
    pub fn signed_form(&self, media: &MediaUpload, timestamp: i64) -> Vec<(&'static str, String)> {
        let timestamp = timestamp.to_string();
        let signature = sign_params(
            &[
                ("folder", media.folder.as_str()),
                ("public_id", media.public_id.as_str()),
                ("timestamp", timestamp.as_str()),
            ],
            &self.api_secret,
        );
        vec![
            ("file", media.source_url.clone()),
            ("folder", media.folder.clone()),
            ("public_id", media.public_id.clone()),
            ("timestamp", timestamp),
            ("api_key", self.api_key.clone()),
            ("signature", signature),
            ("signature_algorithm", "sha256".to_string()),
        ]
    }
}

#[async_trait]
impl MediaHost for CloudinaryClient {
    async fn upload(&self, media: &MediaUpload) -> Result<String> {
        let url = self.upload_endpoint(media.media_type)?;
        let form = self.signed_form(media, chrono::Utc::now().timestamp());
        let res = self
            .http
            .post(url)
            .form(&form)
            .send()
            .await
            .context("CDN upload request failed")?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("CDN upload failed ({}): {}", status.as_u16(), body));
        }
        let parsed: UploadResponse = res.json().await.context("invalid CDN upload response")?;
        debug!(public_id = %media.public_id, "uploaded media to CDN");
        Ok(parsed.secure_url)
    }
}

/// Signature over the sorted `key=value` pairs joined by `&`, followed by
/// the secret, hex-encoded SHA-256.
pub fn sign_params(params: &[(&str, &str)], secret: &str) -> String {
    let mut sorted: Vec<&(&str, &str)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let joined = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");
    let mut hasher = Sha256::new();
    hasher.update(joined.as_bytes());
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Replace every character outside `[A-Za-z0-9_-]` with `_`.
pub fn sanitize_id(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Hosted image URL rewritten to a cropped 200x200 thumbnail.
pub fn thumbnail_url(hosted: &str) -> String {
    hosted.replacen("/upload/", &format!("/upload/{}/", THUMBNAIL_TRANSFORM), 1)
}
