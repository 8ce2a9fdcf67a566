#![allow(dead_code)]

use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

use creator_sync::cdn::{MediaHost, MediaUpload};
use creator_sync::config::{self, Config};
use creator_sync::error::{SyncError, SyncResult};
use creator_sync::model::{JobKind, JobState};
use creator_sync::provider::{JobProvider, RunInfo, SubmitOptions};
use creator_sync::sync::SyncService;

pub const SECRET: &str = "s3cret";

pub async fn setup_pool() -> sqlx::SqlitePool {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

pub fn test_config() -> Config {
    let mut cfg: Config = serde_yaml::from_str(config::example()).unwrap();
    cfg.webhook.secret = Some(SECRET.into());
    cfg.cdn = None;
    cfg
}

#[derive(Debug, Clone)]
pub struct SubmitCall {
    pub kind: JobKind,
    pub target: String,
    pub options: SubmitOptions,
}

#[derive(Debug, Default)]
pub struct ProviderState {
    pub submits: Vec<SubmitCall>,
    pub runs: HashMap<String, RunInfo>,
    pub datasets: HashMap<String, Vec<Value>>,
    pub fetches: Vec<String>,
    pub stories: Vec<Value>,
    pub rejected_kinds: HashSet<JobKind>,
    next_id: usize,
}

/// Scripted provider: jobs start Running, tests flip them via `finish`.
#[derive(Debug, Clone, Default)]
pub struct FakeProvider {
    pub state: Arc<Mutex<ProviderState>>,
}

impl FakeProvider {
    pub async fn finish(&self, job_id: &str, state: JobState, items: Vec<Value>) {
        let mut s = self.state.lock().await;
        let handle = format!("ds-{}", job_id);
        s.datasets.insert(handle.clone(), items);
        s.runs.insert(
            job_id.to_string(),
            RunInfo {
                job_id: job_id.to_string(),
                state,
                result_handle: Some(handle),
            },
        );
    }

    pub async fn put_dataset(&self, handle: &str, items: Vec<Value>) {
        self.state
            .lock()
            .await
            .datasets
            .insert(handle.to_string(), items);
    }

    pub async fn reject(&self, kind: JobKind) {
        self.state.lock().await.rejected_kinds.insert(kind);
    }
}

#[async_trait]
impl JobProvider for FakeProvider {
    async fn submit_job(
        &self,
        kind: JobKind,
        target: &str,
        options: &SubmitOptions,
    ) -> SyncResult<String> {
        let mut s = self.state.lock().await;
        s.submits.push(SubmitCall {
            kind,
            target: target.to_string(),
            options: options.clone(),
        });
        if s.rejected_kinds.contains(&kind) {
            return Err(SyncError::ProviderRejected {
                status: 402,
                body: "monthly usage exceeded".into(),
            });
        }
        s.next_id += 1;
        let job_id = format!("run-{}", s.next_id);
        s.runs.insert(
            job_id.clone(),
            RunInfo {
                job_id: job_id.clone(),
                state: JobState::Running,
                result_handle: None,
            },
        );
        Ok(job_id)
    }

    async fn job_status(&self, job_id: &str) -> SyncResult<RunInfo> {
        self.state
            .lock()
            .await
            .runs
            .get(job_id)
            .cloned()
            .ok_or_else(|| SyncError::ProviderRejected {
                status: 404,
                body: format!("run {} not found", job_id),
            })
    }

    async fn fetch_items(&self, result_handle: &str) -> SyncResult<Vec<Value>> {
        let mut s = self.state.lock().await;
        s.fetches.push(result_handle.to_string());
        s.datasets
            .get(result_handle)
            .cloned()
            .ok_or_else(|| SyncError::ProviderUnavailable(format!("dataset {} unavailable", result_handle)))
    }

    async fn run_stories(&self, _highlight_id: &str) -> SyncResult<Vec<Value>> {
        Ok(self.state.lock().await.stories.clone())
    }
}

/// Media host that records uploads and fails for public ids ending in `BAD`.
#[derive(Debug, Clone, Default)]
pub struct FakeHost {
    pub uploads: Arc<Mutex<Vec<MediaUpload>>>,
}

#[async_trait]
impl MediaHost for FakeHost {
    async fn upload(&self, media: &MediaUpload) -> anyhow::Result<String> {
        self.uploads.lock().await.push(media.clone());
        if media.public_id.ends_with("BAD") {
            return Err(anyhow!("upload rejected"));
        }
        Ok(format!(
            "https://res.example/demo/{}/upload/{}/{}",
            media.media_type.as_str(),
            media.folder,
            media.public_id
        ))
    }
}

pub fn service(
    pool: sqlx::SqlitePool,
    provider: &FakeProvider,
    host: Option<&FakeHost>,
    cfg: Config,
) -> SyncService {
    SyncService::new(
        pool,
        Arc::new(provider.clone()),
        host.map(|h| Arc::new(h.clone()) as Arc<dyn MediaHost>),
        Arc::new(cfg),
    )
}

pub fn raw_post(code: &str, day: u32) -> Value {
    json!({
        "id": format!("31{}", day),
        "shortCode": code,
        "type": "Image",
        "caption": format!("post {}", code),
        "displayUrl": format!("https://scontent.example/{}.jpg", code),
        "likesCount": 10 + day,
        "commentsCount": 2,
        "timestamp": format!("2024-05-{:02}T12:00:00.000Z", day),
    })
}

pub fn raw_highlight(id: &str, title: &str) -> Value {
    json!({
        "id": format!("highlight:{}", id),
        "title": title,
        "cover_media": { "cropped_image_version": { "url": format!("https://scontent.example/{}.jpg", id) } },
        "media_count": 4,
    })
}
