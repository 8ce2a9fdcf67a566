//! Job client for the scraping/automation provider.
//!
//! The provider runs scrape jobs asynchronously: a job is submitted, runs on
//! the provider's side, and its results land in a dataset fetched once the
//! job reports success. [`JobProvider`] is the seam the orchestrators use;
//! [`ApifyClient`] is the HTTP implementation.
use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use std::fmt;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{SyncError, SyncResult};
use crate::model::{JobKind, JobState};
use crate::provider::model::RunEnvelope;

pub mod model;

/// Completion callback attached to a job in the push model.
#[derive(Debug, Clone, PartialEq)]
pub struct Callback {
    pub url: String,
    /// Correlation payload the provider echoes back unmodified.
    pub payload: Value,
    /// Shared secret sent back in the `X-Webhook-Secret` header.
    pub secret: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubmitOptions {
    /// Recency lower bound, e.g. `"6 months"` or an ISO date.
    pub only_newer_than: Option<String>,
    pub results_limit: Option<u32>,
    pub callback: Option<Callback>,
}

/// Snapshot of a job as reported by the status endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct RunInfo {
    pub job_id: String,
    pub state: JobState,
    pub result_handle: Option<String>,
}

#[async_trait]
pub trait JobProvider: Send + Sync {
    /// Submit a scrape job and return its handle without waiting for it.
    async fn submit_job(
        &self,
        kind: JobKind,
        target: &str,
        options: &SubmitOptions,
    ) -> SyncResult<String>;

    async fn job_status(&self, job_id: &str) -> SyncResult<RunInfo>;

    /// Fetch every item of a finished job's result set.
    async fn fetch_items(&self, result_handle: &str) -> SyncResult<Vec<Value>>;

    /// Run the stories job for one highlight and wait for its items.
    async fn run_stories(&self, highlight_id: &str) -> SyncResult<Vec<Value>>;
}

#[derive(Clone)]
pub struct ApifyClient {
    http: Client,
    base_url: Url,
    token: Option<String>,
    posts_actor: String,
    highlights_actor: String,
    stories_actor: String,
}

impl fmt::Debug for ApifyClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApifyClient")
            .field("base_url", &self.base_url)
            .field("configured", &self.token.is_some())
            .finish_non_exhaustive()
    }
}

impl ApifyClient {
    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let base_url =
            Url::parse(&cfg.provider.base_url).context("invalid provider base URL")?;
        let http = Client::builder()
            .user_agent("creator-sync/0.1")
            .build()
            .context("failed to build provider HTTP client")?;
        Ok(Self {
            http,
            base_url,
            token: cfg.provider.token.clone().filter(|t| !t.trim().is_empty()),
            posts_actor: cfg.provider.posts_actor.clone(),
            highlights_actor: cfg.provider.highlights_actor.clone(),
            stories_actor: cfg.provider.stories_actor.clone(),
        })
    }

    fn token(&self) -> SyncResult<&str> {
        self.token
            .as_deref()
            .ok_or(SyncError::NotConfigured("APIFY_API_TOKEN"))
    }

    fn actor_for(&self, kind: JobKind) -> &str {
        match kind {
            JobKind::Posts => &self.posts_actor,
            JobKind::Highlights => &self.highlights_actor,
        }
    }

    fn endpoint(&self, path: &str) -> SyncResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| SyncError::Fatal(anyhow::anyhow!("invalid provider URL {path}: {e}")))
    }

    pub fn build_submit_request(
        &self,
        kind: JobKind,
        target: &str,
        options: &SubmitOptions,
    ) -> SyncResult<reqwest::Request> {
        let token = self.token()?;
        let endpoint = self.endpoint(&format!("v2/acts/{}/runs", self.actor_for(kind)))?;
        let body = build_submit_body(kind, target, options);
        self.http
            .post(endpoint)
            .bearer_auth(token)
            .json(&body)
            .build()
            .map_err(|e| {
                SyncError::Fatal(anyhow::Error::new(e).context("failed to build submit request"))
            })
    }

    async fn get_json(&self, url: Url) -> SyncResult<reqwest::Response> {
        let token = self.token()?;
        let res = self.http.get(url).bearer_auth(token).send().await?;
        check_status(res).await
    }
}

/// Public profile URL for a validated handle.
pub fn profile_url(username: &str) -> String {
    format!("https://www.instagram.com/{}/", username)
}

/// Build the provider input for a job. Posts and highlights actors take
/// differently named URL lists.
pub fn build_submit_body(kind: JobKind, target: &str, options: &SubmitOptions) -> Value {
    let mut body = Map::new();
    let urls = json!([profile_url(target)]);
    match kind {
        JobKind::Posts => {
            body.insert("directUrls".into(), urls);
            if let Some(limit) = options.results_limit {
                body.insert("resultsLimit".into(), json!(limit));
            }
            if let Some(newer) = options.only_newer_than.as_deref().filter(|s| !s.is_empty()) {
                body.insert("onlyPostsNewerThan".into(), json!(newer));
            }
        }
        JobKind::Highlights => {
            body.insert("startUrls".into(), urls);
        }
    }

    if let Some(cb) = &options.callback {
        let mut hook = Map::new();
        hook.insert(
            "eventTypes".into(),
            json!([
                "ACTOR.RUN.SUCCEEDED",
                "ACTOR.RUN.FAILED",
                "ACTOR.RUN.ABORTED",
                "ACTOR.RUN.TIMED_OUT"
            ]),
        );
        hook.insert("requestUrl".into(), json!(cb.url));
        hook.insert("payloadTemplate".into(), json!(cb.payload.to_string()));
        if let Some(secret) = cb.secret.as_deref() {
            hook.insert(
                "headersTemplate".into(),
                json!(json!({ "X-Webhook-Secret": secret }).to_string()),
            );
        }
        body.insert("webhooks".into(), json!([Value::Object(hook)]));
    }

    Value::Object(body)
}

/// Read a successful response body as JSON. A body that does not decode is
/// the provider's fault, not the network's.
async fn read_json<T: DeserializeOwned>(res: reqwest::Response) -> SyncResult<T> {
    let status = res.status().as_u16();
    let body = res.bytes().await?;
    decode_body(status, &body)
}

fn decode_body<T: DeserializeOwned>(status: u16, body: &[u8]) -> SyncResult<T> {
    serde_json::from_slice(body).map_err(|e| {
        warn!(status, error = %e, "provider returned a malformed body");
        SyncError::ProviderRejected {
            status,
            body: format!("malformed provider response: {}", e),
        }
    })
}

async fn check_status(res: reqwest::Response) -> SyncResult<reqwest::Response> {
    if res.status().is_success() {
        return Ok(res);
    }
    let status = res.status().as_u16();
    let body = res.text().await.unwrap_or_default();
    warn!(status, %body, "provider returned an error");
    Err(SyncError::ProviderRejected { status, body })
}

fn parse_run(envelope: RunEnvelope) -> RunInfo {
    let state = envelope
        .data
        .status
        .as_deref()
        .map(JobState::parse_state)
        .unwrap_or_else(|| JobState::Unknown(String::new()));
    RunInfo {
        job_id: envelope.data.id,
        state,
        result_handle: envelope.data.default_dataset_id,
    }
}

#[async_trait]
impl JobProvider for ApifyClient {
    async fn submit_job(
        &self,
        kind: JobKind,
        target: &str,
        options: &SubmitOptions,
    ) -> SyncResult<String> {
        let request = self.build_submit_request(kind, target, options)?;
        info!(kind = kind.as_str(), handle = target, url = %request.url(), "submitting provider job");
        let res = self.http.execute(request).await?;
        let res = check_status(res).await?;
        let envelope: RunEnvelope = read_json(res).await?;
        if envelope.data.id.trim().is_empty() {
            return Err(SyncError::ProviderRejected {
                status: 200,
                body: "provider returned an empty job id".into(),
            });
        }
        info!(kind = kind.as_str(), job_id = %envelope.data.id, "provider job started");
        Ok(envelope.data.id)
    }

    async fn job_status(&self, job_id: &str) -> SyncResult<RunInfo> {
        let url = self.endpoint(&format!("v2/actor-runs/{}", job_id))?;
        let res = self.get_json(url).await?;
        let envelope: RunEnvelope = read_json(res).await?;
        Ok(parse_run(envelope))
    }

    async fn fetch_items(&self, result_handle: &str) -> SyncResult<Vec<Value>> {
        let mut url = self.endpoint(&format!("v2/datasets/{}/items", result_handle))?;
        url.query_pairs_mut().append_pair("format", "json");
        let res = self.get_json(url).await?;
        let items: Vec<Value> = read_json(res).await?;
        info!(result_handle, count = items.len(), "fetched dataset items");
        Ok(items)
    }

    async fn run_stories(&self, highlight_id: &str) -> SyncResult<Vec<Value>> {
        let token = self.token()?;
        let url = self.endpoint(&format!(
            "v2/acts/{}/run-sync-get-dataset-items",
            self.stories_actor
        ))?;
        let res = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(&json!({ "highlightId": highlight_id }))
            .send()
            .await?;
        let res = check_status(res).await?;
        let items: Vec<Value> = read_json(res).await?;
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(token: Option<&str>) -> ApifyClient {
        let mut cfg: Config = serde_yaml::from_str(crate::config::example()).unwrap();
        cfg.provider.token = token.map(str::to_string);
        ApifyClient::from_config(&cfg).unwrap()
    }

    #[test]
    fn submit_request_sets_auth_and_actor() {
        let client = client(Some("token"));
        let request = client
            .build_submit_request(JobKind::Posts, "travel_jane", &SubmitOptions::default())
            .unwrap();
        assert_eq!(request.method(), reqwest::Method::POST);
        assert_eq!(
            request.url().path(),
            "/v2/acts/apify~instagram-scraper/runs"
        );
        assert_eq!(
            request
                .headers()
                .get("Authorization")
                .and_then(|h| h.to_str().ok())
                .unwrap(),
            "Bearer token"
        );
    }

    #[test]
    fn missing_token_is_not_configured() {
        let client = client(None);
        let err = client
            .build_submit_request(JobKind::Highlights, "travel_jane", &SubmitOptions::default())
            .unwrap_err();
        assert!(matches!(err, SyncError::NotConfigured(_)));
    }

    #[test]
    fn posts_body_carries_limits_and_recency() {
        let options = SubmitOptions {
            only_newer_than: Some("2024-01-01".into()),
            results_limit: Some(200),
            callback: None,
        };
        let body = build_submit_body(JobKind::Posts, "travel_jane", &options);
        assert_eq!(
            body["directUrls"][0],
            "https://www.instagram.com/travel_jane/"
        );
        assert_eq!(body["resultsLimit"], 200);
        assert_eq!(body["onlyPostsNewerThan"], "2024-01-01");
        assert!(body.get("webhooks").is_none());
    }

    #[test]
    fn highlights_body_embeds_callback() {
        let options = SubmitOptions {
            only_newer_than: Some("ignored".into()),
            results_limit: None,
            callback: Some(Callback {
                url: "https://site/webhooks/sync".into(),
                payload: json!({ "creator_id": "c1", "sync_type": "highlights" }),
                secret: Some("s3cret".into()),
            }),
        };
        let body = build_submit_body(JobKind::Highlights, "travel_jane", &options);
        assert_eq!(
            body["startUrls"][0],
            "https://www.instagram.com/travel_jane/"
        );
        assert!(body.get("onlyPostsNewerThan").is_none());
        let hook = &body["webhooks"][0];
        assert_eq!(hook["requestUrl"], "https://site/webhooks/sync");
        let payload: Value =
            serde_json::from_str(hook["payloadTemplate"].as_str().unwrap()).unwrap();
        assert_eq!(payload["sync_type"], "highlights");
        let headers: Value =
            serde_json::from_str(hook["headersTemplate"].as_str().unwrap()).unwrap();
        assert_eq!(headers["X-Webhook-Secret"], "s3cret");
    }

    #[test]
    fn parse_run_maps_state_and_dataset() {
        let envelope: RunEnvelope = serde_json::from_value(json!({
            "data": { "id": "run-1", "status": "SUCCEEDED", "defaultDatasetId": "ds-1" }
        }))
        .unwrap();
        let info = parse_run(envelope);
        assert_eq!(info.state, JobState::Succeeded);
        assert_eq!(info.result_handle.as_deref(), Some("ds-1"));
    }

    #[test]
    fn malformed_body_is_a_rejection() {
        let err = decode_body::<RunEnvelope>(200, b"<html>gateway</html>").unwrap_err();
        match err {
            SyncError::ProviderRejected { status, body } => {
                assert_eq!(status, 200);
                assert!(body.starts_with("malformed provider response"));
            }
            other => panic!("unexpected {other:?}"),
        }
        let items: Vec<Value> = decode_body(200, br#"[{"shortCode":"C1"}]"#).unwrap();
        assert_eq!(items.len(), 1);
    }
}
