//! Configuration loader and validator for the creator sync service.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub provider: Provider,
    #[serde(default)]
    pub webhook: Webhook,
    #[serde(default)]
    pub cdn: Option<Cdn>,
    #[serde(default)]
    pub sync: SyncSettings,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    pub bind: String,
    /// Publicly reachable base URL used to build provider callback URLs.
    #[serde(default)]
    pub public_base_url: Option<String>,
}

/// Automation provider settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Provider {
    #[serde(default)]
    pub token: Option<String>,
    pub base_url: String,
    pub posts_actor: String,
    pub highlights_actor: String,
    pub stories_actor: String,
    pub results_limit: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Webhook {
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default = "default_webhook_path")]
    pub path: String,
}

/// Media CDN credentials. Absent means media keeps its source URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cdn {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    #[serde(default = "default_cdn_base")]
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncSettings {
    /// Provider highlight ids shorter than this are dropped.
    pub min_highlight_id_len: usize,
    pub upload_concurrency: usize,
    /// Recency bound passed with background posts jobs.
    pub background_posts_window: String,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            min_highlight_id_len: 17,
            upload_concurrency: 5,
            background_posts_window: "6 months".into(),
        }
    }
}

impl Default for Webhook {
    fn default() -> Self {
        Self {
            secret: None,
            path: default_webhook_path(),
        }
    }
}

fn default_webhook_path() -> String {
    "/webhooks/sync".into()
}

fn default_cdn_base() -> String {
    "https://api.cloudinary.com/".into()
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    /// Callback URL the provider posts to when a background job finishes.
    pub fn callback_url(&self) -> Option<String> {
        let base = self.app.public_base_url.as_deref()?.trim_end_matches('/');
        if base.is_empty() {
            return None;
        }
        Some(format!("{}{}", base, self.webhook.path))
    }

    /// Overlay secrets and deployment values from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    fn apply_env_with(&mut self, get: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| get(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = get("APIFY_API_TOKEN") {
            self.provider.token = Some(token);
        }
        if let Some(secret) = get("SYNC_WEBHOOK_SECRET") {
            self.webhook.secret = Some(secret);
        }
        if let Some(url) = get("URL").or_else(|| get("SITE_URL")) {
            self.app.public_base_url = Some(url);
        }
        if let (Some(cloud_name), Some(api_key), Some(api_secret)) = (
            get("CLOUDINARY_CLOUD_NAME"),
            get("CLOUDINARY_API_KEY"),
            get("CLOUDINARY_API_SECRET"),
        ) {
            self.cdn = Some(Cdn {
                cloud_name,
                api_key,
                api_secret,
                base_url: default_cdn_base(),
            });
        }
    }
}

/// Load configuration from a YAML file, overlay the environment and validate.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let mut cfg: Config = serde_yaml::from_str(&content)?;
    cfg.apply_env();
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
///
/// Provider token and webhook secret are optional here; operations that need
/// them fail with `NotConfigured` at call time.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.bind.trim().is_empty() {
        return Err(ConfigError::Invalid("app.bind must be non-empty"));
    }

    if cfg.provider.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("provider.base_url must be non-empty"));
    }
    if cfg.provider.posts_actor.trim().is_empty() {
        return Err(ConfigError::Invalid("provider.posts_actor must be non-empty"));
    }
    if cfg.provider.highlights_actor.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "provider.highlights_actor must be non-empty",
        ));
    }
    if cfg.provider.stories_actor.trim().is_empty() {
        return Err(ConfigError::Invalid("provider.stories_actor must be non-empty"));
    }
    if cfg.provider.results_limit == 0 {
        return Err(ConfigError::Invalid("provider.results_limit must be > 0"));
    }

    if !cfg.webhook.path.starts_with('/') {
        return Err(ConfigError::Invalid("webhook.path must start with '/'"));
    }

    if let Some(cdn) = &cfg.cdn {
        if cdn.cloud_name.trim().is_empty()
            || cdn.api_key.trim().is_empty()
            || cdn.api_secret.trim().is_empty()
        {
            return Err(ConfigError::Invalid(
                "cdn.cloud_name, cdn.api_key and cdn.api_secret must be non-empty",
            ));
        }
    }

    if cfg.sync.upload_concurrency == 0 {
        return Err(ConfigError::Invalid("sync.upload_concurrency must be > 0"));
    }

    Ok(())
}

/// Returns a sample configuration.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  bind: "0.0.0.0:8888"
  public_base_url: "https://creators.example.com"

provider:
  # Prefer APIFY_API_TOKEN in the environment.
  token: "YOUR_PROVIDER_TOKEN"
  base_url: "https://api.apify.com/"
  posts_actor: "apify~instagram-scraper"
  highlights_actor: "9oQm3jSOiztZqDIZu"
  stories_actor: "A9vd1RbmpS40rjMxu"
  results_limit: 200

webhook:
  # Prefer SYNC_WEBHOOK_SECRET in the environment.
  secret: "YOUR_WEBHOOK_SECRET"
  path: "/webhooks/sync"

sync:
  min_highlight_id_len: 17
  upload_concurrency: 5
  background_posts_window: "6 months"
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn parse_example_ok() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        validate(&cfg).unwrap();
        assert!(cfg.cdn.is_none());
        assert_eq!(cfg.sync.min_highlight_id_len, 17);
    }

    #[test]
    fn callback_url_joins_base_and_path() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        assert_eq!(
            cfg.callback_url().as_deref(),
            Some("https://creators.example.com/webhooks/sync")
        );
        cfg.app.public_base_url = Some("http://localhost:8888/".into());
        assert_eq!(
            cfg.callback_url().as_deref(),
            Some("http://localhost:8888/webhooks/sync")
        );
        cfg.app.public_base_url = None;
        assert!(cfg.callback_url().is_none());
    }

    #[test]
    fn env_overrides_secrets() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        let env: HashMap<&str, &str> = [
            ("APIFY_API_TOKEN", "env-token"),
            ("SYNC_WEBHOOK_SECRET", "env-secret"),
            ("SITE_URL", "http://localhost:8888"),
            ("CLOUDINARY_CLOUD_NAME", "demo"),
            ("CLOUDINARY_API_KEY", "key"),
            ("CLOUDINARY_API_SECRET", "shh"),
        ]
        .into_iter()
        .collect();
        cfg.apply_env_with(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.provider.token.as_deref(), Some("env-token"));
        assert_eq!(cfg.webhook.secret.as_deref(), Some("env-secret"));
        assert_eq!(
            cfg.app.public_base_url.as_deref(),
            Some("http://localhost:8888")
        );
        assert_eq!(cfg.cdn.unwrap().cloud_name, "demo");
    }

    #[test]
    fn partial_cdn_env_is_ignored() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.apply_env_with(|k| (k == "CLOUDINARY_CLOUD_NAME").then(|| "demo".to_string()));
        assert!(cfg.cdn.is_none());
    }

    #[test]
    fn invalid_provider_fields() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.provider.posts_actor = "".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("posts_actor")),
            _ => panic!("wrong error"),
        }

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.provider.results_limit = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn invalid_webhook_path() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.webhook.path = "webhooks/sync".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("webhook.path")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn ensure_dirs_creates_data_dir() {
        let td = tempdir().unwrap();
        let data_path = td.path().join("data");
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.data_dir = data_path.to_string_lossy().to_string();
        cfg.ensure_dirs().unwrap();
        assert!(data_path.exists());
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(&p, example()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.provider.results_limit, 200);
    }
}
