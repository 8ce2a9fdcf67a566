use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use creator_sync::cdn::{CloudinaryClient, MediaHost};
use creator_sync::config;
use creator_sync::db;
use creator_sync::provider::{ApifyClient, JobProvider};
use creator_sync::server;
use creator_sync::sync::SyncService;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| format!("sqlite://{}/creator_sync.db", cfg.app.data_dir));
    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    if cfg.provider.token.is_none() {
        warn!("APIFY_API_TOKEN not set; sync requests will fail until it is configured");
    }
    if cfg.webhook.secret.is_none() {
        warn!("SYNC_WEBHOOK_SECRET not set; background sync is disabled");
    }

    let provider: Arc<dyn JobProvider> = Arc::new(ApifyClient::from_config(&cfg)?);
    let media_host: Option<Arc<dyn MediaHost>> = match &cfg.cdn {
        Some(cdn) => Some(Arc::new(CloudinaryClient::from_config(cdn)?)),
        None => {
            info!("no CDN configured; media keeps its source URLs");
            None
        }
    };

    let bind = cfg.app.bind.clone();
    let service = SyncService::new(pool, provider, media_host, Arc::new(cfg));
    let app = server::router(service);

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {}", bind))?;
    info!(%bind, "creator sync listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(?err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
