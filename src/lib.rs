pub mod auth;
pub mod config;
mod database;
pub mod error;
pub mod formatter;
pub mod uploader;
pub mod youtube;

pub use database::{Database, Submission, UploadRecord};

use anyhow::Context;
use auth::ClientSecrets;
use config::Config;
use std::path::Path;
use uploader::{RunSummary, Uploader};
use youtube::YouTubeClient;

/// Install the log subscriber. `RUST_LOG` overrides the default `info` level.
pub fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// One upload run: authorize, publish a batch, close the store.
pub async fn run(config_path: &Path) -> anyhow::Result<RunSummary> {
    let config = Config::load(config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    log::info!(
        "Loaded config: {} playlist(s), batch size {}",
        config.playlists.len(),
        config.batch_size
    );

    let mut db = Database::open(&config.database_path).with_context(|| {
        format!("Failed to open local store {}", config.database_path.display())
    })?;

    let secrets = ClientSecrets::load(&config.client_secrets_file)?;
    let token = auth::authorize(
        &secrets,
        config.refresh_token.as_deref(),
        config.insecure_transport,
    )
    .await?;

    let client = YouTubeClient::new(&config, token)?;
    let uploader = Uploader::new(
        client,
        config.playlists.clone(),
        config.batch_size,
        config.event_name.clone(),
    );

    let outcome = uploader.run(&mut db).await;

    // Close regardless of the outcome; records are already committed per item
    if let Err(e) = db.close() {
        log::warn!("Failed to close local store: {}", e);
    }

    let summary = outcome?;
    log::info!(
        "Run finished: {} uploaded, {} still pending",
        summary.uploaded,
        summary.remaining
    );
    Ok(summary)
}
