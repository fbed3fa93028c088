//! Score Engine
//!
//! Tracks a broadcaster's live sessions and turns chat votes into a
//! per-minute score series:
//! - Lifecycle reconciliation against the broadcast metadata API
//! - Vote extraction from chat read as NDJSON on stdin
//! - Batched vote persistence and score aggregation
//! - Recording finalization after a session ends

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::BufReader;
use tokio::signal;
use tracing::{error, info, warn};
use validator::Validate;

use broadcast::{chat_channel, forward_lines, HelixClient, SourceConfig};
use docstore::{health::check_connection, SessionRepository, StoreConfig};
use score_core::{Extractor, ExtractorConfig};
use telemetry::{health, init_tracing_from_env};
use worker::{shutdown_channel, WorkerConfig, WorkerScheduler};

/// Application configuration.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize, Validate)]
struct AppConfig {
    /// Broadcaster whose sessions are tracked
    #[serde(default)]
    #[validate(length(min = 1))]
    broadcaster_id: String,

    #[serde(default)]
    source: SourceConfig,

    #[serde(default)]
    store: StoreConfig,

    #[serde(default)]
    #[validate(nested)]
    extractor: ExtractorConfig,

    #[serde(default)]
    #[validate(nested)]
    worker: WorkerConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing_from_env();

    info!("Starting Score Engine v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;
    info!(
        broadcaster_id = %config.broadcaster_id,
        api_url = %config.source.api_url,
        store = ?config.store.kind,
        "Loaded configuration"
    );

    let source = Arc::new(
        HelixClient::new(&config.source).context("Failed to create metadata client")?,
    );

    let store = config
        .store
        .open()
        .await
        .context("Failed to open document store")?;
    if check_connection(store.as_ref()).await {
        health().store.set_healthy();
        info!("Document store: healthy");
    } else {
        health().store.set_unhealthy("Startup probe failed");
        error!("Document store: unhealthy");
    }
    let repo = SessionRepository::new(store, config.store.votes_subpath.clone());

    let (chat_tx, chat_rx) = chat_channel(config.worker.chat_channel_capacity);
    let _chat_bridge = tokio::spawn(async move {
        let forwarded = forward_lines(BufReader::new(tokio::io::stdin()), chat_tx).await;
        info!(forwarded = forwarded, "Chat bridge finished");
    });

    let scheduler = WorkerScheduler::new(
        config.worker.clone(),
        config.broadcaster_id.clone(),
        source,
        repo,
        Extractor::new(&config.extractor),
    );
    let (trigger, signal) = shutdown_channel();
    let handles = scheduler.start(chat_rx, signal);

    shutdown_signal().await;

    info!("Shutting down...");
    trigger.trigger();
    for handle in handles {
        if let Err(e) = handle.await {
            warn!("Worker task failed during shutdown: {}", e);
        }
    }

    info!("Shutdown complete");
    Ok(())
}

/// Load configuration from files and environment.
fn load_config() -> Result<AppConfig> {
    let config = config::Config::builder()
        // Start with defaults
        .add_source(config::Config::try_from(&AppConfig::default())?)
        // Load from config file if exists
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        // Override with environment variables
        .add_source(
            config::Environment::default()
                .separator("__")
                .prefix("SCORE")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let config: AppConfig = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
