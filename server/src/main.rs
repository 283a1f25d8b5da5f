use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod archive;
mod config;
mod error;
mod handlers;
mod store;

use archive::{ArchiveQueue, ChromeCapturer};
use store::Store;

// ── Shared application state ───────────────────────────────────────────────

pub struct AppState {
    /// The one link store of this process. Every request goes through it.
    pub store: Store,
    pub config: config::AppConfig,
    /// `None` when archiving is disabled.
    pub archive: Option<ArchiveQueue>,
}

// ── Entry point ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env (ignore error if file is absent — env vars may already be set)
    dotenvy::dotenv().ok();

    // Initialise structured logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shorten=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = config::AppConfig::from_env()?;
    tracing::info!("Starting shortener on {}:{}", config.host, config.port);
    tracing::info!("Short URL prefix: {}", config.url_prefix);

    // Open the store, creating an empty snapshot on first run
    let store = Store::open_or_create(&config.data_path).with_context(|| {
        format!("cannot open link store at {}", config.data_path.display())
    })?;
    tracing::info!(
        "Store holds {} of {} possible link(s)",
        store.len(),
        store.capacity()
    );
    if store.is_empty() {
        let generator = store.generator();
        tracing::debug!(
            "New generator: prime={} base={}",
            generator.prime(),
            generator.base()
        );
    }

    // Page capture workers
    let archive = match &config.metadata_folder {
        Some(folder) if config.archive_enabled() => {
            tokio::fs::create_dir_all(folder)
                .await
                .with_context(|| format!("cannot create {}", folder.display()))?;
            Some(ArchiveQueue::start(
                folder.clone(),
                config.archive_workers,
                Arc::new(ChromeCapturer::new(config.chrome_bin.clone())),
            ))
        }
        _ => {
            tracing::info!("Archiving disabled");
            None
        }
    };

    let bind_addr = format!("{}:{}", config.host, config.port);
    let state = Arc::new(AppState {
        store,
        config,
        archive,
    });

    // ── Serve ──────────────────────────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to start HTTP server on {bind_addr}"))?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, handlers::router(state)).await?;

    Ok(())
}
