//! # ReadHub Worker
//!
//! Runs background jobs queued by the API:
//!
//! - `tts`: chapter audio through the configured speech provider
//! - `scrape`: chapter import from web pages and JSON APIs
//! - `embed`: book vectors for semantic search
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p readhub-worker
//! ```
//!
//! Set `LOG_FORMAT=json` for JSON log lines.

use readhub_shared::db::pool::{self, DatabaseConfig};
use readhub_shared::search::HashingEmbedder;
use readhub_shared::storage::FileStorage;
use readhub_worker::{
    config::Config,
    embed::EmbedHandler,
    handlers::HandlerRegistry,
    orchestrator::WorkerOrchestrator,
    queue::JobQueue,
    scraper::{ScrapeHandler, Scraper},
    tts::{self, TtsHandler},
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    tracing::info!("ReadHub Worker v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;

    let db = pool::create_pool(DatabaseConfig::new(
        config.database.url.clone(),
        config.database.max_connections,
    ))
    .await?;

    tokio::fs::create_dir_all(&config.storage.dir).await?;
    let storage = FileStorage::new(
        &config.storage.dir,
        config.storage.base_url.clone(),
        config.storage.max_bytes,
    );

    let queue = JobQueue::with_batch_size(db.clone(), config.orchestrator.batch_size);
    let provider = tts::provider_from_settings(&config.tts)?;
    let scraper = Arc::new(Scraper::new(&config.scraper)?);

    tracing::info!(
        tts_provider = provider.name(),
        json_hosts = config.scraper.json_hosts.len(),
        "Job handlers configured"
    );

    let mut handlers = HandlerRegistry::new();
    handlers.register(Arc::new(TtsHandler::new(db.clone(), storage, provider)));
    handlers.register(Arc::new(ScrapeHandler::new(queue.clone(), scraper)));
    handlers.register(Arc::new(EmbedHandler::new(
        db.clone(),
        Arc::new(HashingEmbedder::default()),
    )));

    let orchestrator = WorkerOrchestrator::new(queue, handlers, config.orchestrator.clone());

    let shutdown = orchestrator.shutdown_token();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            return;
        }
        tracing::info!("Shutdown signal received, finishing running jobs...");
        shutdown.cancel();
    });

    tracing::info!("Worker ready and polling for jobs");
    orchestrator.run().await?;

    pool::close_pool(db).await;
    tracing::info!("Worker stopped");

    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "readhub_worker=debug,readhub_shared=info".into());

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
