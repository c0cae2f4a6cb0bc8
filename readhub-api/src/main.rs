//! # ReadHub API Server
//!
//! REST API for the ReadHub reading platform.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p readhub-api
//! ```
//!
//! Set `LOG_FORMAT=json` for JSON log lines.

use readhub_api::{
    app::{build_router, AppState},
    config::Config,
};
use readhub_shared::cache::{client::RedisClient, client::RedisConfig, Cache};
use readhub_shared::db::{migrations, pool};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    tracing::info!("ReadHub API Server v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;

    let db = pool::create_pool(pool::DatabaseConfig::new(
        config.database.url.clone(),
        config.database.max_connections,
    ))
    .await?;
    migrations::run_migrations(&db).await?;

    tokio::fs::create_dir_all(&config.uploads.dir).await?;

    let cache = match &config.redis.url {
        Some(url) => match RedisClient::new(RedisConfig::new(url.clone())).await {
            Ok(client) => Some(Cache::new(client)),
            Err(e) => {
                tracing::warn!(error = %e, "Redis unavailable, continuing without cache");
                None
            }
        },
        None => {
            tracing::info!("REDIS_URL not set, cache and rate limiting disabled");
            None
        }
    };

    let bind_address = config.bind_address();
    let mut state = AppState::new(db.clone(), config);
    if let Some(cache) = cache {
        state = state.with_cache(cache);
    }

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!("Server listening on http://{}", bind_address);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    pool::close_pool(db).await;
    tracing::info!("Server stopped");

    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "readhub_api=debug,readhub_shared=info,tower_http=debug".into());

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

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received, draining connections...");
}
