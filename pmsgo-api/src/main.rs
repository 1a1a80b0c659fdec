//! # PMSGo API Server
//!
//! Task manager REST API with signup/signin, task CRUD, one-time codes for
//! password recovery and WebSocket task events.
//!
//! ## Usage
//!
//! ```bash
//! DATABASE_URL=postgresql://localhost/pmsgo \
//! JWT_SECRET=change-me-to-at-least-32-characters \
//! cargo run -p pmsgo-api
//! ```
//!
//! Set `REDIS_URL` to share task events between several instances.

use anyhow::Context;
use pmsgo_api::{
    app::{build_router, AppState},
    config::{Config, LogFormat},
    middleware::rate_limit::spawn_pruner,
};
use pmsgo_shared::db::{migrations::run_migrations, pool::create_pool};
use pmsgo_shared::otp::spawn_sweeper;
use pmsgo_shared::realtime::RealtimeGateway;
use pmsgo_shared::redis::{RedisClient, RedisConfig};
use pmsgo_shared::store::PgStore;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_LOG_FILTER: &str = "pmsgo_api=debug,pmsgo_shared=debug,tower_http=info";

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    init_tracing(config.api.log_format);

    tracing::info!(
        "PMSGo API Server v{} starting...",
        env!("CARGO_PKG_VERSION")
    );

    let pool = create_pool(config.database_config())
        .await
        .context("Failed to connect to database")?;
    run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    let store = Arc::new(PgStore::new(pool));
    let mut state = AppState::new(store, config.clone());

    if let Some(url) = &config.redis.url {
        let redis = RedisClient::new(RedisConfig::new(url.clone()))
            .await
            .context("Failed to connect to Redis")?;
        let gateway = RealtimeGateway::connect(&redis, config.redis.channel.clone())
            .await
            .context("Failed to subscribe to real-time channel")?;

        tracing::info!(
            url = %redis.sanitized_url(),
            channel = %gateway.channel(),
            "Real-time events shared through Redis"
        );
        state = state.with_realtime(gateway, redis);
    } else {
        tracing::info!("REDIS_URL not set, real-time events stay on this instance");
    }

    let gateway = state.realtime.clone();
    let pruner = spawn_pruner(&state.rate_limiter);
    let sweeper = spawn_sweeper(
        &state.store,
        Duration::from_secs(config.otp.ttl_secs.unsigned_abs()),
    );
    let app = build_router(state);

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;

    tracing::info!("Server listening on http://{}", address);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    gateway.shutdown();
    pruner.abort();
    sweeper.abort();

    tracing::info!("Server stopped");
    Ok(())
}
