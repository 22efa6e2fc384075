//! Tether Agent - local host for the resilient remote-call client.
//!
//! The agent runs next to an on-device UI and routes every remote call
//! through one tether-engine client: deduplicated, retried with backoff and
//! queued in SQLite while the upstream is unreachable. Queued calls are
//! replayed when the connectivity probe sees the upstream come back.

mod config;
mod db;
mod error;
mod routes;
mod upstream;

use crate::config::Config;
use crate::db::SqliteStore;
use crate::upstream::HttpTransport;
use axum::Router;
use tether_engine::{Client, ConnectivityMonitor};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// The client as hosted by the agent.
pub type AgentClient = Client<HttpTransport, SqliteStore>;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub client: AgentClient,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "tether_server=debug,tether_engine=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!(
        "Starting Tether Agent on {}:{} for {}",
        config.host,
        config.port,
        config.upstream_url
    );

    // Create database pool
    let pool = db::create_pool(&config.database_url).await?;

    // Run migrations
    tracing::info!("Running database migrations...");
    db::run_migrations(&pool).await?;

    // Build the client
    let transport = HttpTransport::new(&config.upstream_url, config.request_timeout)?;
    let probe = transport.probe();
    let client = Client::new(
        transport,
        SqliteStore::new(pool),
        ConnectivityMonitor::default(),
        config.client_config(),
    );

    let pending = client.queue().len().await?;
    if pending > 0 {
        tracing::info!(pending, "Found queued operations from a previous run, replaying once upstream is reachable");
    }

    // Watch upstream reachability
    let shutdown = CancellationToken::new();
    let watcher = {
        let client = client.clone();
        let cancel = shutdown.clone();
        let interval = config.probe_interval;
        tokio::spawn(async move { client.watch_probe(&probe, interval, cancel).await })
    };

    // Build router
    let state = AppState { client };
    let app = Router::new()
        .merge(routes::create_routes())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Agent listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    watcher.await?;
    tracing::info!("Agent stopped");

    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown requested");
    shutdown.cancel();
}
