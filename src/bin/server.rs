//! DocVault Server
//!
//! Serves the document API over HTTP backed by SQLite and an in-process
//! cache.
//!
//! # Configuration
//!
//! Settings come from `~/.config/docvault/config.yaml` (or `DOCVAULT_CONFIG`)
//! and can be overridden by environment variables:
//!
//! - `DOCVAULT_PORT`: Port to listen on (default: 8080)
//! - `DOCVAULT_DATABASE_PATH`: SQLite database file
//! - `DOCVAULT_STORAGE_DIR`: Directory file documents are served from
//! - `DOCVAULT_ADMIN_TOKEN`: Secret required by `POST /api/register`
//! - `DOCVAULT_TOKEN_DURATION`: Session lifetime in seconds
//! - `DOCVAULT_CACHE_DURATION`: Cache entry lifetime in seconds
//! - `DOCVAULT_FILTER_WORKERS`: Size of the access-filter pool

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use docvault::cache::{DocumentCache, MemoryCache};
use docvault::db::{
    init_db, SqliteDocumentRepository, SqliteSessionRepository, SqliteUserRepository,
};
use docvault::server::{self, AppState, FileStorage};
use docvault::{AuthService, Config, DocumentService};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docvault=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        tracing::error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load(None)?;
    tracing::info!("Database: {}", config.database_path.display());
    tracing::info!("Storage directory: {}", config.storage_dir.display());

    let pool = init_db(&config.database_path).await?;
    let memory = Arc::new(MemoryCache::new());

    let auth = AuthService::new(
        Arc::new(SqliteUserRepository::new(pool.clone())),
        Arc::new(SqliteSessionRepository::new(pool.clone())),
        config.admin_token.clone(),
        config.token_duration(),
    );
    let mut docs = DocumentService::new(
        Arc::new(SqliteDocumentRepository::new(pool.clone())),
        DocumentCache::new(memory.clone(), config.cache_duration()),
    );
    if let Some(workers) = config.filter_workers {
        docs = docs.with_filter_workers(workers);
    }

    let state = AppState::new(auth, docs, FileStorage::new(config.storage_dir.clone()));
    let shutdown = CancellationToken::new();
    let sweeper = tokio::spawn(sweep(
        state.auth.clone(),
        memory,
        config.sweep_interval(),
        shutdown.clone(),
    ));

    let app = server::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown.cancel();
    let _ = sweeper.await;
    pool.close().await;
    tracing::info!("Server stopped");
    Ok(())
}

/// Periodically drops expired sessions and cache entries.
async fn sweep(
    auth: Arc<AuthService>,
    cache: Arc<MemoryCache>,
    every: Duration,
    shutdown: CancellationToken,
) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick fires immediately.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {}
        }

        if let Err(e) = auth.sweep_expired_sessions().await {
            tracing::warn!(error = %e, "Session sweep failed");
        }
        let purged = cache.purge_expired().await;
        if purged > 0 {
            tracing::debug!(purged, "Purged expired cache entries");
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
