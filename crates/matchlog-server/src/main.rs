//! Matchlog Server - Main entry point

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use matchlog_common::logging::{init_logging, LogConfig};
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing::info;

use matchlog_server::access::RegisteredSourcePolicy;
use matchlog_server::api::{create_router, AppState};
use matchlog_server::config::Config;
use matchlog_server::pipeline::IngestPipeline;
use matchlog_server::session::PostgresSessionDetector;
use matchlog_server::storage::PostgresStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Environment variables take precedence over the built-in defaults
    let log_config = LogConfig::from_env()
        .unwrap_or_default()
        .with_file_prefix("matchlog-server")
        .with_filter("matchlog_server=debug,tower_http=debug,sqlx=info");

    init_logging(&log_config)?;

    info!("Starting Matchlog Server");

    let config = Config::load()?;
    info!(
        "Configuration loaded - server will bind to {}:{}",
        config.server.host, config.server.port
    );

    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .acquire_timeout(Duration::from_secs(config.database.connect_timeout_secs))
        .connect(&config.database.url)
        .await?;

    info!("Database connection pool established");

    sqlx::migrate!("../../migrations")
        .run(&db_pool)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to run migrations: {}", e))?;

    info!("Database migrations completed");

    let pipeline = Arc::new(IngestPipeline::new(
        Arc::new(PostgresStore::new(db_pool.clone())),
        Arc::new(PostgresSessionDetector::new(db_pool.clone())),
        config.pipeline.clone(),
    ));

    let state = AppState {
        db: db_pool.clone(),
        pipeline: Arc::clone(&pipeline),
        access: Arc::new(RegisteredSourcePolicy::new(db_pool)),
    };

    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // Wait for the per-source workers to drain their queues before exiting
    pipeline.shutdown().await;

    info!("Server shut down gracefully");

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }
}
