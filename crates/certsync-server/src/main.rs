//! certsync server - main entry point

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use certsync_common::logging::{init_logging, LogConfig};
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::signal;
use tower_http::compression::CompressionLayer;
use tracing::info;

use certsync_server::{
    config::Config,
    features,
    ingest::{self, tra::SnapshotParser, PgCertificationRegistry, SyncOrchestrator, TickScheduler},
    middleware,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let log_config = LogConfig::builder()
        .log_file_prefix("certsync-server")
        .filter_directives("certsync_server=debug,tower_http=debug,sqlx=info")
        .build();

    // Environment variables take precedence
    let log_config = log_config.merge_env()?;
    let _log_guard = init_logging(&log_config)?;

    info!("Starting certsync server");

    let config = Config::load()?;
    info!(
        "Configuration loaded - server will bind to {}:{}",
        config.server.host, config.server.port
    );

    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(config.database.acquire_timeout())
        .connect(&config.database.url)
        .await?;

    info!("Database connection pool established");

    sqlx::migrate!("../../migrations")
        .run(&db_pool)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to run migrations: {}", e))?;

    info!("Database migrations completed");

    let ingest_config = ingest::IngestConfig::from_env()?;
    let orchestrator = Arc::new(SyncOrchestrator::from_config(&ingest_config, db_pool.clone())?);

    let scheduler_handle = if ingest_config.enabled {
        info!(
            organizations = ?orchestrator.organizations(),
            "Ingestion is enabled, starting tick scheduler"
        );
        let scheduler =
            TickScheduler::new(Arc::clone(&orchestrator), ingest_config.tick_interval());
        Some(scheduler.start())
    } else {
        info!("Ingestion is disabled (INGEST_ENABLED=false)");
        None
    };

    if ingest_config.shared_secret.is_none() {
        info!("INGEST_SHARED_SECRET not set - manual snapshot ingestion is disabled");
    }

    let feature_state = features::FeatureState {
        registry: Arc::new(PgCertificationRegistry::new(db_pool.clone())),
        orchestrator,
        parser: SnapshotParser::new(
            ingest_config.tra.delimiter,
            ingest_config.tra.level_map.clone(),
        ),
        shared_secret: ingest_config.shared_secret.clone(),
    };

    let app = create_router(db_pool, feature_state, &config);

    let addr = config.server.bind_addr()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(config.server.shutdown_timeout_secs))
        .await?;

    if let Some(handle) = scheduler_handle {
        handle.abort();
        info!("Tick scheduler stopped");
    }

    info!("Server shut down gracefully");

    Ok(())
}

/// Create the application router with all routes and middleware
fn create_router(db: PgPool, feature_state: features::FeatureState, config: &Config) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .with_state(db)
        .nest("/api/v1", features::router(feature_state))
        // Innermost first
        .layer(CompressionLayer::new())
        .layer(middleware::tracing_layer())
        .layer(middleware::cors_layer(&config.cors_origins))
}

async fn health_check(State(db): State<PgPool>) -> Result<Response, StatusCode> {
    match sqlx::query("SELECT 1").fetch_one(&db).await {
        Ok(_) => Ok((
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "database": "connected"
            })),
        )
            .into_response()),
        Err(e) => {
            tracing::error!("Database health check failed: {:?}", e);
            Err(StatusCode::SERVICE_UNAVAILABLE)
        },
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal(timeout_secs: u64) {
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
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
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

    info!("Waiting up to {} seconds for in-flight requests", timeout_secs);
    tokio::time::sleep(Duration::from_secs(timeout_secs.min(5))).await;
}
