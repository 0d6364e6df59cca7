//! clinexec - server entry point

use clinexec_store::{AuditLog, SqliteStore};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clinexec_server::{build_router, config::ServerConfig, AppState};

#[tokio::main]
async fn main() {
    // Load configuration
    let config_result = ServerConfig::load(
        std::path::Path::new("config.yaml")
            .exists()
            .then_some("config.yaml"),
    );
    let config = config_result.as_ref().cloned().unwrap_or_default();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log.level)),
        )
        .init();

    if let Err(e) = &config_result {
        tracing::warn!("Failed to load config, using defaults: {}", e);
    }

    tracing::info!("Starting clinexec server...");

    // Create data directory
    if let Err(e) = std::fs::create_dir_all(&config.storage.data_dir) {
        tracing::error!("Failed to create data directory: {}", e);
        std::process::exit(1);
    }

    let store = SqliteStore::open(config.database_path()).unwrap_or_else(|e| {
        tracing::error!("Failed to open database: {}", e);
        std::process::exit(1);
    });

    let audit_log = AuditLog::open(config.audit_db_path()).unwrap_or_else(|e| {
        tracing::error!("Failed to open audit log: {}", e);
        std::process::exit(1);
    });

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    let state = AppState::new(config.clone(), store, audit_log).unwrap_or_else(|e| {
        tracing::error!("Failed to build HTTP clients: {}", e);
        std::process::exit(1);
    });
    let state = Arc::new(state);

    tracing::info!(
        "Auth: {}",
        if config.auth.enabled {
            "enabled"
        } else {
            "disabled"
        }
    );
    match &config.worker.url {
        Some(url) => tracing::info!("Scraper worker: {}", url),
        None => tracing::info!("Scraper worker: not configured (trigger disabled)"),
    }
    match &config.zains.base_url {
        Some(url) => tracing::info!("Zains API: {}", url),
        None => tracing::info!("Zains API: not configured"),
    }

    let app = build_router(state);

    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("Failed to bind to {}: {}", bind_addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("Listening on http://{}", bind_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .unwrap_or_else(|e| {
        tracing::error!("Server error: {}", e);
    });

    tracing::info!("Server shut down gracefully");
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
