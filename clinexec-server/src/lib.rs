//! clinexec - multi-clinic admin backend
//!
//! HTTP API over the clinic database, the scrape queue consumed by the
//! remote worker, and the Zains sync pipeline.

pub mod audit;
pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod sync;
pub mod worker_trigger;
pub mod zains;

use axum::{
    http::Method,
    routing::{get, post},
    Router,
};
use clinexec_store::{AuditLog, SqliteStore};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

use crate::sync::SyncPipeline;
use crate::worker_trigger::WorkerTrigger;
use crate::zains::ZainsClient;

/// Application state
pub struct AppState {
    pub store: SqliteStore,
    pub audit: Arc<Mutex<AuditLog>>,
    pub config: config::ServerConfig,
    pub worker: WorkerTrigger,
    pub sync: SyncPipeline,
}

impl AppState {
    pub fn new(
        config: config::ServerConfig,
        store: SqliteStore,
        audit: AuditLog,
    ) -> Result<Self, reqwest::Error> {
        let worker = WorkerTrigger::new(config.worker.clone())?;
        let sync = SyncPipeline::new(ZainsClient::new(config.zains.clone())?);
        Ok(Self {
            store,
            audit: Arc::new(Mutex::new(audit)),
            config,
            worker,
            sync,
        })
    }
}

/// Build the application router with all routes and middleware
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::status::health_check))
        .route("/api/status", get(handlers::status::status))
        // Clinics
        .route(
            "/api/clinics",
            get(handlers::clinics::list).post(handlers::clinics::create),
        )
        .route(
            "/api/clinics/{id}",
            get(handlers::clinics::read)
                .put(handlers::clinics::update)
                .delete(handlers::clinics::delete),
        )
        // Patients
        .route(
            "/api/patients",
            get(handlers::patients::list).post(handlers::patients::create),
        )
        .route(
            "/api/patients/{id}",
            get(handlers::patients::read)
                .put(handlers::patients::update)
                .delete(handlers::patients::delete),
        )
        // Transactions
        .route(
            "/api/transactions",
            get(handlers::transactions::list).post(handlers::transactions::create),
        )
        .route(
            "/api/transactions/{id}",
            get(handlers::transactions::read).delete(handlers::transactions::delete),
        )
        // Reports
        .route("/api/reports/revenue", get(handlers::reports::revenue))
        .route(
            "/api/reports/revenue/periods",
            get(handlers::reports::revenue_periods),
        )
        .route(
            "/api/reports/revenue/payment-methods",
            get(handlers::reports::revenue_payment_methods),
        )
        // Bulk
        .route("/api/export/transactions", get(handlers::bulk::export))
        .route("/api/import/transactions", post(handlers::bulk::import))
        // Scrap queue (trigger before {id} so it is not taken as an id)
        .route("/api/scrap/trigger", post(handlers::scrap::trigger))
        .route(
            "/api/scrap",
            get(handlers::scrap::list).post(handlers::scrap::enqueue),
        )
        .route("/api/scrap/{id}", get(handlers::scrap::read))
        .route("/api/scrap/{id}/cancel", post(handlers::scrap::cancel))
        .route("/api/scrap/{id}/retry", post(handlers::scrap::retry))
        // Worker
        .route("/api/worker/claim", post(handlers::worker::claim))
        .route(
            "/api/worker/jobs/{id}/results",
            post(handlers::worker::submit_results),
        )
        .route("/api/worker/jobs/{id}/fail", post(handlers::worker::fail))
        // Settings
        .route("/api/settings", get(handlers::settings::list))
        .route(
            "/api/settings/{key}",
            get(handlers::settings::read)
                .put(handlers::settings::write)
                .delete(handlers::settings::delete),
        )
        // Sync
        .route("/api/sync", post(handlers::sync::run))
        .route("/api/sync/reset", post(handlers::sync::reset))
        .route("/api/sync/{entity}/{id}", post(handlers::sync::sync_one))
        // Cron
        .route("/api/cron/sync", post(handlers::cron::sync))
        .route("/api/cron/scrap", post(handlers::cron::scrap))
        // Middleware
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ))
        .layer(RequestBodyLimitLayer::new(16 * 1024 * 1024)) // 16MB
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
