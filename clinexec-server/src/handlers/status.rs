use axum::{extract::State, response::Json};
use clinexec_store::{setting_keys, AuditEntry, QueueCounts, SyncCounts};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::ApiResult;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub counts: BTreeMap<String, i64>,
    pub queue: QueueCounts,
    pub sync: SyncStatus,
    pub worker: WorkerStatus,
    pub recent_activity: Vec<AuditEntry>,
}

#[derive(Debug, Serialize)]
pub struct SyncStatus {
    pub enabled: bool,
    pub running: bool,
    #[serde(flatten)]
    pub counts: SyncCounts,
}

#[derive(Debug, Serialize)]
pub struct WorkerStatus {
    pub configured: bool,
    pub trigger_in_flight: bool,
}

/// GET /health
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /api/status
pub async fn status(State(state): State<Arc<AppState>>) -> ApiResult<Json<StatusResponse>> {
    let counts = state.store.table_counts()?.into_iter().collect();
    let queue = state.store.scrap_counts()?;
    let sync_counts = state.store.sync_counts()?;
    let enabled = state
        .store
        .get_bool_setting(setting_keys::ZAINS_SYNC_ENABLED, false)?;

    let recent_activity = {
        let audit = state.audit.lock().await;
        audit.recent(10).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to read audit log");
            Vec::new()
        })
    };

    Ok(Json(StatusResponse {
        counts,
        queue,
        sync: SyncStatus {
            enabled,
            running: state.sync.is_running(),
            counts: sync_counts,
        },
        worker: WorkerStatus {
            configured: state.worker.is_configured(),
            trigger_in_flight: state.worker.is_in_flight(),
        },
        recent_activity,
    }))
}
