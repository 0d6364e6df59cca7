use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use clinexec_core::{DateRange, Page, ScrapJob, ScrapStatus};
use clinexec_store::{Action, Enqueued};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::page_request;
use crate::audit::{self, AuditContext};
use crate::error::{ApiError, ApiResult};
use crate::worker_trigger::TriggerOutcome;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    pub clinic_id: i64,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Serialize)]
pub struct EnqueueResponse {
    /// False when an identical job was already queued or running
    pub created: bool,
    pub job: ScrapJob,
}

#[derive(Debug, Default, Deserialize)]
pub struct ScrapListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub status: Option<String>,
    pub clinic_id: Option<i64>,
}

/// Wake the worker in the background so the caller is not held up.
fn spawn_auto_trigger(state: &Arc<AppState>, reason: &'static str) {
    let state = Arc::clone(state);
    tokio::spawn(async move {
        match state.worker.maybe_trigger(&state.store, reason).await {
            Ok(outcome) => tracing::debug!(reason, outcome = outcome.as_str(), "Auto trigger"),
            Err(e) => tracing::error!(reason, error = %e, "Auto trigger failed"),
        }
    });
}

fn enqueued_response(
    state: &Arc<AppState>,
    ctx: &AuditContext,
    enqueued: Enqueued,
) -> (StatusCode, Json<EnqueueResponse>) {
    let created = enqueued.is_created();
    let job = enqueued.into_job();
    if created {
        audit::log_success(ctx, Action::Enqueue, "scrap_job", job.id, &state.audit);
    }
    spawn_auto_trigger(state, "enqueue");

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    (status, Json(EnqueueResponse { created, job }))
}

/// POST /api/scrap
pub async fn enqueue(
    State(state): State<Arc<AppState>>,
    ctx: AuditContext,
    Json(request): Json<EnqueueRequest>,
) -> ApiResult<(StatusCode, Json<EnqueueResponse>)> {
    let range = DateRange::parse(&request.from, &request.to)?;
    let enqueued = state
        .store
        .enqueue_scrap(request.clinic_id, range, ctx.actor.as_deref())?;
    Ok(enqueued_response(&state, &ctx, enqueued))
}

/// GET /api/scrap
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ScrapListQuery>,
) -> ApiResult<Json<Page<ScrapJob>>> {
    let status = match query.status.as_deref().filter(|s| !s.is_empty()) {
        Some(s) => Some(ScrapStatus::parse(s).ok_or_else(|| {
            ApiError::bad_request(format!(
                "unknown status '{}': expected pending, processing, completed or failed",
                s
            ))
        })?),
        None => None,
    };
    let page = state.store.list_scrap(
        status,
        query.clinic_id,
        page_request(query.page, query.per_page),
    )?;
    Ok(Json(page))
}

/// GET /api/scrap/{id}
pub async fn read(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<ScrapJob>> {
    state
        .store
        .get_scrap(id)?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("scrap_job", id))
}

/// POST /api/scrap/{id}/cancel
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    ctx: AuditContext,
    Path(id): Path<i64>,
) -> ApiResult<Json<ScrapJob>> {
    let reason = match &ctx.actor {
        Some(actor) => format!("cancelled by {}", actor),
        None => "cancelled".to_string(),
    };
    let job = state.store.cancel_scrap(id, &reason)?;
    audit::log_success(&ctx, Action::Fail, "scrap_job", id, &state.audit);
    Ok(Json(job))
}

/// POST /api/scrap/{id}/retry
///
/// Queues a fresh job for the same clinic and range; the finished job is left as is.
pub async fn retry(
    State(state): State<Arc<AppState>>,
    ctx: AuditContext,
    Path(id): Path<i64>,
) -> ApiResult<(StatusCode, Json<EnqueueResponse>)> {
    let job = state
        .store
        .get_scrap(id)?
        .ok_or_else(|| ApiError::not_found("scrap_job", id))?;
    if job.status.is_active() {
        return Err(ApiError::conflict(format!(
            "scrape job {} is still {}",
            id, job.status
        )));
    }

    let enqueued = state
        .store
        .enqueue_scrap(job.clinic_id, job.range(), ctx.actor.as_deref())?;
    Ok(enqueued_response(&state, &ctx, enqueued))
}

/// POST /api/scrap/trigger
pub async fn trigger(
    State(state): State<Arc<AppState>>,
    ctx: AuditContext,
) -> ApiResult<Json<TriggerOutcome>> {
    let outcome = state.worker.trigger("manual").await;
    let result = match &outcome {
        TriggerOutcome::Failed { reason } => Err(reason.clone()),
        other => Ok(Some(other.as_str().to_string())),
    };
    audit::record(&ctx, Action::Trigger, "worker", None, result, &state.audit);

    if let TriggerOutcome::Failed { reason } = outcome {
        return Err(ApiError::upstream(reason));
    }
    Ok(Json(outcome))
}
