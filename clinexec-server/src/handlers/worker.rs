//! Endpoints the remote scraper worker calls.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use clinexec_core::{ScrapJob, ScrapResults};
use clinexec_store::Action;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::audit::{self, AuditContext};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ClaimRequest {
    pub worker_id: Option<String>,
}

/// Claimed job plus the clinic fields the scraper logs in with
#[derive(Debug, Serialize)]
pub struct ClaimedJob {
    pub job: ScrapJob,
    pub clinic_code: String,
    pub clinic_name: String,
}

#[derive(Debug, Deserialize)]
pub struct FailRequest {
    pub reason: String,
}

/// POST /api/worker/claim
///
/// Body is optional. Returns 204 when the queue is empty.
pub async fn claim(
    State(state): State<Arc<AppState>>,
    ctx: AuditContext,
    body: Bytes,
) -> ApiResult<Response> {
    let request: ClaimRequest = if body.iter().all(u8::is_ascii_whitespace) {
        ClaimRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::bad_request(format!("Invalid claim request: {}", e)))?
    };

    let worker_id = request
        .worker_id
        .filter(|id| !id.trim().is_empty())
        .or_else(|| ctx.actor.clone())
        .unwrap_or_else(|| format!("worker-{}", uuid::Uuid::new_v4()));

    let Some(job) = state.store.claim_next_scrap(&worker_id)? else {
        return Ok(StatusCode::NO_CONTENT.into_response());
    };

    let clinic = state
        .store
        .get_clinic(job.clinic_id)?
        .ok_or_else(|| ApiError::not_found("clinic", job.clinic_id))?;

    audit::record(
        &ctx,
        Action::Claim,
        "scrap_job",
        Some(job.id.to_string()),
        Ok(Some(worker_id)),
        &state.audit,
    );

    Ok(Json(ClaimedJob {
        job,
        clinic_code: clinic.code,
        clinic_name: clinic.name,
    })
    .into_response())
}

/// POST /api/worker/jobs/{id}/results
pub async fn submit_results(
    State(state): State<Arc<AppState>>,
    ctx: AuditContext,
    Path(id): Path<i64>,
    Json(results): Json<ScrapResults>,
) -> ApiResult<Json<ScrapJob>> {
    match state.store.complete_scrap_with_results(id, &results) {
        Ok(job) => {
            audit::record(
                &ctx,
                Action::Complete,
                "scrap_job",
                Some(id.to_string()),
                Ok(Some(format!(
                    "{} patients, {} transactions",
                    job.patients_imported, job.transactions_imported
                ))),
                &state.audit,
            );
            Ok(Json(job))
        }
        Err(e) => {
            audit::record(
                &ctx,
                Action::Complete,
                "scrap_job",
                Some(id.to_string()),
                Err(e.to_string()),
                &state.audit,
            );
            Err(e.into())
        }
    }
}

/// POST /api/worker/jobs/{id}/fail
pub async fn fail(
    State(state): State<Arc<AppState>>,
    ctx: AuditContext,
    Path(id): Path<i64>,
    Json(request): Json<FailRequest>,
) -> ApiResult<Json<ScrapJob>> {
    let reason = request.reason.trim();
    if reason.is_empty() {
        return Err(ApiError::bad_request("reason is required"));
    }
    let job = state.store.fail_scrap(id, reason)?;
    audit::record(
        &ctx,
        Action::Fail,
        "scrap_job",
        Some(id.to_string()),
        Ok(Some(reason.to_string())),
        &state.audit,
    );
    Ok(Json(job))
}
