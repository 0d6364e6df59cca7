use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use clinexec_core::{NewPatient, Page, Patient};
use clinexec_store::{Action, PatientFilter};
use serde::Deserialize;
use std::sync::Arc;

use super::page_request;
use crate::audit::{self, AuditContext};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct PatientListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub clinic_id: Option<i64>,
    /// Matches name or medical record number
    pub q: Option<String>,
    #[serde(default)]
    pub unsynced: bool,
}

/// GET /api/patients
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PatientListQuery>,
) -> ApiResult<Json<Page<Patient>>> {
    let filter = PatientFilter {
        clinic_id: query.clinic_id,
        search: query.q,
        unsynced_only: query.unsynced,
    };
    let page = state
        .store
        .list_patients(&filter, page_request(query.page, query.per_page))?;
    Ok(Json(page))
}

/// POST /api/patients
pub async fn create(
    State(state): State<Arc<AppState>>,
    ctx: AuditContext,
    Json(patient): Json<NewPatient>,
) -> ApiResult<(StatusCode, Json<Patient>)> {
    let patient = state.store.create_patient(&patient)?;
    audit::log_success(&ctx, Action::Create, "patient", patient.id, &state.audit);
    Ok((StatusCode::CREATED, Json(patient)))
}

/// GET /api/patients/{id}
pub async fn read(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Patient>> {
    state
        .store
        .get_patient(id)?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("patient", id))
}

/// PUT /api/patients/{id}
pub async fn update(
    State(state): State<Arc<AppState>>,
    ctx: AuditContext,
    Path(id): Path<i64>,
    Json(patient): Json<NewPatient>,
) -> ApiResult<Json<Patient>> {
    let patient = state.store.update_patient(id, &patient)?;
    audit::log_success(&ctx, Action::Update, "patient", id, &state.audit);
    Ok(Json(patient))
}

/// DELETE /api/patients/{id}
pub async fn delete(
    State(state): State<Arc<AppState>>,
    ctx: AuditContext,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    if !state.store.delete_patient(id)? {
        return Err(ApiError::not_found("patient", id));
    }
    audit::log_success(&ctx, Action::Delete, "patient", id, &state.audit);
    Ok(StatusCode::NO_CONTENT)
}
