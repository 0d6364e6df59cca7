use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use clinexec_core::{Clinic, NewClinic, Page};
use clinexec_store::{Action, ClinicUpdate};
use serde::Deserialize;
use std::sync::Arc;

use super::page_request;
use crate::audit::{self, AuditContext};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ClinicListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    #[serde(default)]
    pub include_inactive: bool,
}

/// GET /api/clinics
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ClinicListQuery>,
) -> ApiResult<Json<Page<Clinic>>> {
    let page = state.store.list_clinics(
        page_request(query.page, query.per_page),
        query.include_inactive,
    )?;
    Ok(Json(page))
}

/// POST /api/clinics
pub async fn create(
    State(state): State<Arc<AppState>>,
    ctx: AuditContext,
    Json(clinic): Json<NewClinic>,
) -> ApiResult<(StatusCode, Json<Clinic>)> {
    let clinic = state.store.create_clinic(&clinic)?;
    audit::log_success(&ctx, Action::Create, "clinic", clinic.id, &state.audit);
    Ok((StatusCode::CREATED, Json(clinic)))
}

/// GET /api/clinics/{id}
pub async fn read(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Clinic>> {
    state
        .store
        .get_clinic(id)?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("clinic", id))
}

/// PUT /api/clinics/{id}
pub async fn update(
    State(state): State<Arc<AppState>>,
    ctx: AuditContext,
    Path(id): Path<i64>,
    Json(update): Json<ClinicUpdate>,
) -> ApiResult<Json<Clinic>> {
    let clinic = state.store.update_clinic(id, &update)?;
    audit::log_success(&ctx, Action::Update, "clinic", id, &state.audit);
    Ok(Json(clinic))
}

/// DELETE /api/clinics/{id}
pub async fn delete(
    State(state): State<Arc<AppState>>,
    ctx: AuditContext,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    if !state.store.delete_clinic(id)? {
        return Err(ApiError::not_found("clinic", id));
    }
    audit::log_success(&ctx, Action::Delete, "clinic", id, &state.audit);
    Ok(StatusCode::NO_CONTENT)
}
