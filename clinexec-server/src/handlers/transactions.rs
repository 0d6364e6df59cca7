use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use clinexec_core::{NewTransaction, Page, Transaction};
use clinexec_store::{Action, TransactionFilter};
use serde::Deserialize;
use std::sync::Arc;

use super::{optional_range, page_request};
use crate::audit::{self, AuditContext};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct TransactionQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub clinic_id: Option<i64>,
    pub from: Option<String>,
    pub to: Option<String>,
    #[serde(default)]
    pub unsynced: bool,
}

impl TransactionQuery {
    pub fn filter(&self) -> ApiResult<TransactionFilter> {
        Ok(TransactionFilter {
            clinic_id: self.clinic_id,
            range: optional_range(self.from.as_deref(), self.to.as_deref())?,
            unsynced_only: self.unsynced,
        })
    }
}

/// GET /api/transactions
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TransactionQuery>,
) -> ApiResult<Json<Page<Transaction>>> {
    let filter = query.filter()?;
    let page = state
        .store
        .list_transactions(&filter, page_request(query.page, query.per_page))?;
    Ok(Json(page))
}

/// POST /api/transactions
pub async fn create(
    State(state): State<Arc<AppState>>,
    ctx: AuditContext,
    Json(trx): Json<NewTransaction>,
) -> ApiResult<(StatusCode, Json<Transaction>)> {
    let trx = state.store.create_transaction(&trx)?;
    audit::log_success(&ctx, Action::Create, "transaction", trx.id, &state.audit);
    Ok((StatusCode::CREATED, Json(trx)))
}

/// GET /api/transactions/{id}
pub async fn read(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Transaction>> {
    state
        .store
        .get_transaction(id)?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("transaction", id))
}

/// DELETE /api/transactions/{id}
pub async fn delete(
    State(state): State<Arc<AppState>>,
    ctx: AuditContext,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    if !state.store.delete_transaction(id)? {
        return Err(ApiError::not_found("transaction", id));
    }
    audit::log_success(&ctx, Action::Delete, "transaction", id, &state.audit);
    Ok(StatusCode::NO_CONTENT)
}
