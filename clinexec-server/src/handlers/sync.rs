use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use clinexec_core::{SyncEntity, SyncReport};
use clinexec_store::Action;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::audit::{self, AuditContext};
use crate::error::{ApiError, ApiResult};
use crate::sync::{SingleSync, SyncRun};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct SyncQuery {
    pub entity: Option<String>,
    pub clinic_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct SyncRunResponse {
    pub status: &'static str,
    pub reports: Vec<SyncReport>,
}

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub patients: usize,
    pub transactions: usize,
}

fn parse_entity(value: Option<&str>) -> ApiResult<Option<SyncEntity>> {
    match value.filter(|s| !s.is_empty()) {
        Some(s) => SyncEntity::parse(s).map(Some).ok_or_else(|| {
            ApiError::bad_request(format!(
                "unknown entity '{}': expected patients or transactions",
                s
            ))
        }),
        None => Ok(None),
    }
}

/// Run one sync pass and audit its tallies. Shared with the cron endpoint.
pub(crate) async fn run_sync(
    state: &AppState,
    ctx: &AuditContext,
    entity: Option<SyncEntity>,
) -> ApiResult<Json<SyncRunResponse>> {
    let run = match state.sync.run(&state.store, entity).await {
        Ok(run) => run,
        Err(e) => {
            audit::record(ctx, Action::Sync, "zains", None, Err(e.to_string()), &state.audit);
            return Err(e.into());
        }
    };

    let detail = match &run {
        SyncRun::Completed(reports) => reports
            .iter()
            .map(|r| {
                format!(
                    "{}: {} ok, {} failed, {} skipped",
                    r.entity.as_str(),
                    r.succeeded,
                    r.failed,
                    r.skipped
                )
            })
            .collect::<Vec<_>>()
            .join("; "),
        other => other.status().to_string(),
    };
    audit::record(ctx, Action::Sync, "zains", None, Ok(Some(detail)), &state.audit);

    let status = run.status();
    let reports = match run {
        SyncRun::Completed(reports) => reports,
        _ => Vec::new(),
    };
    Ok(Json(SyncRunResponse { status, reports }))
}

/// POST /api/sync
pub async fn run(
    State(state): State<Arc<AppState>>,
    ctx: AuditContext,
    Query(query): Query<SyncQuery>,
) -> ApiResult<Json<SyncRunResponse>> {
    let entity = parse_entity(query.entity.as_deref())?;
    run_sync(&state, &ctx, entity).await
}

/// POST /api/sync/{entity}/{id}
pub async fn sync_one(
    State(state): State<Arc<AppState>>,
    ctx: AuditContext,
    Path((entity, id)): Path<(String, i64)>,
) -> ApiResult<Json<SingleSync>> {
    let Some(entity) = parse_entity(Some(entity.as_str()))? else {
        return Err(ApiError::bad_request("entity is required"));
    };

    match state.sync.sync_one(&state.store, entity, id).await {
        Ok(single) => {
            audit::record(
                &ctx,
                Action::Sync,
                entity.as_str(),
                Some(id.to_string()),
                Ok(Some(single.zains_id.clone())),
                &state.audit,
            );
            Ok(Json(single))
        }
        Err(e) => {
            audit::record(
                &ctx,
                Action::Sync,
                entity.as_str(),
                Some(id.to_string()),
                Err(e.to_string()),
                &state.audit,
            );
            Err(e.into())
        }
    }
}

/// POST /api/sync/reset
///
/// Clears attempt counters and errors so exhausted rows are retried.
pub async fn reset(
    State(state): State<Arc<AppState>>,
    ctx: AuditContext,
    Query(query): Query<SyncQuery>,
) -> ApiResult<Json<ResetResponse>> {
    let entity = parse_entity(query.entity.as_deref())?;
    let mut response = ResetResponse {
        patients: 0,
        transactions: 0,
    };
    if entity.is_none_or(|e| e == SyncEntity::Patient) {
        response.patients = state
            .store
            .reset_sync_failures(SyncEntity::Patient, query.clinic_id)?;
    }
    if entity.is_none_or(|e| e == SyncEntity::Transaction) {
        response.transactions = state
            .store
            .reset_sync_failures(SyncEntity::Transaction, query.clinic_id)?;
    }

    audit::record(
        &ctx,
        Action::Sync,
        "zains",
        None,
        Ok(Some(format!(
            "reset {} patients, {} transactions",
            response.patients, response.transactions
        ))),
        &state.audit,
    );
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_entity() {
        assert_eq!(parse_entity(None).unwrap(), None);
        assert_eq!(parse_entity(Some("")).unwrap(), None);
        assert_eq!(
            parse_entity(Some("patients")).unwrap(),
            Some(SyncEntity::Patient)
        );
        assert!(parse_entity(Some("clinics")).is_err());
    }
}
