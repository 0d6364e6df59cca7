//! Transaction import/export
//!
//! GET  /api/export/transactions - NDJSON, one transaction per line
//! POST /api/import/transactions - NDJSON body, upserted by clinic + trx_no

use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Json},
};
use clinexec_core::NewTransaction;
use clinexec_store::{Action, UpsertOutcome};
use serde::Serialize;
use std::sync::Arc;

use super::transactions::TransactionQuery;
use crate::audit::{self, AuditContext};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct LineError {
    pub line: usize,
    pub error: String,
}

#[derive(Debug, Default, Serialize)]
pub struct ImportReport {
    pub inserted: usize,
    pub updated: usize,
    pub errors: Vec<LineError>,
}

/// GET /api/export/transactions
pub async fn export(
    State(state): State<Arc<AppState>>,
    ctx: AuditContext,
    Query(query): Query<TransactionQuery>,
) -> ApiResult<impl IntoResponse> {
    let filter = query.filter()?;
    let transactions = state.store.export_transactions(&filter)?;

    let mut ndjson = String::new();
    for trx in &transactions {
        let line = serde_json::to_string(trx).map_err(|e| ApiError::internal(e.to_string()))?;
        ndjson.push_str(&line);
        ndjson.push('\n');
    }

    audit::record(
        &ctx,
        Action::Export,
        "transaction",
        None,
        Ok(Some(format!("{} transactions", transactions.len()))),
        &state.audit,
    );

    Ok(([(header::CONTENT_TYPE, "application/x-ndjson")], ndjson))
}

/// POST /api/import/transactions
///
/// Bad lines are reported and skipped; the rest are still imported.
pub async fn import(
    State(state): State<Arc<AppState>>,
    ctx: AuditContext,
    body: String,
) -> Json<ImportReport> {
    let mut report = ImportReport::default();

    for (idx, line) in body.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let trx: NewTransaction = match serde_json::from_str(line) {
            Ok(trx) => trx,
            Err(e) => {
                report.errors.push(LineError {
                    line: idx + 1,
                    error: format!("Invalid JSON: {}", e),
                });
                continue;
            }
        };

        match state.store.upsert_transaction(&trx) {
            Ok((_, UpsertOutcome::Inserted)) => report.inserted += 1,
            Ok((_, UpsertOutcome::Updated)) => report.updated += 1,
            Err(e) => report.errors.push(LineError {
                line: idx + 1,
                error: e.to_string(),
            }),
        }
    }

    tracing::info!(
        inserted = report.inserted,
        updated = report.updated,
        errors = report.errors.len(),
        "Transaction import finished"
    );
    audit::record(
        &ctx,
        Action::Import,
        "transaction",
        None,
        Ok(Some(format!(
            "{} inserted, {} updated, {} errors",
            report.inserted,
            report.updated,
            report.errors.len()
        ))),
        &state.audit,
    );

    Json(report)
}
