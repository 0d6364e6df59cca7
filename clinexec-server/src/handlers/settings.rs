use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use clinexec_store::{parse_bool, setting_keys, Action, Setting};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::audit::{self, AuditContext};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Keys whose value must be a boolean
const BOOLEAN_KEYS: &[&str] = &[
    setting_keys::ZAINS_SYNC_ENABLED,
    setting_keys::SCRAP_AUTO_TRIGGER,
];

#[derive(Debug, Deserialize)]
pub struct SettingValue {
    pub value: Value,
}

#[derive(Debug, Serialize)]
pub struct SettingEntry {
    pub key: String,
    pub value: String,
}

/// Stored text form of a JSON value: strings verbatim, scalars as written.
fn setting_text(key: &str, value: &Value) -> ApiResult<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        _ => {
            return Err(ApiError::bad_request(format!(
                "setting '{}' must be a string, number or boolean",
                key
            )));
        }
    };

    if BOOLEAN_KEYS.contains(&key) {
        let parsed = parse_bool(&text).ok_or_else(|| {
            ApiError::bad_request(format!("setting '{}' must be true or false", key))
        })?;
        return Ok(parsed.to_string());
    }
    Ok(text)
}

/// GET /api/settings
pub async fn list(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<Setting>>> {
    Ok(Json(state.store.all_settings()?))
}

/// GET /api/settings/{key}
pub async fn read(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> ApiResult<Json<SettingEntry>> {
    let value = state
        .store
        .get_setting(&key)?
        .ok_or_else(|| ApiError::not_found("setting", &key))?;
    Ok(Json(SettingEntry { key, value }))
}

/// PUT /api/settings/{key}
pub async fn write(
    State(state): State<Arc<AppState>>,
    ctx: AuditContext,
    Path(key): Path<String>,
    Json(body): Json<SettingValue>,
) -> ApiResult<Json<Setting>> {
    let text = setting_text(&key, &body.value)?;
    let setting = state.store.set_setting(&key, &text)?;
    audit::record(
        &ctx,
        Action::Setting,
        "setting",
        Some(key),
        Ok(Some(text)),
        &state.audit,
    );
    Ok(Json(setting))
}

/// DELETE /api/settings/{key}
pub async fn delete(
    State(state): State<Arc<AppState>>,
    ctx: AuditContext,
    Path(key): Path<String>,
) -> ApiResult<StatusCode> {
    if !state.store.delete_setting(&key)? {
        return Err(ApiError::not_found("setting", &key));
    }
    audit::log_success(&ctx, Action::Setting, "setting", &key, &state.audit);
    Ok(StatusCode::NO_CONTENT)
}
