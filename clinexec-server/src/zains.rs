//! Client for the Zains accounting API.

use chrono::NaiveDate;
use clinexec_core::SyncEntity;
use clinexec_store::{PendingPatient, PendingTransaction};
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::config::ZainsSettings;

#[derive(Debug, Error)]
pub enum ZainsError {
    #[error("Zains base URL is not configured")]
    NotConfigured,

    #[error("Zains rejected the record ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Zains request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected Zains response: {0}")]
    InvalidResponse(String),
}

/// Stable reference Zains keeps alongside its own ID, so a replayed push
/// is recognised instead of duplicated.
pub fn external_ref(entity: SyncEntity, id: i64) -> String {
    match entity {
        SyncEntity::Patient => format!("clinexec-patient-{}", id),
        SyncEntity::Transaction => format!("clinexec-trx-{}", id),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PatientPayload {
    pub external_ref: String,
    pub branch_id: Option<String>,
    pub clinic_code: String,
    pub medical_record_no: String,
    pub name: String,
    pub gender: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

impl From<&PendingPatient> for PatientPayload {
    fn from(pending: &PendingPatient) -> Self {
        let p = &pending.patient;
        Self {
            external_ref: external_ref(SyncEntity::Patient, p.id),
            branch_id: pending.zains_branch_id.clone(),
            clinic_code: pending.clinic_code.clone(),
            medical_record_no: p.medical_record_no.clone(),
            name: p.name.clone(),
            gender: p.gender.clone(),
            birth_date: p.birth_date,
            phone: p.phone.clone(),
            address: p.address.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TransactionPayload {
    pub external_ref: String,
    pub branch_id: Option<String>,
    pub clinic_code: String,
    /// Zains ID of the patient, when the transaction has one
    pub patient_id: Option<String>,
    pub trx_no: String,
    pub trx_date: NaiveDate,
    pub amount: i64,
    pub payment_method: Option<String>,
    pub description: Option<String>,
}

impl From<&PendingTransaction> for TransactionPayload {
    fn from(pending: &PendingTransaction) -> Self {
        let t = &pending.transaction;
        Self {
            external_ref: external_ref(SyncEntity::Transaction, t.id),
            branch_id: pending.zains_branch_id.clone(),
            clinic_code: pending.clinic_code.clone(),
            patient_id: pending.patient_zains_id.clone(),
            trx_no: t.trx_no.clone(),
            trx_date: t.trx_date,
            amount: t.amount,
            payment_method: t.payment_method.clone(),
            description: t.description.clone(),
        }
    }
}

pub struct ZainsClient {
    client: reqwest::Client,
    settings: ZainsSettings,
}

impl ZainsClient {
    pub fn new(settings: ZainsSettings) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout())
            .build()?;
        Ok(Self { client, settings })
    }

    pub fn is_configured(&self) -> bool {
        self.settings.base_url.is_some()
    }

    pub fn settings(&self) -> &ZainsSettings {
        &self.settings
    }

    /// Create the patient upstream and return its Zains ID.
    pub async fn push_patient(&self, payload: &PatientPayload) -> Result<String, ZainsError> {
        self.push(&self.settings.patient_path, payload).await
    }

    /// Create the transaction upstream and return its Zains ID.
    pub async fn push_transaction(
        &self,
        payload: &TransactionPayload,
    ) -> Result<String, ZainsError> {
        self.push(&self.settings.transaction_path, payload).await
    }

    async fn push<T: Serialize>(&self, path: &str, payload: &T) -> Result<String, ZainsError> {
        let base = self
            .settings
            .base_url
            .as_deref()
            .ok_or(ZainsError::NotConfigured)?;
        let url = format!("{}{}", base.trim_end_matches('/'), path);

        let mut request = self.client.post(&url).json(payload);
        if let Some(key) = &self.settings.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        interpret_response(status, &body)
    }
}

/// 2xx carries the new ID. 409 means the external ref is already known
/// upstream; its ID is adopted so the local row converges.
fn interpret_response(status: StatusCode, body: &str) -> Result<String, ZainsError> {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let id = parsed.as_ref().and_then(extract_id);

    if status.is_success() {
        return id.ok_or_else(|| {
            ZainsError::InvalidResponse(format!("no id in response: {}", truncate(body)))
        });
    }

    if status == StatusCode::CONFLICT
        && let Some(id) = id
    {
        tracing::debug!(zains_id = %id, "Record already present in Zains");
        return Ok(id);
    }

    let message = parsed
        .as_ref()
        .and_then(|v| {
            v.get("message")
                .or_else(|| v.get("error"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| truncate(body));

    Err(ZainsError::Rejected {
        status: status.as_u16(),
        message,
    })
}

fn extract_id(value: &Value) -> Option<String> {
    let id = value
        .get("id")
        .or_else(|| value.get("data").and_then(|d| d.get("id")))?;
    match id {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn truncate(body: &str) -> String {
    const LIMIT: usize = 200;
    if body.chars().count() <= LIMIT {
        body.to_string()
    } else {
        let cut: String = body.chars().take(LIMIT).collect();
        format!("{}...", cut)
    }
}
