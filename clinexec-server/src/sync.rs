//! Batch push of unsynced patients and transactions to Zains.
//!
//! Best effort: a failing record is tallied and stamped with its error,
//! the rest of the batch carries on. Zains IDs are written at most once.

use clinexec_core::{SyncEntity, SyncReport};
use clinexec_store::{setting_keys, SqliteStore, StoreError};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

use crate::zains::{PatientPayload, TransactionPayload, ZainsClient, ZainsError};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Zains sync is disabled")]
    Disabled,

    #[error("patient {0} has not been synced to Zains yet")]
    PatientNotSynced(i64),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Zains(#[from] ZainsError),
}

#[derive(Debug)]
pub enum SyncRun {
    /// `zains.sync_enabled` is off; nothing was read or written
    Disabled,
    /// No Zains base URL; nothing was read or written
    NotConfigured,
    AlreadyRunning,
    Completed(Vec<SyncReport>),
}

impl SyncRun {
    pub fn status(&self) -> &'static str {
        match self {
            SyncRun::Disabled => "disabled",
            SyncRun::NotConfigured => "not_configured",
            SyncRun::AlreadyRunning => "already_running",
            SyncRun::Completed(_) => "completed",
        }
    }

    pub fn reports(&self) -> &[SyncReport] {
        match self {
            SyncRun::Completed(reports) => reports,
            _ => &[],
        }
    }
}

/// Result of pushing one record on demand
#[derive(Debug, Clone, Serialize)]
pub struct SingleSync {
    pub entity: SyncEntity,
    pub id: i64,
    pub zains_id: String,
    /// True when the record already had a Zains ID and no call was made
    pub already_synced: bool,
}

struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct SyncPipeline {
    client: ZainsClient,
    running: AtomicBool,
}

#[allow(clippy::result_large_err)]
impl SyncPipeline {
    pub fn new(client: ZainsClient) -> Self {
        Self {
            client,
            running: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn enabled(store: &SqliteStore) -> Result<bool, StoreError> {
        store.get_bool_setting(setting_keys::ZAINS_SYNC_ENABLED, false)
    }

    /// Push one batch of each requested entity. Patients go first so the
    /// transactions in the same run can reference their Zains IDs.
    pub async fn run(
        &self,
        store: &SqliteStore,
        entity: Option<SyncEntity>,
    ) -> Result<SyncRun, StoreError> {
        if !Self::enabled(store)? {
            tracing::info!("Zains sync skipped: disabled");
            return Ok(SyncRun::Disabled);
        }
        if !self.client.is_configured() {
            tracing::warn!("Zains sync skipped: no base URL configured");
            return Ok(SyncRun::NotConfigured);
        }

        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::info!("Zains sync already running");
            return Ok(SyncRun::AlreadyRunning);
        }
        let _guard = RunGuard(&self.running);

        let mut reports = Vec::new();
        if entity.is_none_or(|e| e == SyncEntity::Patient) {
            reports.push(self.sync_patients(store).await?);
        }
        if entity.is_none_or(|e| e == SyncEntity::Transaction) {
            reports.push(self.sync_transactions(store).await?);
        }

        for report in &reports {
            tracing::info!(
                entity = report.entity.as_str(),
                attempted = report.attempted,
                succeeded = report.succeeded,
                failed = report.failed,
                skipped = report.skipped,
                "Zains sync batch finished"
            );
        }

        Ok(SyncRun::Completed(reports))
    }

    async fn sync_patients(&self, store: &SqliteStore) -> Result<SyncReport, StoreError> {
        let settings = self.client.settings();
        let mut report = SyncReport::begin(SyncEntity::Patient);
        let batch = store.pending_patients(settings.batch_size, settings.max_attempts, None)?;

        for pending in batch {
            let id = pending.patient.id;
            let payload = PatientPayload::from(&pending);
            match self.client.push_patient(&payload).await {
                Ok(zains_id) => {
                    if store.mark_synced(SyncEntity::Patient, id, &zains_id)? {
                        report.record_success();
                    } else {
                        tracing::debug!(patient_id = id, "Zains ID already assigned");
                        report.record_skip();
                    }
                }
                Err(e) => {
                    tracing::warn!(patient_id = id, error = %e, "Patient sync failed");
                    store.mark_sync_failed(SyncEntity::Patient, id, &e.to_string())?;
                    report.record_failure(id, e.to_string());
                }
            }
        }

        Ok(report.finish())
    }

    async fn sync_transactions(&self, store: &SqliteStore) -> Result<SyncReport, StoreError> {
        let settings = self.client.settings();
        let mut report = SyncReport::begin(SyncEntity::Transaction);
        let batch =
            store.pending_transactions(settings.batch_size, settings.max_attempts, None)?;
        let waiting = store.waiting_transactions(settings.max_attempts, None)?;
        if waiting > 0 {
            tracing::debug!(waiting, "Transactions waiting for their patient to sync");
            report.record_skips(waiting);
        }

        for pending in batch {
            let id = pending.transaction.id;
            let payload = TransactionPayload::from(&pending);
            match self.client.push_transaction(&payload).await {
                Ok(zains_id) => {
                    if store.mark_synced(SyncEntity::Transaction, id, &zains_id)? {
                        report.record_success();
                    } else {
                        tracing::debug!(transaction_id = id, "Zains ID already assigned");
                        report.record_skip();
                    }
                }
                Err(e) => {
                    tracing::warn!(transaction_id = id, error = %e, "Transaction sync failed");
                    store.mark_sync_failed(SyncEntity::Transaction, id, &e.to_string())?;
                    report.record_failure(id, e.to_string());
                }
            }
        }

        Ok(report.finish())
    }

    /// Push a single record now, regardless of its attempt count.
    pub async fn sync_one(
        &self,
        store: &SqliteStore,
        entity: SyncEntity,
        id: i64,
    ) -> Result<SingleSync, SyncError> {
        if !Self::enabled(store)? {
            return Err(SyncError::Disabled);
        }

        let already = |zains_id: String| SingleSync {
            entity,
            id,
            zains_id,
            already_synced: true,
        };

        let pushed = match entity {
            SyncEntity::Patient => {
                let pending = store.sync_patient_context(id)?;
                if let Some(existing) = pending.patient.zains_id.clone() {
                    return Ok(already(existing));
                }
                self.client
                    .push_patient(&PatientPayload::from(&pending))
                    .await
            }
            SyncEntity::Transaction => {
                let pending = store.sync_transaction_context(id)?;
                if let Some(existing) = pending.transaction.zains_id.clone() {
                    return Ok(already(existing));
                }
                if let Some(patient_id) = pending.transaction.patient_id
                    && pending.patient_zains_id.is_none()
                {
                    return Err(SyncError::PatientNotSynced(patient_id));
                }
                self.client
                    .push_transaction(&TransactionPayload::from(&pending))
                    .await
            }
        };

        let zains_id = match pushed {
            Ok(zains_id) => zains_id,
            Err(e) => {
                tracing::warn!(entity = entity.as_str(), id, error = %e, "Record sync failed");
                store.mark_sync_failed(entity, id, &e.to_string())?;
                return Err(e.into());
            }
        };

        if store.mark_synced(entity, id, &zains_id)? {
            tracing::info!(entity = entity.as_str(), id, zains_id = %zains_id, "Record synced");
            return Ok(SingleSync {
                entity,
                id,
                zains_id,
                already_synced: false,
            });
        }

        // A concurrent run got there first; report the ID it stored
        let stored = match entity {
            SyncEntity::Patient => store.sync_patient_context(id)?.patient.zains_id,
            SyncEntity::Transaction => store.sync_transaction_context(id)?.transaction.zains_id,
        };
        Ok(already(stored.unwrap_or(zains_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ZainsSettings;
    use axum::{routing::post, Json, Router};
    use clinexec_core::{NewClinic, NewPatient, NewTransaction};

    fn pipeline(base_url: Option<String>) -> SyncPipeline {
        let settings = ZainsSettings {
            base_url,
            timeout_secs: 2,
            ..ZainsSettings::default()
        };
        SyncPipeline::new(ZainsClient::new(settings).unwrap())
    }

    fn seeded_store() -> (SqliteStore, i64) {
        let store = SqliteStore::open(":memory:").unwrap();
        let clinic = store
            .create_clinic(&NewClinic {
                code: "BDG".into(),
                name: "Bandung".into(),
                address: None,
                zains_branch_id: Some("BR-BDG".into()),
                active: true,
            })
            .unwrap();
        let patient = store
            .create_patient(&NewPatient {
                clinic_id: clinic.id,
                medical_record_no: "RM-1".into(),
                name: "Budi".into(),
                gender: None,
                birth_date: None,
                phone: None,
                address: None,
            })
            .unwrap();
        (store, patient.id)
    }

    #[tokio::test]
    async fn test_disabled_touches_nothing() {
        let (store, patient_id) = seeded_store();
        let run = pipeline(Some("http://127.0.0.1:9".into()))
            .run(&store, None)
            .await
            .unwrap();
        assert!(matches!(run, SyncRun::Disabled));
        assert_eq!(run.status(), "disabled");

        let patient = store.get_patient(patient_id).unwrap().unwrap();
        assert_eq!(patient.zains_attempts, 0);
        assert!(patient.zains_error.is_none());
    }

    #[tokio::test]
    async fn test_not_configured() {
        let (store, _) = seeded_store();
        store
            .set_setting(setting_keys::ZAINS_SYNC_ENABLED, "true")
            .unwrap();
        let run = pipeline(None).run(&store, None).await.unwrap();
        assert!(matches!(run, SyncRun::NotConfigured));
    }

    #[tokio::test]
    async fn test_already_running() {
        let (store, _) = seeded_store();
        store
            .set_setting(setting_keys::ZAINS_SYNC_ENABLED, "true")
            .unwrap();
        let pipeline = pipeline(Some("http://127.0.0.1:9".into()));
        pipeline.running.store(true, Ordering::Release);
        let run = pipeline.run(&store, None).await.unwrap();
        assert!(matches!(run, SyncRun::AlreadyRunning));
        assert!(run.reports().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_zains_records_failures() {
        let (store, patient_id) = seeded_store();
        store
            .set_setting(setting_keys::ZAINS_SYNC_ENABLED, "true")
            .unwrap();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let pipeline = pipeline(Some(format!("http://{}", addr)));
        let run = pipeline
            .run(&store, Some(SyncEntity::Patient))
            .await
            .unwrap();
        let reports = run.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].failed, 1);
        assert_eq!(reports[0].failures[0].record_id, patient_id);
        assert!(!pipeline.is_running());

        let patient = store.get_patient(patient_id).unwrap().unwrap();
        assert_eq!(patient.zains_attempts, 1);
        assert!(patient.zains_error.is_some());
        assert!(patient.zains_id.is_none());
    }

    #[tokio::test]
    async fn test_sync_one_disabled_and_already_synced() {
        let (store, patient_id) = seeded_store();
        let pipeline = pipeline(None);
        let err = pipeline
            .sync_one(&store, SyncEntity::Patient, patient_id)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Disabled));

        store
            .set_setting(setting_keys::ZAINS_SYNC_ENABLED, "true")
            .unwrap();
        store
            .mark_synced(SyncEntity::Patient, patient_id, "ZP-77")
            .unwrap();
        let single = pipeline
            .sync_one(&store, SyncEntity::Patient, patient_id)
            .await
            .unwrap();
        assert!(single.already_synced);
        assert_eq!(single.zains_id, "ZP-77");
    }

    #[tokio::test]
    async fn test_stuck_patient_does_not_stall_transactions() {
        let (store, patient_id) = seeded_store();
        store
            .set_setting(setting_keys::ZAINS_SYNC_ENABLED, "true")
            .unwrap();
        for _ in 0..5 {
            store
                .mark_sync_failed(SyncEntity::Patient, patient_id, "HTTP 422")
                .unwrap();
        }
        let clinic_id = store.get_patient(patient_id).unwrap().unwrap().clinic_id;
        let new_trx = |no: &str, day: u32, patient_id: Option<i64>| NewTransaction {
            clinic_id,
            patient_id,
            trx_no: no.to_string(),
            trx_date: chrono::NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
            amount: 10_000,
            payment_method: Some("cash".into()),
            description: None,
        };
        store.create_transaction(&new_trx("T-1", 1, Some(patient_id))).unwrap();
        store.create_transaction(&new_trx("T-2", 2, Some(patient_id))).unwrap();
        let walk_in = store.create_transaction(&new_trx("T-3", 3, None)).unwrap();

        let app = Router::new().route(
            "/api/transactions",
            post(|| async { Json(serde_json::json!({ "id": "ZT-1" })) }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let settings = ZainsSettings {
            base_url: Some(format!("http://{}", addr)),
            timeout_secs: 2,
            batch_size: 2,
            ..ZainsSettings::default()
        };
        let pipeline = SyncPipeline::new(ZainsClient::new(settings).unwrap());
        let run = pipeline
            .run(&store, Some(SyncEntity::Transaction))
            .await
            .unwrap();
        let report = &run.reports()[0];
        assert_eq!(report.attempted, 1);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.skipped, 2);

        let walk_in = store.get_transaction(walk_in.id).unwrap().unwrap();
        assert_eq!(walk_in.zains_id.as_deref(), Some("ZT-1"));
    }
}
