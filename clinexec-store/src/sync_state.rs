//! Zains sync bookkeeping for patients and transactions
//!
//! A row is pending while `zains_id IS NULL`. The ID is written with a
//! `zains_id IS NULL` guard, so the first successful push wins and later
//! writes for the same row are no-ops.

use crate::error::{Result, StoreError};
use crate::patients::{map_patient, PATIENT_COLUMNS};
use crate::sqlite_store::SqliteStore;
use crate::transactions::{map_transaction, TRANSACTION_COLUMNS};
use chrono::Utc;
use clinexec_core::{Patient, SyncEntity, Transaction};
use rusqlite::{params, OptionalExtension};
use serde::Serialize;

/// Patient awaiting push, with the clinic fields Zains needs
#[derive(Debug, Clone)]
pub struct PendingPatient {
    pub patient: Patient,
    pub clinic_code: String,
    pub zains_branch_id: Option<String>,
}

/// Transaction awaiting push, with its patient's Zains ID if known
#[derive(Debug, Clone)]
pub struct PendingTransaction {
    pub transaction: Transaction,
    pub clinic_code: String,
    pub zains_branch_id: Option<String>,
    pub patient_zains_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EntitySyncCounts {
    pub synced: i64,
    pub pending: i64,
    pub failed: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncCounts {
    pub patients: EntitySyncCounts,
    pub transactions: EntitySyncCounts,
}

fn table(entity: SyncEntity) -> &'static str {
    match entity {
        SyncEntity::Patient => "patients",
        SyncEntity::Transaction => "transactions",
    }
}

fn prefixed(columns: &str, alias: &str) -> String {
    columns
        .split(',')
        .map(str::trim)
        .map(|c| format!("{}.{} AS {}", alias, c, c))
        .collect::<Vec<_>>()
        .join(", ")
}

#[allow(clippy::result_large_err)]
impl SqliteStore {
    /// Unsynced patients under the attempt limit, oldest first.
    pub fn pending_patients(
        &self,
        limit: u32,
        max_attempts: u32,
        clinic_id: Option<i64>,
    ) -> Result<Vec<PendingPatient>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {}, c.code AS clinic_code, c.zains_branch_id AS branch
             FROM patients p JOIN clinics c ON c.id = p.clinic_id
             WHERE p.zains_id IS NULL AND p.zains_attempts < ?1
               AND (?2 IS NULL OR p.clinic_id = ?2)
             ORDER BY p.id
             LIMIT ?3",
            prefixed(PATIENT_COLUMNS, "p")
        ))?;
        let rows = stmt.query_map(params![max_attempts, clinic_id, limit], |row| {
            Ok(PendingPatient {
                patient: map_patient(row)?,
                clinic_code: row.get("clinic_code")?,
                zains_branch_id: row.get("branch")?,
            })
        })?;

        let mut pending = Vec::new();
        for row in rows {
            pending.push(row?);
        }
        Ok(pending)
    }

    /// Unsynced transactions under the attempt limit, oldest first.
    ///
    /// Rows whose patient has no Zains ID yet are left out, so they cannot
    /// crowd newer transactions out of the batch.
    pub fn pending_transactions(
        &self,
        limit: u32,
        max_attempts: u32,
        clinic_id: Option<i64>,
    ) -> Result<Vec<PendingTransaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {}, c.code AS clinic_code, c.zains_branch_id AS branch,
                    p.zains_id AS patient_zains_id
             FROM transactions t
             JOIN clinics c ON c.id = t.clinic_id
             LEFT JOIN patients p ON p.id = t.patient_id
             WHERE t.zains_id IS NULL AND t.zains_attempts < ?1
               AND (?2 IS NULL OR t.clinic_id = ?2)
               AND (t.patient_id IS NULL OR p.zains_id IS NOT NULL)
             ORDER BY t.trx_date, t.id
             LIMIT ?3",
            prefixed(TRANSACTION_COLUMNS, "t")
        ))?;
        let rows = stmt.query_map(params![max_attempts, clinic_id, limit], |row| {
            Ok(PendingTransaction {
                transaction: map_transaction(row)?,
                clinic_code: row.get("clinic_code")?,
                zains_branch_id: row.get("branch")?,
                patient_zains_id: row.get("patient_zains_id")?,
            })
        })?;

        let mut pending = Vec::new();
        for row in rows {
            pending.push(row?);
        }
        Ok(pending)
    }

    /// Unsynced transactions held back until their patient has a Zains ID.
    pub fn waiting_transactions(&self, max_attempts: u32, clinic_id: Option<i64>) -> Result<u32> {
        let conn = self.conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*)
             FROM transactions t JOIN patients p ON p.id = t.patient_id
             WHERE t.zains_id IS NULL AND t.zains_attempts < ?1
               AND (?2 IS NULL OR t.clinic_id = ?2)
               AND p.zains_id IS NULL",
            params![max_attempts, clinic_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Load one patient with its sync context, whatever its sync state.
    pub fn sync_patient_context(&self, id: i64) -> Result<PendingPatient> {
        let conn = self.conn()?;
        conn.query_row(
            &format!(
                "SELECT {}, c.code AS clinic_code, c.zains_branch_id AS branch
                 FROM patients p JOIN clinics c ON c.id = p.clinic_id
                 WHERE p.id = ?",
                prefixed(PATIENT_COLUMNS, "p")
            ),
            params![id],
            |row| {
                Ok(PendingPatient {
                    patient: map_patient(row)?,
                    clinic_code: row.get("clinic_code")?,
                    zains_branch_id: row.get("branch")?,
                })
            },
        )
        .optional()?
        .ok_or_else(|| StoreError::not_found("patient", id))
    }

    /// Load one transaction with its sync context, whatever its sync state.
    pub fn sync_transaction_context(&self, id: i64) -> Result<PendingTransaction> {
        let conn = self.conn()?;
        conn.query_row(
            &format!(
                "SELECT {}, c.code AS clinic_code, c.zains_branch_id AS branch,
                        p.zains_id AS patient_zains_id
                 FROM transactions t
                 JOIN clinics c ON c.id = t.clinic_id
                 LEFT JOIN patients p ON p.id = t.patient_id
                 WHERE t.id = ?",
                prefixed(TRANSACTION_COLUMNS, "t")
            ),
            params![id],
            |row| {
                Ok(PendingTransaction {
                    transaction: map_transaction(row)?,
                    clinic_code: row.get("clinic_code")?,
                    zains_branch_id: row.get("branch")?,
                    patient_zains_id: row.get("patient_zains_id")?,
                })
            },
        )
        .optional()?
        .ok_or_else(|| StoreError::not_found("transaction", id))
    }

    /// Record the Zains ID. Returns false when the row already had one (or is gone),
    /// in which case nothing was written.
    pub fn mark_synced(&self, entity: SyncEntity, id: i64, zains_id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let rows = conn.execute(
            &format!(
                "UPDATE {} SET zains_id = ?2, zains_synced_at = ?3, zains_error = NULL,
                    zains_attempted_at = ?3, zains_attempts = zains_attempts + 1
                 WHERE id = ?1 AND zains_id IS NULL",
                table(entity)
            ),
            params![id, zains_id, Utc::now()],
        )?;
        Ok(rows > 0)
    }

    pub fn mark_sync_failed(&self, entity: SyncEntity, id: i64, reason: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "UPDATE {} SET zains_error = ?2, zains_attempted_at = ?3,
                    zains_attempts = zains_attempts + 1
                 WHERE id = ?1 AND zains_id IS NULL",
                table(entity)
            ),
            params![id, reason, Utc::now()],
        )?;
        Ok(())
    }

    /// Make failed rows eligible again. Returns how many were reset.
    pub fn reset_sync_failures(&self, entity: SyncEntity, clinic_id: Option<i64>) -> Result<usize> {
        let conn = self.conn()?;
        let rows = conn.execute(
            &format!(
                "UPDATE {} SET zains_error = NULL, zains_attempts = 0
                 WHERE zains_id IS NULL AND (zains_error IS NOT NULL OR zains_attempts > 0)
                   AND (?1 IS NULL OR clinic_id = ?1)",
                table(entity)
            ),
            params![clinic_id],
        )?;
        Ok(rows)
    }

    pub fn sync_counts(&self) -> Result<SyncCounts> {
        let conn = self.conn()?;
        let count = |entity: SyncEntity| -> Result<EntitySyncCounts> {
            let counts = conn.query_row(
                &format!(
                    "SELECT
                        COALESCE(SUM(zains_id IS NOT NULL), 0),
                        COALESCE(SUM(zains_id IS NULL AND zains_error IS NULL), 0),
                        COALESCE(SUM(zains_id IS NULL AND zains_error IS NOT NULL), 0)
                     FROM {}",
                    table(entity)
                ),
                [],
                |row| {
                    Ok(EntitySyncCounts {
                        synced: row.get(0)?,
                        pending: row.get(1)?,
                        failed: row.get(2)?,
                    })
                },
            )?;
            Ok(counts)
        };

        Ok(SyncCounts {
            patients: count(SyncEntity::Patient)?,
            transactions: count(SyncEntity::Transaction)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::sqlite_store::test_support::*;
    use super::*;

    #[test]
    fn test_first_assignment_wins() {
        let store = store();
        let c = clinic(&store, "S1");
        let p = store.create_patient(&patient(c.id, "RM-1", "Ani")).unwrap();

        assert!(store.mark_synced(SyncEntity::Patient, p.id, "Z-1").unwrap());
        assert!(!store.mark_synced(SyncEntity::Patient, p.id, "Z-2").unwrap());

        let p = store.get_patient(p.id).unwrap().unwrap();
        assert_eq!(p.zains_id.as_deref(), Some("Z-1"));
        assert!(p.zains_synced_at.is_some());
        assert!(store.pending_patients(10, 5, None).unwrap().is_empty());
    }

    #[test]
    fn test_failures_count_toward_attempt_limit() {
        let store = store();
        let c = clinic(&store, "S2");
        let p = store.create_patient(&patient(c.id, "RM-1", "Ani")).unwrap();

        store.mark_sync_failed(SyncEntity::Patient, p.id, "HTTP 500").unwrap();
        store.mark_sync_failed(SyncEntity::Patient, p.id, "HTTP 500").unwrap();
        assert_eq!(store.pending_patients(10, 3, None).unwrap().len(), 1);
        store.mark_sync_failed(SyncEntity::Patient, p.id, "HTTP 500").unwrap();
        assert!(store.pending_patients(10, 3, None).unwrap().is_empty());

        let counts = store.sync_counts().unwrap();
        assert_eq!(counts.patients.failed, 1);
        assert_eq!(counts.patients.pending, 0);

        assert_eq!(store.reset_sync_failures(SyncEntity::Patient, Some(c.id)).unwrap(), 1);
        let pending = store.pending_patients(10, 3, None).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].clinic_code, "S2");
        assert_eq!(pending[0].zains_branch_id.as_deref(), Some("BR-S2"));
        assert!(pending[0].patient.zains_error.is_none());
    }

    #[test]
    fn test_pending_transactions_carry_patient_zains_id() {
        let store = store();
        let c = clinic(&store, "S3");
        let p = store.create_patient(&patient(c.id, "RM-1", "Ani")).unwrap();
        let mut t = trx(c.id, "T-1", "2024-01-02", 5_000);
        t.patient_id = Some(p.id);
        let t = store.create_transaction(&t).unwrap();
        store.create_transaction(&trx(c.id, "T-0", "2024-01-01", 1_000)).unwrap();

        // T-1 waits for its patient
        let pending = store.pending_transactions(10, 5, Some(c.id)).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].transaction.trx_no, "T-0");
        assert!(pending[0].patient_zains_id.is_none());
        assert_eq!(store.waiting_transactions(5, Some(c.id)).unwrap(), 1);

        store.mark_synced(SyncEntity::Patient, p.id, "ZP-9").unwrap();
        let ctx = store.sync_transaction_context(t.id).unwrap();
        assert_eq!(ctx.patient_zains_id.as_deref(), Some("ZP-9"));

        let pending = store.pending_transactions(10, 5, Some(c.id)).unwrap();
        assert_eq!(pending.len(), 2);
        // Oldest trx_date first
        assert_eq!(pending[0].transaction.trx_no, "T-0");
        assert_eq!(pending[1].patient_zains_id.as_deref(), Some("ZP-9"));
        assert_eq!(store.waiting_transactions(5, Some(c.id)).unwrap(), 0);

        assert_eq!(store.pending_transactions(1, 5, None).unwrap().len(), 1);
        assert!(matches!(
            store.sync_transaction_context(999),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn test_stuck_patient_does_not_block_later_transactions() {
        let store = store();
        let c = clinic(&store, "S5");
        let p = store.create_patient(&patient(c.id, "RM-1", "Ani")).unwrap();
        for _ in 0..5 {
            store.mark_sync_failed(SyncEntity::Patient, p.id, "HTTP 422").unwrap();
        }
        for (no, date) in [("T-1", "2024-01-01"), ("T-2", "2024-01-02")] {
            let mut t = trx(c.id, no, date, 1_000);
            t.patient_id = Some(p.id);
            store.create_transaction(&t).unwrap();
        }
        store.create_transaction(&trx(c.id, "T-3", "2024-01-03", 2_000)).unwrap();

        let pending = store.pending_transactions(2, 5, None).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].transaction.trx_no, "T-3");
        assert_eq!(store.waiting_transactions(5, None).unwrap(), 2);
    }

    #[test]
    fn test_failure_not_recorded_after_success() {
        let store = store();
        let c = clinic(&store, "S4");
        let t = store.create_transaction(&trx(c.id, "T-1", "2024-01-02", 5_000)).unwrap();
        store.mark_synced(SyncEntity::Transaction, t.id, "ZT-1").unwrap();
        store.mark_sync_failed(SyncEntity::Transaction, t.id, "late failure").unwrap();

        let t = store.get_transaction(t.id).unwrap().unwrap();
        assert!(t.zains_error.is_none());
        assert_eq!(store.sync_counts().unwrap().transactions.synced, 1);
    }
}
