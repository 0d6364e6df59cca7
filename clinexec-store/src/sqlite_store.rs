//! SQLite-backed operational store
//!
//! Schema:
//!   - clinics:      one row per clinic, unique `code`
//!   - patients:     unique (clinic_id, medical_record_no), Zains sync columns
//!   - transactions: unique (clinic_id, trx_no), Zains sync columns
//!   - scrap_queue:  scrape jobs and their status
//!   - settings:     key-value toggles and branding

use crate::error::{Result, StoreError};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLite-based store for every table the dashboard owns
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS clinics (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    code TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    address TEXT,
    zains_branch_id TEXT,
    active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS patients (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    clinic_id INTEGER NOT NULL REFERENCES clinics(id),
    medical_record_no TEXT NOT NULL,
    name TEXT NOT NULL,
    gender TEXT,
    birth_date TEXT,
    phone TEXT,
    address TEXT,
    zains_id TEXT,
    zains_synced_at TEXT,
    zains_error TEXT,
    zains_attempts INTEGER NOT NULL DEFAULT 0,
    zains_attempted_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (clinic_id, medical_record_no)
);

CREATE TABLE IF NOT EXISTS transactions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    clinic_id INTEGER NOT NULL REFERENCES clinics(id),
    patient_id INTEGER REFERENCES patients(id) ON DELETE SET NULL,
    trx_no TEXT NOT NULL,
    trx_date TEXT NOT NULL,
    amount INTEGER NOT NULL,
    payment_method TEXT,
    description TEXT,
    zains_id TEXT,
    zains_synced_at TEXT,
    zains_error TEXT,
    zains_attempts INTEGER NOT NULL DEFAULT 0,
    zains_attempted_at TEXT,
    created_at TEXT NOT NULL,
    UNIQUE (clinic_id, trx_no)
);

CREATE TABLE IF NOT EXISTS scrap_queue (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    clinic_id INTEGER NOT NULL REFERENCES clinics(id),
    date_from TEXT NOT NULL,
    date_to TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    requested_by TEXT,
    worker_id TEXT,
    attempts INTEGER NOT NULL DEFAULT 0,
    error TEXT,
    patients_imported INTEGER NOT NULL DEFAULT 0,
    transactions_imported INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    started_at TEXT,
    finished_at TEXT
);

CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_patients_clinic ON patients(clinic_id);
CREATE INDEX IF NOT EXISTS idx_patients_unsynced ON patients(zains_id, zains_attempts);
CREATE INDEX IF NOT EXISTS idx_transactions_clinic_date ON transactions(clinic_id, trx_date);
CREATE INDEX IF NOT EXISTS idx_transactions_unsynced ON transactions(zains_id, zains_attempts);
CREATE INDEX IF NOT EXISTS idx_scrap_status ON scrap_queue(status, created_at);
CREATE INDEX IF NOT EXISTS idx_scrap_dedupe ON scrap_queue(clinic_id, date_from, date_to, status);
"#;

#[allow(clippy::result_large_err)]
impl SqliteStore {
    /// Open the store (create if not exists)
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;

        // Busy timeout so concurrent writers wait instead of failing; WAL for concurrent readers
        conn.execute_batch(
            "PRAGMA busy_timeout=5000;
             PRAGMA journal_mode=WAL;
             PRAGMA foreign_keys=ON;",
        )?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Other("store connection lock poisoned".to_string()))
    }

    /// Run `f` inside an IMMEDIATE transaction; rolled back when `f` errors.
    pub fn in_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    /// Row counts for the dashboard
    pub fn table_counts(&self) -> Result<Vec<(String, i64)>> {
        let conn = self.conn()?;
        let mut counts = Vec::new();
        for table in ["clinics", "patients", "transactions", "scrap_queue"] {
            let count: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                    row.get(0)
                })?;
            counts.push((table.to_string(), count));
        }
        Ok(counts)
    }
}
