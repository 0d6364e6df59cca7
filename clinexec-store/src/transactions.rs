use crate::error::{Result, StoreError};
use crate::sqlite_store::SqliteStore;
use chrono::Utc;
use clinexec_core::{validation, DateRange, NewTransaction, Page, PageRequest, Transaction};
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use serde::Serialize;

pub(crate) const TRANSACTION_COLUMNS: &str = "id, clinic_id, patient_id, trx_no, trx_date, amount, payment_method, description, \
     zains_id, zains_synced_at, zains_error, zains_attempts, created_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub clinic_id: Option<i64>,
    pub range: Option<DateRange>,
    pub unsynced_only: bool,
}

impl TransactionFilter {
    fn where_clause(&self) -> (String, Vec<Box<dyn ToSql>>) {
        let mut clauses: Vec<&str> = Vec::new();
        let mut args: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(clinic_id) = self.clinic_id {
            clauses.push("clinic_id = ?");
            args.push(Box::new(clinic_id));
        }
        if let Some(range) = self.range {
            clauses.push("trx_date BETWEEN ? AND ?");
            args.push(Box::new(range.from));
            args.push(Box::new(range.to));
        }
        if self.unsynced_only {
            clauses.push("zains_id IS NULL");
        }

        if clauses.is_empty() {
            (String::new(), args)
        } else {
            (format!("WHERE {}", clauses.join(" AND ")), args)
        }
    }
}

pub(crate) fn map_transaction(row: &Row<'_>) -> rusqlite::Result<Transaction> {
    Ok(Transaction {
        id: row.get("id")?,
        clinic_id: row.get("clinic_id")?,
        patient_id: row.get("patient_id")?,
        trx_no: row.get("trx_no")?,
        trx_date: row.get("trx_date")?,
        amount: row.get("amount")?,
        payment_method: row.get("payment_method")?,
        description: row.get("description")?,
        zains_id: row.get("zains_id")?,
        zains_synced_at: row.get("zains_synced_at")?,
        zains_error: row.get("zains_error")?,
        zains_attempts: row.get("zains_attempts")?,
        created_at: row.get("created_at")?,
    })
}

fn ensure_refs(conn: &Connection, trx: &NewTransaction) -> Result<()> {
    let clinic: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM clinics WHERE id = ?)",
        params![trx.clinic_id],
        |row| row.get(0),
    )?;
    if !clinic {
        return Err(StoreError::not_found("clinic", trx.clinic_id));
    }

    if let Some(patient_id) = trx.patient_id {
        let patient_clinic: Option<i64> = conn
            .query_row(
                "SELECT clinic_id FROM patients WHERE id = ?",
                params![patient_id],
                |row| row.get(0),
            )
            .optional()?;
        match patient_clinic {
            None => return Err(StoreError::not_found("patient", patient_id)),
            Some(c) if c != trx.clinic_id => {
                return Err(StoreError::Conflict(format!(
                    "patient {} belongs to clinic {}, not {}",
                    patient_id, c, trx.clinic_id
                )));
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// Insert or refresh a transaction keyed by (clinic_id, trx_no).
/// Sync columns are left alone; a transaction already pushed keeps its Zains ID.
pub(crate) fn upsert_transaction_row(
    conn: &Connection,
    trx: &NewTransaction,
) -> Result<(i64, UpsertOutcome)> {
    validation::validate_transaction(trx)?;
    ensure_refs(conn, trx)?;
    let trx_no = trx.trx_no.trim();

    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM transactions WHERE clinic_id = ? AND trx_no = ?",
            params![trx.clinic_id, trx_no],
            |row| row.get(0),
        )
        .optional()?;

    match existing {
        Some(id) => {
            conn.execute(
                "UPDATE transactions SET patient_id = COALESCE(?2, patient_id), trx_date = ?3,
                    amount = ?4, payment_method = COALESCE(?5, payment_method),
                    description = COALESCE(?6, description)
                 WHERE id = ?1",
                params![
                    id,
                    trx.patient_id,
                    trx.trx_date,
                    trx.amount,
                    trx.payment_method,
                    trx.description
                ],
            )?;
            Ok((id, UpsertOutcome::Updated))
        }
        None => {
            conn.execute(
                "INSERT INTO transactions
                    (clinic_id, patient_id, trx_no, trx_date, amount, payment_method, description, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    trx.clinic_id,
                    trx.patient_id,
                    trx_no,
                    trx.trx_date,
                    trx.amount,
                    trx.payment_method,
                    trx.description,
                    Utc::now()
                ],
            )?;
            Ok((conn.last_insert_rowid(), UpsertOutcome::Inserted))
        }
    }
}

#[allow(clippy::result_large_err)]
impl SqliteStore {
    pub fn create_transaction(&self, trx: &NewTransaction) -> Result<Transaction> {
        validation::validate_transaction(trx)?;
        let conn = self.conn()?;
        ensure_refs(&conn, trx)?;

        let trx_no = trx.trx_no.trim();
        conn.execute(
            "INSERT INTO transactions
                (clinic_id, patient_id, trx_no, trx_date, amount, payment_method, description, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                trx.clinic_id,
                trx.patient_id,
                trx_no,
                trx.trx_date,
                trx.amount,
                trx.payment_method,
                trx.description,
                Utc::now()
            ],
        )
        .map_err(|e| {
            StoreError::unique_violation(
                e,
                format!("transaction '{}' already exists in clinic {}", trx_no, trx.clinic_id),
            )
        })?;

        let id = conn.last_insert_rowid();
        drop(conn);
        self.get_transaction(id)?
            .ok_or_else(|| StoreError::not_found("transaction", id))
    }

    pub fn get_transaction(&self, id: i64) -> Result<Option<Transaction>> {
        let conn = self.conn()?;
        let trx = conn
            .query_row(
                &format!("SELECT {} FROM transactions WHERE id = ?", TRANSACTION_COLUMNS),
                params![id],
                map_transaction,
            )
            .optional()?;
        Ok(trx)
    }

    pub fn list_transactions(
        &self,
        filter: &TransactionFilter,
        page: PageRequest,
    ) -> Result<Page<Transaction>> {
        let (where_sql, mut args) = filter.where_clause();
        let conn = self.conn()?;

        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM transactions {}", where_sql),
            rusqlite::params_from_iter(args.iter()),
            |row| row.get(0),
        )?;

        args.push(Box::new(page.limit()));
        args.push(Box::new(page.offset()));
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM transactions {} ORDER BY trx_date DESC, id DESC LIMIT ? OFFSET ?",
            TRANSACTION_COLUMNS, where_sql
        ))?;
        let rows = stmt.query_map(rusqlite::params_from_iter(args.iter()), map_transaction)?;
        let mut items = Vec::new();
        for trx in rows {
            items.push(trx?);
        }

        Ok(Page::new(items, page, total as u64))
    }

    /// Every transaction matching `filter`, oldest first
    pub fn export_transactions(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>> {
        let (where_sql, args) = filter.where_clause();
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM transactions {} ORDER BY trx_date, id",
            TRANSACTION_COLUMNS, where_sql
        ))?;
        let rows = stmt.query_map(rusqlite::params_from_iter(args.iter()), map_transaction)?;
        let mut items = Vec::new();
        for trx in rows {
            items.push(trx?);
        }
        Ok(items)
    }

    pub fn upsert_transaction(&self, trx: &NewTransaction) -> Result<(Transaction, UpsertOutcome)> {
        let (id, outcome) = self.in_transaction(|tx| upsert_transaction_row(tx, trx))?;
        let trx = self
            .get_transaction(id)?
            .ok_or_else(|| StoreError::not_found("transaction", id))?;
        Ok((trx, outcome))
    }

    pub fn delete_transaction(&self, id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let rows = conn.execute("DELETE FROM transactions WHERE id = ?", params![id])?;
        Ok(rows > 0)
    }
}
