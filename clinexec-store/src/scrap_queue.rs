//! Scrape job queue
//!
//! Jobs move `pending -> processing -> completed | failed`. Every transition
//! is a single guarded UPDATE (or runs inside an IMMEDIATE transaction), so
//! concurrent callers on any connection cannot both win the same job.
//! Failed jobs are never re-queued; a retry is a fresh job.

use crate::error::{Result, StoreError};
use crate::patients::upsert_patient_row;
use crate::sqlite_store::SqliteStore;
use crate::transactions::upsert_transaction_row;
use chrono::{DateTime, Utc};
use clinexec_core::{
    DateRange, NewPatient, NewTransaction, Page, PageRequest, ScrapJob, ScrapResults, ScrapStatus,
};
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use serde::Serialize;
use std::collections::HashMap;

const JOB_COLUMNS: &str = "id, clinic_id, date_from, date_to, status, requested_by, worker_id, attempts, error, \
     patients_imported, transactions_imported, created_at, started_at, finished_at";

/// Reason written to jobs reclaimed by [`SqliteStore::recover_stale_jobs`].
pub const STALE_JOB_REASON: &str = "worker timed out";

/// Result of an enqueue request
#[derive(Debug, Clone, PartialEq)]
pub enum Enqueued {
    /// A new pending job was inserted
    Created(ScrapJob),
    /// An identical job is already pending or processing
    Existing(ScrapJob),
}

impl Enqueued {
    pub fn job(&self) -> &ScrapJob {
        match self {
            Enqueued::Created(job) | Enqueued::Existing(job) => job,
        }
    }

    pub fn into_job(self) -> ScrapJob {
        match self {
            Enqueued::Created(job) | Enqueued::Existing(job) => job,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Enqueued::Created(_))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
}

fn map_job(row: &Row<'_>) -> rusqlite::Result<ScrapJob> {
    let status: String = row.get("status")?;
    let status = ScrapStatus::parse(&status).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            format!("unknown scrap status '{}'", status).into(),
        )
    })?;

    Ok(ScrapJob {
        id: row.get("id")?,
        clinic_id: row.get("clinic_id")?,
        date_from: row.get("date_from")?,
        date_to: row.get("date_to")?,
        status,
        requested_by: row.get("requested_by")?,
        worker_id: row.get("worker_id")?,
        attempts: row.get("attempts")?,
        error: row.get("error")?,
        patients_imported: row.get("patients_imported")?,
        transactions_imported: row.get("transactions_imported")?,
        created_at: row.get("created_at")?,
        started_at: row.get("started_at")?,
        finished_at: row.get("finished_at")?,
    })
}

fn load_job(conn: &Connection, id: i64) -> Result<Option<ScrapJob>> {
    let job = conn
        .query_row(
            &format!("SELECT {} FROM scrap_queue WHERE id = ?", JOB_COLUMNS),
            params![id],
            map_job,
        )
        .optional()?;
    Ok(job)
}

/// Explain why a guarded transition matched no row.
fn transition_error(conn: &Connection, id: i64, action: &str) -> StoreError {
    match load_job(conn, id) {
        Ok(Some(job)) => StoreError::Conflict(format!(
            "cannot {} scrape job {} while it is {}",
            action, id, job.status
        )),
        Ok(None) => StoreError::not_found("scrap_job", id),
        Err(e) => e,
    }
}

#[allow(clippy::result_large_err)]
impl SqliteStore {
    /// Queue a scrape for `clinic_id` over `range`, unless the same clinic and
    /// range is already pending or processing.
    pub fn enqueue_scrap(
        &self,
        clinic_id: i64,
        range: DateRange,
        requested_by: Option<&str>,
    ) -> Result<Enqueued> {
        range.ensure_scrapable()?;

        self.in_transaction(|tx| {
            let active: Option<bool> = tx
                .query_row(
                    "SELECT active FROM clinics WHERE id = ?",
                    params![clinic_id],
                    |row| row.get(0),
                )
                .optional()?;
            match active {
                None => return Err(StoreError::not_found("clinic", clinic_id)),
                Some(false) => {
                    return Err(StoreError::Conflict(format!(
                        "clinic {} is inactive",
                        clinic_id
                    )));
                }
                Some(true) => {}
            }

            let existing = tx
                .query_row(
                    &format!(
                        "SELECT {} FROM scrap_queue
                         WHERE clinic_id = ? AND date_from = ? AND date_to = ?
                           AND status IN ('pending', 'processing')
                         ORDER BY id LIMIT 1",
                        JOB_COLUMNS
                    ),
                    params![clinic_id, range.from, range.to],
                    map_job,
                )
                .optional()?;
            if let Some(job) = existing {
                tracing::debug!(job_id = job.id, clinic_id, status = %job.status, "Scrape already queued");
                return Ok(Enqueued::Existing(job));
            }

            tx.execute(
                "INSERT INTO scrap_queue (clinic_id, date_from, date_to, status, requested_by, created_at)
                 VALUES (?1, ?2, ?3, 'pending', ?4, ?5)",
                params![clinic_id, range.from, range.to, requested_by, Utc::now()],
            )?;
            let id = tx.last_insert_rowid();
            let job = load_job(tx, id)?.ok_or_else(|| StoreError::not_found("scrap_job", id))?;
            tracing::info!(job_id = id, clinic_id, from = %range.from, to = %range.to, "Scrape job queued");
            Ok(Enqueued::Created(job))
        })
    }

    /// Hand the oldest pending job to `worker_id`, or `None` when the queue is empty.
    pub fn claim_next_scrap(&self, worker_id: &str) -> Result<Option<ScrapJob>> {
        let conn = self.conn()?;
        let job = conn
            .query_row(
                &format!(
                    "UPDATE scrap_queue
                     SET status = 'processing', worker_id = ?1, started_at = ?2, attempts = attempts + 1
                     WHERE id = (SELECT id FROM scrap_queue WHERE status = 'pending'
                                 ORDER BY created_at, id LIMIT 1)
                       AND status = 'pending'
                     RETURNING {}",
                    JOB_COLUMNS
                ),
                params![worker_id, Utc::now()],
                map_job,
            )
            .optional()?;

        if let Some(ref job) = job {
            tracing::info!(job_id = job.id, clinic_id = job.clinic_id, worker_id, "Scrape job claimed");
        }
        Ok(job)
    }

    /// `processing -> completed`
    pub fn complete_scrap(
        &self,
        id: i64,
        patients_imported: u32,
        transactions_imported: u32,
    ) -> Result<ScrapJob> {
        let conn = self.conn()?;
        let job = conn
            .query_row(
                &format!(
                    "UPDATE scrap_queue
                     SET status = 'completed', finished_at = ?2, error = NULL,
                         patients_imported = ?3, transactions_imported = ?4
                     WHERE id = ?1 AND status = 'processing'
                     RETURNING {}",
                    JOB_COLUMNS
                ),
                params![id, Utc::now(), patients_imported, transactions_imported],
                map_job,
            )
            .optional()?;

        job.ok_or_else(|| transition_error(&conn, id, "complete"))
    }

    /// Import a worker's results and complete the job in one transaction.
    /// Rows dated outside the job's range are ignored.
    pub fn complete_scrap_with_results(&self, id: i64, results: &ScrapResults) -> Result<ScrapJob> {
        self.in_transaction(|tx| {
            let job = load_job(tx, id)?.ok_or_else(|| StoreError::not_found("scrap_job", id))?;
            if job.status != ScrapStatus::Processing {
                return Err(StoreError::Conflict(format!(
                    "cannot submit results for scrape job {} while it is {}",
                    id, job.status
                )));
            }

            let mut patient_ids: HashMap<String, i64> = HashMap::new();
            for scraped in &results.patients {
                let patient = NewPatient {
                    clinic_id: job.clinic_id,
                    medical_record_no: scraped.medical_record_no.trim().to_string(),
                    name: scraped.name.clone(),
                    gender: scraped.gender.clone(),
                    birth_date: scraped.birth_date,
                    phone: scraped.phone.clone(),
                    address: scraped.address.clone(),
                };
                let (patient_id, _) = upsert_patient_row(tx, &patient)?;
                patient_ids.insert(patient.medical_record_no, patient_id);
            }

            let range = job.range();
            let mut imported_transactions = 0u32;
            for scraped in &results.transactions {
                if !range.contains(scraped.trx_date) {
                    tracing::warn!(
                        job_id = id,
                        trx_no = %scraped.trx_no,
                        trx_date = %scraped.trx_date,
                        "Ignoring scraped transaction outside job range"
                    );
                    continue;
                }

                let patient_id = match scraped.medical_record_no.as_deref().map(str::trim) {
                    Some(rm) if !rm.is_empty() => match patient_ids.get(rm) {
                        Some(pid) => Some(*pid),
                        None => tx
                            .query_row(
                                "SELECT id FROM patients WHERE clinic_id = ? AND medical_record_no = ?",
                                params![job.clinic_id, rm],
                                |row| row.get(0),
                            )
                            .optional()?,
                    },
                    _ => None,
                };

                let trx = NewTransaction {
                    clinic_id: job.clinic_id,
                    patient_id,
                    trx_no: scraped.trx_no.clone(),
                    trx_date: scraped.trx_date,
                    amount: scraped.amount,
                    payment_method: scraped.payment_method.clone(),
                    description: scraped.description.clone(),
                };
                upsert_transaction_row(tx, &trx)?;
                imported_transactions += 1;
            }

            let job = tx.query_row(
                &format!(
                    "UPDATE scrap_queue
                     SET status = 'completed', finished_at = ?2, error = NULL,
                         patients_imported = ?3, transactions_imported = ?4
                     WHERE id = ?1 AND status = 'processing'
                     RETURNING {}",
                    JOB_COLUMNS
                ),
                params![id, Utc::now(), patient_ids.len() as u32, imported_transactions],
                map_job,
            )?;

            tracing::info!(
                job_id = id,
                patients = job.patients_imported,
                transactions = job.transactions_imported,
                "Scrape job completed"
            );
            Ok(job)
        })
    }

    /// `pending | processing -> failed`. Failing a pending job cancels it.
    pub fn fail_scrap(&self, id: i64, reason: &str) -> Result<ScrapJob> {
        let conn = self.conn()?;
        let job = conn
            .query_row(
                &format!(
                    "UPDATE scrap_queue
                     SET status = 'failed', finished_at = ?2, error = ?3
                     WHERE id = ?1 AND status IN ('pending', 'processing')
                     RETURNING {}",
                    JOB_COLUMNS
                ),
                params![id, Utc::now(), reason],
                map_job,
            )
            .optional()?;

        match job {
            Some(job) => {
                tracing::warn!(job_id = id, reason, "Scrape job failed");
                Ok(job)
            }
            None => Err(transition_error(&conn, id, "fail")),
        }
    }

    /// `pending -> failed`. A job a worker already claimed cannot be cancelled.
    pub fn cancel_scrap(&self, id: i64, reason: &str) -> Result<ScrapJob> {
        let conn = self.conn()?;
        let job = conn
            .query_row(
                &format!(
                    "UPDATE scrap_queue
                     SET status = 'failed', finished_at = ?2, error = ?3
                     WHERE id = ?1 AND status = 'pending'
                     RETURNING {}",
                    JOB_COLUMNS
                ),
                params![id, Utc::now(), reason],
                map_job,
            )
            .optional()?;

        match job {
            Some(job) => {
                tracing::info!(job_id = id, reason, "Scrape job cancelled");
                Ok(job)
            }
            None => Err(transition_error(&conn, id, "cancel")),
        }
    }

    pub fn get_scrap(&self, id: i64) -> Result<Option<ScrapJob>> {
        let conn = self.conn()?;
        load_job(&conn, id)
    }

    pub fn list_scrap(
        &self,
        status: Option<ScrapStatus>,
        clinic_id: Option<i64>,
        page: PageRequest,
    ) -> Result<Page<ScrapJob>> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut args: Vec<Box<dyn ToSql>> = Vec::new();
        if let Some(status) = status {
            clauses.push("status = ?");
            args.push(Box::new(status.as_str()));
        }
        if let Some(clinic_id) = clinic_id {
            clauses.push("clinic_id = ?");
            args.push(Box::new(clinic_id));
        }
        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };

        let conn = self.conn()?;
        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM scrap_queue {}", where_sql),
            rusqlite::params_from_iter(args.iter()),
            |row| row.get(0),
        )?;

        args.push(Box::new(page.limit()));
        args.push(Box::new(page.offset()));
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM scrap_queue {} ORDER BY id DESC LIMIT ? OFFSET ?",
            JOB_COLUMNS, where_sql
        ))?;
        let rows = stmt.query_map(rusqlite::params_from_iter(args.iter()), map_job)?;
        let mut jobs = Vec::new();
        for job in rows {
            jobs.push(job?);
        }

        Ok(Page::new(jobs, page, total as u64))
    }

    pub fn scrap_counts(&self) -> Result<QueueCounts> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM scrap_queue GROUP BY status")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;

        let mut counts = QueueCounts::default();
        for row in rows {
            let (status, count) = row?;
            match ScrapStatus::parse(&status) {
                Some(ScrapStatus::Pending) => counts.pending = count,
                Some(ScrapStatus::Processing) => counts.processing = count,
                Some(ScrapStatus::Completed) => counts.completed = count,
                Some(ScrapStatus::Failed) => counts.failed = count,
                None => tracing::warn!(status = %status, "Unknown status in scrap_queue"),
            }
        }
        Ok(counts)
    }

    pub fn has_pending_scrap(&self) -> Result<bool> {
        let conn = self.conn()?;
        let pending: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM scrap_queue WHERE status = 'pending')",
            [],
            |row| row.get(0),
        )?;
        Ok(pending)
    }

    /// Fail every processing job started before `cutoff`. Returns how many were reclaimed.
    pub fn recover_stale_jobs(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "UPDATE scrap_queue SET status = 'failed', finished_at = ?1, error = ?2
             WHERE status = 'processing' AND started_at < ?3",
            params![Utc::now(), STALE_JOB_REASON, cutoff],
        )?;
        if rows > 0 {
            tracing::warn!(count = rows, "Reclaimed stale scrape jobs");
        }
        Ok(rows)
    }

    /// Delete completed and failed jobs that finished before `cutoff`.
    pub fn prune_finished_jobs(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "DELETE FROM scrap_queue
             WHERE status IN ('completed', 'failed') AND finished_at < ?1",
            params![cutoff],
        )?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use crate::sqlite_store::test_support::*;
    use super::*;
    use chrono::{Duration, NaiveDate};
    use clinexec_core::{ScrapedPatient, ScrapedTransaction};

    fn january() -> DateRange {
        DateRange::parse("2024-01-01", "2024-01-31").unwrap()
    }

    #[test]
    fn test_enqueue_dedupes_active_jobs() {
        let store = store();
        let c = clinic(&store, "Q1");

        let first = store.enqueue_scrap(c.id, january(), Some("admin")).unwrap();
        assert!(first.is_created());
        assert_eq!(first.job().status, ScrapStatus::Pending);

        let second = store.enqueue_scrap(c.id, january(), None).unwrap();
        assert!(!second.is_created());
        assert_eq!(second.job().id, first.job().id);

        // Still deduped while processing
        store.claim_next_scrap("w1").unwrap().unwrap();
        let third = store.enqueue_scrap(c.id, january(), None).unwrap();
        assert_eq!(third.job().id, first.job().id);

        // A different range is a different job
        let feb = DateRange::parse("2024-02-01", "2024-02-29").unwrap();
        assert!(store.enqueue_scrap(c.id, feb, None).unwrap().is_created());
    }

    #[test]
    fn test_enqueue_after_terminal_creates_new_job() {
        let store = store();
        let c = clinic(&store, "Q2");
        let job = store.enqueue_scrap(c.id, january(), None).unwrap().into_job();
        store.fail_scrap(job.id, "cancelled").unwrap();

        let again = store.enqueue_scrap(c.id, january(), None).unwrap();
        assert!(again.is_created());
        assert_ne!(again.job().id, job.id);
    }

    #[test]
    fn test_enqueue_rejects_bad_input() {
        let store = store();
        let c = clinic(&store, "Q3");

        let too_long = DateRange::parse("2024-01-01", "2024-03-01").unwrap();
        assert!(matches!(
            store.enqueue_scrap(c.id, too_long, None),
            Err(StoreError::Domain(_))
        ));
        assert!(matches!(
            store.enqueue_scrap(404, january(), None),
            Err(StoreError::NotFound { .. })
        ));

        store.set_clinic_active(c.id, false).unwrap();
        assert!(matches!(
            store.enqueue_scrap(c.id, january(), None),
            Err(StoreError::Conflict(_))
        ));
    }

    #[test]
    fn test_cancel_only_pending() {
        let store = store();
        let c = clinic(&store, "Q6");
        let job = store.enqueue_scrap(c.id, january(), None).unwrap().into_job();

        let cancelled = store.cancel_scrap(job.id, "cancelled by admin").unwrap();
        assert_eq!(cancelled.status, ScrapStatus::Failed);
        assert_eq!(cancelled.error.as_deref(), Some("cancelled by admin"));
        assert!(matches!(
            store.cancel_scrap(job.id, "again"),
            Err(StoreError::Conflict(_))
        ));

        let feb = DateRange::parse("2024-02-01", "2024-02-29").unwrap();
        let claimed = store.enqueue_scrap(c.id, feb, None).unwrap().into_job();
        store.claim_next_scrap("w1").unwrap().unwrap();
        assert!(matches!(
            store.cancel_scrap(claimed.id, "too late"),
            Err(StoreError::Conflict(_))
        ));
        assert!(matches!(
            store.cancel_scrap(999, "missing"),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn test_claim_order_and_empty_queue() {
        let store = store();
        let c = clinic(&store, "Q4");
        assert!(store.claim_next_scrap("w1").unwrap().is_none());

        let a = store.enqueue_scrap(c.id, january(), None).unwrap().into_job();
        let feb = DateRange::parse("2024-02-01", "2024-02-29").unwrap();
        let b = store.enqueue_scrap(c.id, feb, None).unwrap().into_job();

        let first = store.claim_next_scrap("w1").unwrap().unwrap();
        assert_eq!(first.id, a.id);
        assert_eq!(first.status, ScrapStatus::Processing);
        assert_eq!(first.worker_id.as_deref(), Some("w1"));
        assert_eq!(first.attempts, 1);
        assert!(first.started_at.is_some());

        let second = store.claim_next_scrap("w2").unwrap().unwrap();
        assert_eq!(second.id, b.id);
        assert!(store.claim_next_scrap("w3").unwrap().is_none());
        assert!(!store.has_pending_scrap().unwrap());
    }

    #[test]
    fn test_concurrent_claims_never_share_a_job() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.sqlite");
        let setup = SqliteStore::open(&path).unwrap();
        let c = clinic(&setup, "Q5");
        for day in 1..=10 {
            let date = NaiveDate::from_ymd_opt(2024, 1, day).unwrap();
            setup.enqueue_scrap(c.id, DateRange::day(date), None).unwrap();
        }

        // Separate connections, as separate web instances would have
        let stores: Vec<_> = (0..4).map(|_| SqliteStore::open(&path).unwrap()).collect();
        let handles: Vec<_> = stores
            .into_iter()
            .enumerate()
            .map(|(w, store)| {
                std::thread::spawn(move || {
                    let mut claimed = Vec::new();
                    while let Some(job) = store.claim_next_scrap(&format!("w{}", w)).unwrap() {
                        claimed.push(job.id);
                    }
                    claimed
                })
            })
            .collect();

        let mut all: Vec<i64> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        all.sort();
        let before = all.len();
        all.dedup();
        assert_eq!(before, 10);
        assert_eq!(all.len(), 10);
    }

    #[test]
    fn test_concurrent_enqueues_create_one_job() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.sqlite");
        let setup = SqliteStore::open(&path).unwrap();
        let c = clinic(&setup, "Q7");

        let stores: Vec<_> = (0..6).map(|_| SqliteStore::open(&path).unwrap()).collect();
        let handles: Vec<_> = stores
            .into_iter()
            .map(|store| {
                let clinic_id = c.id;
                std::thread::spawn(move || store.enqueue_scrap(clinic_id, january(), None).unwrap())
            })
            .collect();

        let results: Vec<Enqueued> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let created = results.iter().filter(|e| e.is_created()).count();
        assert_eq!(created, 1);

        let id = results[0].job().id;
        assert!(results.iter().all(|e| e.job().id == id));
        assert_eq!(setup.list_scrap(None, Some(c.id), PageRequest::default()).unwrap().total, 1);
    }

    #[test]
    fn test_transition_guards() {
        let store = store();
        let c = clinic(&store, "Q6");
        let job = store.enqueue_scrap(c.id, january(), None).unwrap().into_job();

        // Cannot complete a job that was never claimed
        assert!(matches!(store.complete_scrap(job.id, 0, 0), Err(StoreError::Conflict(_))));

        store.claim_next_scrap("w1").unwrap();
        let done = store.complete_scrap(job.id, 3, 7).unwrap();
        assert_eq!(done.status, ScrapStatus::Completed);
        assert_eq!(done.transactions_imported, 7);
        assert!(done.finished_at.is_some());

        // Terminal jobs stay terminal
        assert!(matches!(store.fail_scrap(job.id, "late"), Err(StoreError::Conflict(_))));
        assert!(matches!(store.complete_scrap(job.id, 0, 0), Err(StoreError::Conflict(_))));
        assert!(matches!(store.fail_scrap(999, "x"), Err(StoreError::NotFound { .. })));
    }

    #[test]
    fn test_complete_with_results_imports_rows() {
        let store = store();
        let c = clinic(&store, "Q7");
        let job = store.enqueue_scrap(c.id, january(), None).unwrap().into_job();
        store.claim_next_scrap("w1").unwrap();

        let date = |s: &str| NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap();
        let results = ScrapResults {
            patients: vec![ScrapedPatient {
                medical_record_no: "RM-1".into(),
                name: "Siti".into(),
                gender: Some("female".into()),
                birth_date: None,
                phone: None,
                address: None,
            }],
            transactions: vec![
                ScrapedTransaction {
                    trx_no: "T-1".into(),
                    trx_date: date("2024-01-03"),
                    amount: 75_000,
                    medical_record_no: Some("RM-1".into()),
                    payment_method: Some("cash".into()),
                    description: None,
                },
                ScrapedTransaction {
                    trx_no: "T-2".into(),
                    trx_date: date("2024-02-03"),
                    amount: 1,
                    medical_record_no: None,
                    payment_method: None,
                    description: None,
                },
            ],
        };

        let done = store.complete_scrap_with_results(job.id, &results).unwrap();
        assert_eq!(done.status, ScrapStatus::Completed);
        assert_eq!(done.patients_imported, 1);
        assert_eq!(done.transactions_imported, 1);

        let trx = store
            .export_transactions(&crate::TransactionFilter::default())
            .unwrap();
        assert_eq!(trx.len(), 1);
        assert!(trx[0].patient_id.is_some());

        // Second submission is refused, nothing imported twice
        assert!(matches!(
            store.complete_scrap_with_results(job.id, &results),
            Err(StoreError::Conflict(_))
        ));
    }

    #[test]
    fn test_results_rolled_back_on_bad_row() {
        let store = store();
        let c = clinic(&store, "Q8");
        let job = store.enqueue_scrap(c.id, january(), None).unwrap().into_job();
        store.claim_next_scrap("w1").unwrap();

        let results = ScrapResults {
            patients: vec![ScrapedPatient {
                medical_record_no: "RM-1".into(),
                name: "".into(),
                gender: None,
                birth_date: None,
                phone: None,
                address: None,
            }],
            transactions: vec![],
        };
        assert!(store.complete_scrap_with_results(job.id, &results).is_err());

        let job = store.get_scrap(job.id).unwrap().unwrap();
        assert_eq!(job.status, ScrapStatus::Processing);
        assert_eq!(store.table_counts().unwrap()[1].1, 0);
    }

    #[test]
    fn test_recover_stale_and_prune() {
        let store = store();
        let c = clinic(&store, "Q9");
        let job = store.enqueue_scrap(c.id, january(), None).unwrap().into_job();
        store.claim_next_scrap("w1").unwrap();

        // Not stale yet
        assert_eq!(store.recover_stale_jobs(Utc::now() - Duration::minutes(30)).unwrap(), 0);

        assert_eq!(store.recover_stale_jobs(Utc::now() + Duration::seconds(1)).unwrap(), 1);
        let job = store.get_scrap(job.id).unwrap().unwrap();
        assert_eq!(job.status, ScrapStatus::Failed);
        assert_eq!(job.error.as_deref(), Some(STALE_JOB_REASON));

        let counts = store.scrap_counts().unwrap();
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.pending, 0);

        assert_eq!(store.prune_finished_jobs(Utc::now() - Duration::days(1)).unwrap(), 0);
        assert_eq!(store.prune_finished_jobs(Utc::now() + Duration::seconds(1)).unwrap(), 1);
        assert!(store.get_scrap(job.id).unwrap().is_none());
    }

    #[test]
    fn test_list_filters() {
        let store = store();
        let a = clinic(&store, "QA");
        let b = clinic(&store, "QB");
        store.enqueue_scrap(a.id, january(), None).unwrap();
        store.enqueue_scrap(b.id, january(), None).unwrap();
        store.claim_next_scrap("w").unwrap();

        let pending = store
            .list_scrap(Some(ScrapStatus::Pending), None, PageRequest::default())
            .unwrap();
        assert_eq!(pending.total, 1);
        assert_eq!(pending.items[0].clinic_id, b.id);

        let for_a = store.list_scrap(None, Some(a.id), PageRequest::default()).unwrap();
        assert_eq!(for_a.total, 1);
        assert_eq!(for_a.items[0].status, ScrapStatus::Processing);
    }
}
