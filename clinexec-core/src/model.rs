//! Domain records shared by the store and the HTTP layer.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::date_range::DateRange;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Clinic {
    pub id: i64,
    /// Short unique code; also the identifier the scraper uses on the portal.
    pub code: String,
    pub name: String,
    pub address: Option<String>,
    pub zains_branch_id: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewClinic {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub zains_branch_id: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Patient {
    pub id: i64,
    pub clinic_id: i64,
    pub medical_record_no: String,
    pub name: String,
    pub gender: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub zains_id: Option<String>,
    pub zains_synced_at: Option<DateTime<Utc>>,
    pub zains_error: Option<String>,
    pub zains_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPatient {
    pub clinic_id: i64,
    pub medical_record_no: String,
    pub name: String,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub id: i64,
    pub clinic_id: i64,
    pub patient_id: Option<i64>,
    /// Transaction number as issued by the clinic portal.
    pub trx_no: String,
    pub trx_date: NaiveDate,
    /// Smallest currency unit.
    pub amount: i64,
    pub payment_method: Option<String>,
    pub description: Option<String>,
    pub zains_id: Option<String>,
    pub zains_synced_at: Option<DateTime<Utc>>,
    pub zains_error: Option<String>,
    pub zains_attempts: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTransaction {
    pub clinic_id: i64,
    #[serde(default)]
    pub patient_id: Option<i64>,
    pub trx_no: String,
    pub trx_date: NaiveDate,
    pub amount: i64,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Scrape job lifecycle: `pending -> processing -> completed | failed`.
/// A pending job may also be cancelled straight to `failed`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ScrapStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ScrapStatus {
    pub const ALL: [ScrapStatus; 4] = [
        ScrapStatus::Pending,
        ScrapStatus::Processing,
        ScrapStatus::Completed,
        ScrapStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScrapStatus::Pending => "pending",
            ScrapStatus::Processing => "processing",
            ScrapStatus::Completed => "completed",
            ScrapStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ScrapStatus::Pending),
            "processing" => Some(ScrapStatus::Processing),
            "completed" => Some(ScrapStatus::Completed),
            "failed" => Some(ScrapStatus::Failed),
            _ => None,
        }
    }

    /// Pending and processing jobs block duplicates.
    pub fn is_active(&self) -> bool {
        matches!(self, ScrapStatus::Pending | ScrapStatus::Processing)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

impl std::fmt::Display for ScrapStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScrapJob {
    pub id: i64,
    pub clinic_id: i64,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub status: ScrapStatus,
    pub requested_by: Option<String>,
    pub worker_id: Option<String>,
    pub attempts: u32,
    pub error: Option<String>,
    pub patients_imported: u32,
    pub transactions_imported: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ScrapJob {
    pub fn range(&self) -> DateRange {
        DateRange {
            from: self.date_from,
            to: self.date_to,
        }
    }
}

/// Patient row as captured by the scraper; the clinic comes from the job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapedPatient {
    pub medical_record_no: String,
    pub name: String,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

/// Transaction row as captured by the scraper. The patient is referenced
/// by medical record number within the job's clinic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapedTransaction {
    pub trx_no: String,
    pub trx_date: NaiveDate,
    pub amount: i64,
    #[serde(default)]
    pub medical_record_no: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Everything a worker submits when it finishes a job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScrapResults {
    #[serde(default)]
    pub patients: Vec<ScrapedPatient>,
    #[serde(default)]
    pub transactions: Vec<ScrapedTransaction>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SyncEntity {
    Patient,
    Transaction,
}

impl SyncEntity {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncEntity::Patient => "patient",
            SyncEntity::Transaction => "transaction",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "patient" | "patients" => Some(SyncEntity::Patient),
            "transaction" | "transactions" => Some(SyncEntity::Transaction),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncFailure {
    pub record_id: i64,
    pub reason: String,
}

/// Tally of one batch pushed to Zains.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    pub entity: SyncEntity,
    pub attempted: u32,
    pub succeeded: u32,
    pub failed: u32,
    pub skipped: u32,
    pub failures: Vec<SyncFailure>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SyncReport {
    pub fn begin(entity: SyncEntity) -> Self {
        let now = Utc::now();
        Self {
            entity,
            attempted: 0,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            failures: Vec::new(),
            started_at: now,
            finished_at: now,
        }
    }

    pub fn record_success(&mut self) {
        self.attempted += 1;
        self.succeeded += 1;
    }

    pub fn record_failure(&mut self, record_id: i64, reason: impl Into<String>) {
        self.attempted += 1;
        self.failed += 1;
        self.failures.push(SyncFailure {
            record_id,
            reason: reason.into(),
        });
    }

    pub fn record_skip(&mut self) {
        self.skipped += 1;
    }

    pub fn record_skips(&mut self, count: u32) {
        self.skipped += count;
    }

    pub fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    #[default]
    Day,
    Month,
}

impl Granularity {
    /// strftime pattern used to bucket `trx_date`.
    pub fn sql_format(&self) -> &'static str {
        match self {
            Granularity::Day => "%Y-%m-%d",
            Granularity::Month => "%Y-%m",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RevenueRow {
    pub clinic_id: i64,
    pub clinic_code: String,
    pub clinic_name: String,
    pub total_amount: i64,
    pub transaction_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RevenueSummary {
    pub range: DateRange,
    pub clinics: Vec<RevenueRow>,
    pub total_amount: i64,
    pub transaction_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RevenueBucket {
    pub period: String,
    pub total_amount: i64,
    pub transaction_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentMethodRevenue {
    pub payment_method: String,
    pub total_amount: i64,
    pub transaction_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scrap_status_round_trip_and_activity() {
        for status in ScrapStatus::ALL {
            assert_eq!(ScrapStatus::parse(status.as_str()), Some(status));
        }
        assert!(ScrapStatus::Pending.is_active());
        assert!(ScrapStatus::Processing.is_active());
        assert!(ScrapStatus::Completed.is_terminal());
        assert!(ScrapStatus::Failed.is_terminal());
        assert_eq!(ScrapStatus::parse("done"), None);
    }

    #[test]
    fn test_sync_report_tally() {
        let mut report = SyncReport::begin(SyncEntity::Patient);
        report.record_success();
        report.record_failure(4, "rejected");
        report.record_skip();
        let report = report.finish();

        assert_eq!(report.attempted, 2);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failures[0].record_id, 4);
        assert!(report.finished_at >= report.started_at);
    }

    #[test]
    fn test_new_clinic_defaults_active() {
        let clinic: NewClinic =
            serde_json::from_str(r#"{"code":"JKT-01","name":"Jakarta"}"#).unwrap();
        assert!(clinic.active);
        assert!(clinic.address.is_none());
    }

    #[test]
    fn test_sync_entity_parse_accepts_plurals() {
        assert_eq!(SyncEntity::parse("patients"), Some(SyncEntity::Patient));
        assert_eq!(SyncEntity::parse("transaction"), Some(SyncEntity::Transaction));
        assert_eq!(SyncEntity::parse("clinic"), None);
    }
}
