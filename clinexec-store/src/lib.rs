pub mod audit_log;
pub mod clinics;
pub mod error;
pub mod patients;
pub mod revenue;
pub mod scrap_queue;
pub mod settings;
pub mod sqlite_store;
pub mod sync_state;
pub mod transactions;

pub use audit_log::{Action, AuditEntry, AuditLog};
pub use clinics::ClinicUpdate;
pub use error::{Result, StoreError};
pub use patients::PatientFilter;
pub use scrap_queue::{Enqueued, QueueCounts, STALE_JOB_REASON};
pub use settings::{keys as setting_keys, parse_bool, Setting};
pub use sqlite_store::SqliteStore;
pub use sync_state::{EntitySyncCounts, PendingPatient, PendingTransaction, SyncCounts};
pub use transactions::{TransactionFilter, UpsertOutcome};
