pub mod date_range;
pub mod error;
pub mod error_body;
pub mod model;
pub mod pagination;
pub mod validation;

pub use date_range::{DateRange, MAX_SCRAP_RANGE_DAYS};
pub use error::{ClinexecError, Result};
pub use error_body::{ErrorBody, ErrorCode};
pub use model::{
    Clinic, Granularity, NewClinic, NewPatient, NewTransaction, PaymentMethodRevenue, Patient,
    RevenueBucket, RevenueRow, RevenueSummary, ScrapJob, ScrapResults, ScrapStatus, ScrapedPatient,
    ScrapedTransaction, SyncEntity, SyncFailure, SyncReport, Transaction,
};
pub use pagination::{Page, PageRequest};
