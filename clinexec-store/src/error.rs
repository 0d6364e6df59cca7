use clinexec_core::ClinexecError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Not found: {entity}/{id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Domain(#[from] ClinexecError),

    #[error("{0}")]
    Other(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Turn a UNIQUE constraint violation into a conflict with a readable message.
    pub(crate) fn unique_violation(err: rusqlite::Error, message: impl Into<String>) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ref e, _)
                if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                StoreError::Conflict(message.into())
            }
            other => StoreError::Sqlite(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
