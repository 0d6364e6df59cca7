use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClinexecError {
    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Invalid date '{value}': expected YYYY-MM-DD")]
    InvalidDate { value: String },

    #[error("Not found: {entity}/{id}")]
    NotFound { entity: String, id: String },

    #[error("Conflict: {0}")]
    Conflict(String),
}

impl ClinexecError {
    pub fn validation(message: impl Into<String>) -> Self {
        ClinexecError::Validation {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ClinexecError>;
