use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use clinexec_core::{ClinexecError, ErrorBody};
use clinexec_store::StoreError;

use crate::sync::SyncError;
use crate::zains::ZainsError;

/// Error returned by every handler; renders as `ErrorBody` JSON.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, body: ErrorBody) -> Self {
        Self { status, body }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ErrorBody::invalid(message))
    }

    pub fn not_found(entity: &str, id: impl std::fmt::Display) -> Self {
        Self::new(StatusCode::NOT_FOUND, ErrorBody::not_found(entity, id))
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, ErrorBody::conflict(message))
    }

    pub fn disabled(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, ErrorBody::disabled(message))
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, ErrorBody::upstream(message))
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, ErrorBody::unauthorized(message))
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, ErrorBody::forbidden(message))
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, ErrorBody::internal(message))
    }
}

impl From<ClinexecError> for ApiError {
    fn from(err: ClinexecError) -> Self {
        match err {
            ClinexecError::Validation { .. } | ClinexecError::InvalidDate { .. } => {
                Self::bad_request(err.to_string())
            }
            ClinexecError::NotFound { ref entity, ref id } => Self::not_found(entity, id),
            ClinexecError::Conflict(message) => Self::conflict(message),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => Self::not_found(entity, id),
            StoreError::Conflict(message) => Self::conflict(message),
            StoreError::Domain(e) => e.into(),
            other => {
                tracing::error!(error = %other, "Storage failure");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody::storage(other.to_string()),
                )
            }
        }
    }
}

impl From<ZainsError> for ApiError {
    fn from(err: ZainsError) -> Self {
        Self::upstream(err.to_string())
    }
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Disabled => Self::disabled(err.to_string()),
            SyncError::PatientNotSynced(_) => Self::conflict(err.to_string()),
            SyncError::Store(e) => e.into(),
            SyncError::Zains(e) => e.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
