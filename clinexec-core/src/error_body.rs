use serde::{Deserialize, Serialize};

/// Error payload returned by every failing API call:
/// `{"error": {"code": "not-found", "message": "..."}}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: ErrorCode,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    Invalid,
    NotFound,
    Conflict,
    Unauthorized,
    Forbidden,
    Disabled,
    Upstream,
    Storage,
    Internal,
}

impl ErrorBody {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code,
                message: message.into(),
            },
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Invalid, message)
    }

    pub fn not_found(entity: &str, id: impl std::fmt::Display) -> Self {
        Self::new(ErrorCode::NotFound, format!("Not found: {}/{}", entity, id))
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn disabled(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Disabled, message)
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Upstream, message)
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Storage, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialization_shape() {
        let body = ErrorBody::not_found("clinic", 7);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["error"]["code"], "not-found");
        assert_eq!(json["error"]["message"], "Not found: clinic/7");
    }

    #[test]
    fn test_codes_are_kebab_case() {
        let json = serde_json::to_string(&ErrorBody::disabled("sync off")).unwrap();
        assert!(json.contains("\"disabled\""));
        let json = serde_json::to_string(&ErrorBody::upstream("boom")).unwrap();
        assert!(json.contains("\"upstream\""));
    }
}
