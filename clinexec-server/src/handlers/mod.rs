pub mod bulk;
pub mod clinics;
pub mod cron;
pub mod patients;
pub mod reports;
pub mod scrap;
pub mod settings;
pub mod status;
pub mod sync;
pub mod transactions;
pub mod worker;

use clinexec_core::{pagination::DEFAULT_PER_PAGE, DateRange, PageRequest};

use crate::error::{ApiError, ApiResult};

/// `page` / `per_page` query values, defaulted and clamped.
pub fn page_request(page: Option<u32>, per_page: Option<u32>) -> PageRequest {
    PageRequest::new(page.unwrap_or(1), per_page.unwrap_or(DEFAULT_PER_PAGE))
}

/// Optional `from` / `to` query pair. Both or neither.
pub fn optional_range(from: Option<&str>, to: Option<&str>) -> ApiResult<Option<DateRange>> {
    let from = from.filter(|s| !s.trim().is_empty());
    let to = to.filter(|s| !s.trim().is_empty());
    match (from, to) {
        (Some(from), Some(to)) => Ok(Some(DateRange::parse(from, to)?)),
        (None, None) => Ok(None),
        _ => Err(ApiError::bad_request(
            "'from' and 'to' must be given together",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_page_request_defaults() {
        let p = page_request(None, None);
        assert_eq!(p.page, 1);
        assert_eq!(p.per_page, DEFAULT_PER_PAGE);
        assert_eq!(page_request(Some(3), Some(1000)).per_page, 100);
    }

    #[test]
    fn test_optional_range() {
        assert!(optional_range(None, None).unwrap().is_none());
        assert!(optional_range(Some(""), None).unwrap().is_none());
        let range = optional_range(Some("2024-01-01"), Some("2024-01-31"))
            .unwrap()
            .unwrap();
        assert_eq!(range.days(), 31);

        let err = optional_range(Some("2024-01-01"), None).unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        let err = optional_range(Some("01/01/2024"), Some("2024-01-31")).unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }
}
