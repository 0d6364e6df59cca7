use axum::{
    extract::{Query, State},
    response::Json,
};
use chrono::Utc;
use clinexec_core::{DateRange, Granularity, PaymentMethodRevenue, RevenueBucket, RevenueSummary};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::optional_range;
use crate::error::ApiResult;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct RevenueQuery {
    pub from: Option<String>,
    pub to: Option<String>,
    pub clinic_id: Option<i64>,
    #[serde(default)]
    pub granularity: Granularity,
}

impl RevenueQuery {
    /// Requested range, or the current month.
    fn range(&self) -> ApiResult<DateRange> {
        Ok(optional_range(self.from.as_deref(), self.to.as_deref())?
            .unwrap_or_else(|| DateRange::month_of(Utc::now().date_naive())))
    }
}

#[derive(Debug, Serialize)]
pub struct PeriodReport {
    pub range: DateRange,
    pub granularity: Granularity,
    pub buckets: Vec<RevenueBucket>,
}

#[derive(Debug, Serialize)]
pub struct PaymentMethodReport {
    pub range: DateRange,
    pub methods: Vec<PaymentMethodRevenue>,
}

/// GET /api/reports/revenue
pub async fn revenue(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RevenueQuery>,
) -> ApiResult<Json<RevenueSummary>> {
    let summary = state
        .store
        .revenue_summary(query.range()?, query.clinic_id)?;
    Ok(Json(summary))
}

/// GET /api/reports/revenue/periods
pub async fn revenue_periods(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RevenueQuery>,
) -> ApiResult<Json<PeriodReport>> {
    let range = query.range()?;
    let buckets = state
        .store
        .revenue_by_period(range, query.clinic_id, query.granularity)?;
    Ok(Json(PeriodReport {
        range,
        granularity: query.granularity,
        buckets,
    }))
}

/// GET /api/reports/revenue/payment-methods
pub async fn revenue_payment_methods(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RevenueQuery>,
) -> ApiResult<Json<PaymentMethodReport>> {
    let range = query.range()?;
    let methods = state
        .store
        .revenue_by_payment_method(range, query.clinic_id)?;
    Ok(Json(PaymentMethodReport { range, methods }))
}
