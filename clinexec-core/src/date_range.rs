//! Inclusive calendar date ranges used by scrape jobs and reports.

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{ClinexecError, Result};

/// Longest span a single scrape job may cover.
pub const MAX_SCRAP_RANGE_DAYS: i64 = 31;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self> {
        if from > to {
            return Err(ClinexecError::validation(format!(
                "date range start {} is after end {}",
                from, to
            )));
        }
        Ok(Self { from, to })
    }

    /// Parse two `YYYY-MM-DD` strings into a range.
    pub fn parse(from: &str, to: &str) -> Result<Self> {
        Self::new(parse_date(from)?, parse_date(to)?)
    }

    /// A single-day range.
    pub fn day(date: NaiveDate) -> Self {
        Self { from: date, to: date }
    }

    /// The calendar month containing `date`.
    pub fn month_of(date: NaiveDate) -> Self {
        let from = date.with_day(1).unwrap_or(date);
        let to = from
            .checked_add_months(Months::new(1))
            .and_then(|d| d.pred_opt())
            .unwrap_or(date);
        Self { from, to }
    }

    /// Number of days covered, both ends included.
    pub fn days(&self) -> i64 {
        (self.to - self.from).num_days() + 1
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }

    /// Reject ranges longer than a scrape job may cover.
    pub fn ensure_scrapable(&self) -> Result<()> {
        if self.days() > MAX_SCRAP_RANGE_DAYS {
            return Err(ClinexecError::validation(format!(
                "scrape range covers {} days, at most {} allowed",
                self.days(),
                MAX_SCRAP_RANGE_DAYS
            )));
        }
        Ok(())
    }
}

pub fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
        ClinexecError::InvalidDate {
            value: value.to_string(),
        }
    })
}
