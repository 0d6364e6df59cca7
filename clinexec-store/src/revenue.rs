//! Revenue reporting over the transactions table

use crate::error::Result;
use crate::sqlite_store::SqliteStore;
use clinexec_core::{DateRange, Granularity, PaymentMethodRevenue, RevenueBucket, RevenueRow, RevenueSummary};
use rusqlite::params;

#[allow(clippy::result_large_err)]
impl SqliteStore {
    /// Per-clinic totals for the range. Without a clinic filter every clinic is listed,
    /// including those with no transactions in range.
    pub fn revenue_summary(&self, range: DateRange, clinic_id: Option<i64>) -> Result<RevenueSummary> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT c.id, c.code, c.name,
                    COALESCE(SUM(t.amount), 0) AS total_amount,
                    COUNT(t.id) AS transaction_count
             FROM clinics c
             LEFT JOIN transactions t
                ON t.clinic_id = c.id AND t.trx_date BETWEEN ?1 AND ?2
             WHERE ?3 IS NULL OR c.id = ?3
             GROUP BY c.id, c.code, c.name
             ORDER BY total_amount DESC, c.name",
        )?;
        let rows = stmt.query_map(params![range.from, range.to, clinic_id], |row| {
            Ok(RevenueRow {
                clinic_id: row.get(0)?,
                clinic_code: row.get(1)?,
                clinic_name: row.get(2)?,
                total_amount: row.get(3)?,
                transaction_count: row.get(4)?,
            })
        })?;

        let mut clinics = Vec::new();
        for row in rows {
            clinics.push(row?);
        }

        Ok(RevenueSummary {
            range,
            total_amount: clinics.iter().map(|r| r.total_amount).sum(),
            transaction_count: clinics.iter().map(|r| r.transaction_count).sum(),
            clinics,
        })
    }

    /// Totals bucketed by day or month, ascending. Periods with no transactions are omitted.
    pub fn revenue_by_period(
        &self,
        range: DateRange,
        clinic_id: Option<i64>,
        granularity: Granularity,
    ) -> Result<Vec<RevenueBucket>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT strftime(?4, trx_date) AS period,
                    SUM(amount), COUNT(*)
             FROM transactions
             WHERE trx_date BETWEEN ?1 AND ?2 AND (?3 IS NULL OR clinic_id = ?3)
             GROUP BY period
             ORDER BY period",
        )?;
        let rows = stmt.query_map(
            params![range.from, range.to, clinic_id, granularity.sql_format()],
            |row| {
                Ok(RevenueBucket {
                    period: row.get(0)?,
                    total_amount: row.get(1)?,
                    transaction_count: row.get(2)?,
                })
            },
        )?;

        let mut buckets = Vec::new();
        for bucket in rows {
            buckets.push(bucket?);
        }
        Ok(buckets)
    }

    pub fn revenue_by_payment_method(
        &self,
        range: DateRange,
        clinic_id: Option<i64>,
    ) -> Result<Vec<PaymentMethodRevenue>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT COALESCE(NULLIF(TRIM(payment_method), ''), 'unknown') AS method,
                    SUM(amount) AS total, COUNT(*)
             FROM transactions
             WHERE trx_date BETWEEN ?1 AND ?2 AND (?3 IS NULL OR clinic_id = ?3)
             GROUP BY method
             ORDER BY total DESC, method",
        )?;
        let rows = stmt.query_map(params![range.from, range.to, clinic_id], |row| {
            Ok(PaymentMethodRevenue {
                payment_method: row.get(0)?,
                total_amount: row.get(1)?,
                transaction_count: row.get(2)?,
            })
        })?;

        let mut methods = Vec::new();
        for method in rows {
            methods.push(method?);
        }
        Ok(methods)
    }
}
