use crate::error::{Result, StoreError};
use crate::sqlite_store::SqliteStore;
use chrono::Utc;
use clinexec_core::{validation, Clinic, NewClinic, Page, PageRequest};
use rusqlite::{params, OptionalExtension, Row};
use serde::Deserialize;

const CLINIC_COLUMNS: &str =
    "id, code, name, address, zains_branch_id, active, created_at, updated_at";

/// Partial update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClinicUpdate {
    pub name: Option<String>,
    pub address: Option<String>,
    pub zains_branch_id: Option<String>,
    pub active: Option<bool>,
}

fn map_clinic(row: &Row<'_>) -> rusqlite::Result<Clinic> {
    Ok(Clinic {
        id: row.get("id")?,
        code: row.get("code")?,
        name: row.get("name")?,
        address: row.get("address")?,
        zains_branch_id: row.get("zains_branch_id")?,
        active: row.get("active")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

#[allow(clippy::result_large_err)]
impl SqliteStore {
    pub fn create_clinic(&self, clinic: &NewClinic) -> Result<Clinic> {
        validation::validate_clinic(clinic)?;
        let now = Utc::now();
        let code = clinic.code.trim();
        let conn = self.conn()?;

        conn.execute(
            "INSERT INTO clinics (code, name, address, zains_branch_id, active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                code,
                clinic.name.trim(),
                clinic.address,
                clinic.zains_branch_id,
                clinic.active,
                now
            ],
        )
        .map_err(|e| StoreError::unique_violation(e, format!("clinic code '{}' already exists", code)))?;

        let id = conn.last_insert_rowid();
        drop(conn);
        self.get_clinic(id)?
            .ok_or_else(|| StoreError::not_found("clinic", id))
    }

    pub fn get_clinic(&self, id: i64) -> Result<Option<Clinic>> {
        let conn = self.conn()?;
        let clinic = conn
            .query_row(
                &format!("SELECT {} FROM clinics WHERE id = ?", CLINIC_COLUMNS),
                params![id],
                map_clinic,
            )
            .optional()?;
        Ok(clinic)
    }

    pub fn get_clinic_by_code(&self, code: &str) -> Result<Option<Clinic>> {
        let conn = self.conn()?;
        let clinic = conn
            .query_row(
                &format!("SELECT {} FROM clinics WHERE code = ?", CLINIC_COLUMNS),
                params![code],
                map_clinic,
            )
            .optional()?;
        Ok(clinic)
    }

    pub fn list_clinics(&self, page: PageRequest, include_inactive: bool) -> Result<Page<Clinic>> {
        let conn = self.conn()?;
        let filter = if include_inactive { "" } else { "WHERE active = 1" };

        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM clinics {}", filter),
            [],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM clinics {} ORDER BY name, id LIMIT ? OFFSET ?",
            CLINIC_COLUMNS, filter
        ))?;
        let rows = stmt.query_map(params![page.limit(), page.offset()], map_clinic)?;
        let mut clinics = Vec::new();
        for clinic in rows {
            clinics.push(clinic?);
        }

        Ok(Page::new(clinics, page, total as u64))
    }

    pub fn update_clinic(&self, id: i64, update: &ClinicUpdate) -> Result<Clinic> {
        if let Some(name) = &update.name
            && name.trim().is_empty()
        {
            return Err(clinexec_core::ClinexecError::validation("clinic name is required").into());
        }

        let conn = self.conn()?;
        let rows = conn.execute(
            "UPDATE clinics SET
                name = COALESCE(?2, name),
                address = COALESCE(?3, address),
                zains_branch_id = COALESCE(?4, zains_branch_id),
                active = COALESCE(?5, active),
                updated_at = ?6
             WHERE id = ?1",
            params![
                id,
                update.name.as_deref().map(str::trim),
                update.address,
                update.zains_branch_id,
                update.active,
                Utc::now()
            ],
        )?;
        drop(conn);

        if rows == 0 {
            return Err(StoreError::not_found("clinic", id));
        }
        self.get_clinic(id)?
            .ok_or_else(|| StoreError::not_found("clinic", id))
    }

    pub fn set_clinic_active(&self, id: i64, active: bool) -> Result<Clinic> {
        self.update_clinic(
            id,
            &ClinicUpdate {
                active: Some(active),
                ..Default::default()
            },
        )
    }

    /// Delete a clinic that owns no patients, transactions or active scrape jobs.
    pub fn delete_clinic(&self, id: i64) -> Result<bool> {
        self.in_transaction(|tx| {
            let dependents: i64 = tx.query_row(
                "SELECT
                    (SELECT COUNT(*) FROM patients WHERE clinic_id = ?1)
                  + (SELECT COUNT(*) FROM transactions WHERE clinic_id = ?1)
                  + (SELECT COUNT(*) FROM scrap_queue
                     WHERE clinic_id = ?1 AND status IN ('pending', 'processing'))",
                params![id],
                |row| row.get(0),
            )?;
            if dependents > 0 {
                return Err(StoreError::Conflict(format!(
                    "clinic {} still has patients, transactions or active scrape jobs; deactivate it instead",
                    id
                )));
            }

            tx.execute("DELETE FROM scrap_queue WHERE clinic_id = ?", params![id])?;
            let rows = tx.execute("DELETE FROM clinics WHERE id = ?", params![id])?;
            Ok(rows > 0)
        })
    }
}
