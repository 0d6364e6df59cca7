use crate::error::{Result, StoreError};
use crate::sqlite_store::SqliteStore;
use crate::transactions::UpsertOutcome;
use chrono::Utc;
use clinexec_core::{validation, NewPatient, Page, PageRequest, Patient};
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use serde::Deserialize;

pub(crate) const PATIENT_COLUMNS: &str = "id, clinic_id, medical_record_no, name, gender, birth_date, phone, address, \
     zains_id, zains_synced_at, zains_error, zains_attempts, created_at, updated_at";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PatientFilter {
    pub clinic_id: Option<i64>,
    /// Case-insensitive match on name or medical record number
    pub search: Option<String>,
    pub unsynced_only: bool,
}

pub(crate) fn map_patient(row: &Row<'_>) -> rusqlite::Result<Patient> {
    Ok(Patient {
        id: row.get("id")?,
        clinic_id: row.get("clinic_id")?,
        medical_record_no: row.get("medical_record_no")?,
        name: row.get("name")?,
        gender: row.get("gender")?,
        birth_date: row.get("birth_date")?,
        phone: row.get("phone")?,
        address: row.get("address")?,
        zains_id: row.get("zains_id")?,
        zains_synced_at: row.get("zains_synced_at")?,
        zains_error: row.get("zains_error")?,
        zains_attempts: row.get("zains_attempts")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn ensure_clinic(conn: &Connection, clinic_id: i64) -> Result<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM clinics WHERE id = ?)",
        params![clinic_id],
        |row| row.get(0),
    )?;
    if !exists {
        return Err(StoreError::not_found("clinic", clinic_id));
    }
    Ok(())
}

/// Insert or refresh a patient keyed by (clinic_id, medical_record_no).
/// Sync columns are never touched so an assigned Zains ID survives re-imports.
pub(crate) fn upsert_patient_row(conn: &Connection, patient: &NewPatient) -> Result<(i64, UpsertOutcome)> {
    validation::validate_patient(patient)?;
    let now = Utc::now();
    let record_no = patient.medical_record_no.trim();

    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM patients WHERE clinic_id = ? AND medical_record_no = ?",
            params![patient.clinic_id, record_no],
            |row| row.get(0),
        )
        .optional()?;

    match existing {
        Some(id) => {
            conn.execute(
                "UPDATE patients SET name = ?2, gender = COALESCE(?3, gender),
                    birth_date = COALESCE(?4, birth_date), phone = COALESCE(?5, phone),
                    address = COALESCE(?6, address), updated_at = ?7
                 WHERE id = ?1",
                params![
                    id,
                    patient.name.trim(),
                    patient.gender,
                    patient.birth_date,
                    patient.phone,
                    patient.address,
                    now
                ],
            )?;
            Ok((id, UpsertOutcome::Updated))
        }
        None => {
            ensure_clinic(conn, patient.clinic_id)?;
            conn.execute(
                "INSERT INTO patients
                    (clinic_id, medical_record_no, name, gender, birth_date, phone, address, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
                params![
                    patient.clinic_id,
                    record_no,
                    patient.name.trim(),
                    patient.gender,
                    patient.birth_date,
                    patient.phone,
                    patient.address,
                    now
                ],
            )?;
            Ok((conn.last_insert_rowid(), UpsertOutcome::Inserted))
        }
    }
}

#[allow(clippy::result_large_err)]
impl SqliteStore {
    pub fn create_patient(&self, patient: &NewPatient) -> Result<Patient> {
        validation::validate_patient(patient)?;
        let conn = self.conn()?;
        ensure_clinic(&conn, patient.clinic_id)?;

        let record_no = patient.medical_record_no.trim();
        let now = Utc::now();
        conn.execute(
            "INSERT INTO patients
                (clinic_id, medical_record_no, name, gender, birth_date, phone, address, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            params![
                patient.clinic_id,
                record_no,
                patient.name.trim(),
                patient.gender,
                patient.birth_date,
                patient.phone,
                patient.address,
                now
            ],
        )
        .map_err(|e| {
            StoreError::unique_violation(
                e,
                format!("medical record '{}' already exists in clinic {}", record_no, patient.clinic_id),
            )
        })?;

        let id = conn.last_insert_rowid();
        drop(conn);
        self.get_patient(id)?
            .ok_or_else(|| StoreError::not_found("patient", id))
    }

    pub fn get_patient(&self, id: i64) -> Result<Option<Patient>> {
        let conn = self.conn()?;
        let patient = conn
            .query_row(
                &format!("SELECT {} FROM patients WHERE id = ?", PATIENT_COLUMNS),
                params![id],
                map_patient,
            )
            .optional()?;
        Ok(patient)
    }

    pub fn list_patients(&self, filter: &PatientFilter, page: PageRequest) -> Result<Page<Patient>> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut args: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(clinic_id) = filter.clinic_id {
            clauses.push("clinic_id = ?");
            args.push(Box::new(clinic_id));
        }
        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            clauses.push("(LOWER(name) LIKE ? OR LOWER(medical_record_no) LIKE ?)");
            let pattern = format!("%{}%", search.to_lowercase());
            args.push(Box::new(pattern.clone()));
            args.push(Box::new(pattern));
        }
        if filter.unsynced_only {
            clauses.push("zains_id IS NULL");
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };

        let conn = self.conn()?;
        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM patients {}", where_sql),
            rusqlite::params_from_iter(args.iter()),
            |row| row.get(0),
        )?;

        args.push(Box::new(page.limit()));
        args.push(Box::new(page.offset()));
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM patients {} ORDER BY name, id LIMIT ? OFFSET ?",
            PATIENT_COLUMNS, where_sql
        ))?;
        let rows = stmt.query_map(rusqlite::params_from_iter(args.iter()), map_patient)?;
        let mut patients = Vec::new();
        for patient in rows {
            patients.push(patient?);
        }

        Ok(Page::new(patients, page, total as u64))
    }

    /// Replace demographic fields. Clinic and record number are identity and stay fixed.
    pub fn update_patient(&self, id: i64, patient: &NewPatient) -> Result<Patient> {
        validation::validate_patient(patient)?;
        let existing = self
            .get_patient(id)?
            .ok_or_else(|| StoreError::not_found("patient", id))?;

        if existing.clinic_id != patient.clinic_id
            || existing.medical_record_no != patient.medical_record_no.trim()
        {
            return Err(StoreError::Conflict(
                "clinic_id and medical_record_no cannot be changed".to_string(),
            ));
        }

        let conn = self.conn()?;
        conn.execute(
            "UPDATE patients SET name = ?2, gender = ?3, birth_date = ?4, phone = ?5,
                address = ?6, updated_at = ?7
             WHERE id = ?1",
            params![
                id,
                patient.name.trim(),
                patient.gender,
                patient.birth_date,
                patient.phone,
                patient.address,
                Utc::now()
            ],
        )?;
        drop(conn);

        self.get_patient(id)?
            .ok_or_else(|| StoreError::not_found("patient", id))
    }

    pub fn upsert_patient(&self, patient: &NewPatient) -> Result<(Patient, UpsertOutcome)> {
        let (id, outcome) = self.in_transaction(|tx| upsert_patient_row(tx, patient))?;
        let patient = self
            .get_patient(id)?
            .ok_or_else(|| StoreError::not_found("patient", id))?;
        Ok((patient, outcome))
    }

    pub fn delete_patient(&self, id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let rows = conn.execute("DELETE FROM patients WHERE id = ?", params![id])?;
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use crate::sqlite_store::test_support::*;
    use super::*;
    use clinexec_core::SyncEntity;

    fn new_patient(clinic_id: i64, rm: &str, name: &str) -> NewPatient {
        NewPatient {
            clinic_id,
            medical_record_no: rm.to_string(),
            name: name.to_string(),
            gender: Some("female".into()),
            birth_date: None,
            phone: Some("0812".into()),
            address: None,
        }
    }

    #[test]
    fn test_create_requires_existing_clinic() {
        let store = store();
        let err = store.create_patient(&new_patient(42, "RM-1", "Ani")).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "clinic", .. }));
    }

    #[test]
    fn test_duplicate_record_no_per_clinic() {
        let store = store();
        let a = clinic(&store, "A1");
        let b = clinic(&store, "B1");
        store.create_patient(&new_patient(a.id, "RM-1", "Ani")).unwrap();
        // Same record number in another clinic is fine
        store.create_patient(&new_patient(b.id, "RM-1", "Ani")).unwrap();

        let err = store.create_patient(&new_patient(a.id, "RM-1", "Ani")).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn test_search_and_filter() {
        let store = store();
        let c = clinic(&store, "C1");
        store.create_patient(&new_patient(c.id, "RM-1", "Siti Aminah")).unwrap();
        store.create_patient(&new_patient(c.id, "RM-2", "Budi")).unwrap();

        let filter = PatientFilter {
            search: Some("siti".into()),
            ..Default::default()
        };
        let page = store.list_patients(&filter, PageRequest::default()).unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].medical_record_no, "RM-1");

        let filter = PatientFilter {
            clinic_id: Some(c.id),
            unsynced_only: true,
            ..Default::default()
        };
        assert_eq!(store.list_patients(&filter, PageRequest::default()).unwrap().total, 2);
    }

    #[test]
    fn test_upsert_preserves_zains_id() {
        let store = store();
        let c = clinic(&store, "C2");
        let (p, outcome) = store.upsert_patient(&new_patient(c.id, "RM-9", "Dewi")).unwrap();
        assert_eq!(outcome, UpsertOutcome::Inserted);
        assert!(store.mark_synced(SyncEntity::Patient, p.id, "Z-100").unwrap());

        let mut renamed = new_patient(c.id, "RM-9", "Dewi Lestari");
        renamed.phone = None;
        let (p2, outcome) = store.upsert_patient(&renamed).unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);
        assert_eq!(p2.id, p.id);
        assert_eq!(p2.name, "Dewi Lestari");
        assert_eq!(p2.phone.as_deref(), Some("0812"));
        assert_eq!(p2.zains_id.as_deref(), Some("Z-100"));
    }

    #[test]
    fn test_update_cannot_move_clinic() {
        let store = store();
        let a = clinic(&store, "A2");
        let b = clinic(&store, "B2");
        let p = store.create_patient(&new_patient(a.id, "RM-1", "Ani")).unwrap();

        let err = store.update_patient(p.id, &new_patient(b.id, "RM-1", "Ani")).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let updated = store.update_patient(p.id, &new_patient(a.id, "RM-1", "Ani Y")).unwrap();
        assert_eq!(updated.name, "Ani Y");
        assert!(store.delete_patient(p.id).unwrap());
    }
}
