//! Input checks applied before anything reaches the store.

use crate::error::{ClinexecError, Result};
use crate::model::{NewClinic, NewPatient, NewTransaction};

pub fn validate_clinic(clinic: &NewClinic) -> Result<()> {
    let code = clinic.code.trim();
    if code.len() < 2 || code.len() > 32 {
        return Err(ClinexecError::validation(
            "clinic code must be between 2 and 32 characters",
        ));
    }
    if !code
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ClinexecError::validation(format!(
            "clinic code '{}' may only contain letters, digits, '-' and '_'",
            code
        )));
    }
    if clinic.name.trim().is_empty() {
        return Err(ClinexecError::validation("clinic name is required"));
    }
    Ok(())
}

pub fn validate_patient(patient: &NewPatient) -> Result<()> {
    if patient.medical_record_no.trim().is_empty() {
        return Err(ClinexecError::validation("medical_record_no is required"));
    }
    if patient.name.trim().is_empty() {
        return Err(ClinexecError::validation("patient name is required"));
    }
    if let Some(gender) = patient.gender.as_deref()
        && !matches!(gender, "male" | "female" | "unknown")
    {
        return Err(ClinexecError::validation(format!(
            "invalid gender '{}': must be male, female or unknown",
            gender
        )));
    }
    Ok(())
}

pub fn validate_transaction(trx: &NewTransaction) -> Result<()> {
    if trx.trx_no.trim().is_empty() {
        return Err(ClinexecError::validation("trx_no is required"));
    }
    if trx.amount < 0 {
        return Err(ClinexecError::validation(format!(
            "amount must not be negative (got {})",
            trx.amount
        )));
    }
    Ok(())
}

pub fn validate_setting_key(key: &str) -> Result<()> {
    if key.is_empty() || key.len() > 64 {
        return Err(ClinexecError::validation(
            "setting key must be between 1 and 64 characters",
        ));
    }
    if !key
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '.')
    {
        return Err(ClinexecError::validation(format!(
            "setting key '{}' may only contain lowercase letters, digits, '_' and '.'",
            key
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn clinic(code: &str, name: &str) -> NewClinic {
        NewClinic {
            code: code.to_string(),
            name: name.to_string(),
            address: None,
            zains_branch_id: None,
            active: true,
        }
    }

    #[test]
    fn test_clinic_code_rules() {
        assert!(validate_clinic(&clinic("JKT-01", "Jakarta")).is_ok());
        assert!(validate_clinic(&clinic("J", "Jakarta")).is_err());
        assert!(validate_clinic(&clinic("JKT 01", "Jakarta")).is_err());
        assert!(validate_clinic(&clinic("JKT01", "  ")).is_err());
    }

    #[test]
    fn test_patient_gender() {
        let mut p = NewPatient {
            clinic_id: 1,
            medical_record_no: "RM-001".into(),
            name: "Siti".into(),
            gender: Some("female".into()),
            birth_date: None,
            phone: None,
            address: None,
        };
        assert!(validate_patient(&p).is_ok());
        p.gender = Some("F".into());
        assert!(validate_patient(&p).is_err());
    }

    #[test]
    fn test_negative_amount_rejected() {
        let trx = NewTransaction {
            clinic_id: 1,
            patient_id: None,
            trx_no: "TRX-1".into(),
            trx_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            amount: -5,
            payment_method: None,
            description: None,
        };
        let err = validate_transaction(&trx).unwrap_err();
        assert!(err.to_string().contains("negative"));
    }

    #[test]
    fn test_setting_keys() {
        assert!(validate_setting_key("zains.sync_enabled").is_ok());
        assert!(validate_setting_key("Branding.Color").is_err());
        assert!(validate_setting_key("").is_err());
    }
}
