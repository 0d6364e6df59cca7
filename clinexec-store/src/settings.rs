//! Key-value settings: feature toggles and branding

use crate::error::Result;
use crate::sqlite_store::SqliteStore;
use chrono::{DateTime, Utc};
use clinexec_core::validation;
use rusqlite::{params, OptionalExtension};
use serde::Serialize;

pub mod keys {
    /// Master switch for pushing data to Zains
    pub const ZAINS_SYNC_ENABLED: &str = "zains.sync_enabled";
    /// Wake the worker right after a scrape is queued
    pub const SCRAP_AUTO_TRIGGER: &str = "scrap.auto_trigger";
    pub const BRANDING_APP_NAME: &str = "branding.app_name";
    pub const BRANDING_PRIMARY_COLOR: &str = "branding.primary_color";
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Setting {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

/// Lenient boolean parsing for toggles edited by hand.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[allow(clippy::result_large_err)]
impl SqliteStore {
    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Read a toggle. Missing or unparseable values fall back to `default`.
    pub fn get_bool_setting(&self, key: &str, default: bool) -> Result<bool> {
        Ok(match self.get_setting(key)? {
            Some(value) => parse_bool(&value).unwrap_or_else(|| {
                tracing::warn!(key, value = %value, "Unparseable boolean setting, using default");
                default
            }),
            None => default,
        })
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<Setting> {
        validation::validate_setting_key(key)?;
        let now = Utc::now();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now],
        )?;
        tracing::info!(key, "Setting updated");
        Ok(Setting {
            key: key.to_string(),
            value: value.to_string(),
            updated_at: now,
        })
    }

    pub fn delete_setting(&self, key: &str) -> Result<bool> {
        let conn = self.conn()?;
        let rows = conn.execute("DELETE FROM settings WHERE key = ?", params![key])?;
        Ok(rows > 0)
    }

    pub fn all_settings(&self) -> Result<Vec<Setting>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT key, value, updated_at FROM settings ORDER BY key")?;
        let rows = stmt.query_map([], |row| {
            Ok(Setting {
                key: row.get(0)?,
                value: row.get(1)?,
                updated_at: row.get(2)?,
            })
        })?;
        let mut settings = Vec::new();
        for setting in rows {
            settings.push(setting?);
        }
        Ok(settings)
    }
}
