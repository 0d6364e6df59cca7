//! SQLite-based activity log
//!
//! Kept in its own file so it can be rotated without touching operational data.

use crate::error::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;
use std::path::Path;

/// Audited action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Update,
    Delete,
    Import,
    Export,
    Enqueue,
    Claim,
    Complete,
    Fail,
    Trigger,
    Sync,
    Setting,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Import => "import",
            Action::Export => "export",
            Action::Enqueue => "enqueue",
            Action::Claim => "claim",
            Action::Complete => "complete",
            Action::Fail => "fail",
            Action::Trigger => "trigger",
            Action::Sync => "sync",
            Action::Setting => "setting",
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AuditEntry {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub entity: Option<String>,
    pub entity_id: Option<String>,
    pub actor: Option<String>,
    pub client_ip: Option<String>,
    pub result: String,
    pub detail: Option<String>,
}

/// Audit log
pub struct AuditLog {
    conn: Connection,
}

#[allow(clippy::result_large_err)]
impl AuditLog {
    /// Open the audit log (create if not exists)
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let audit = Self { conn };
        audit.initialize()?;
        Ok(audit)
    }

    fn initialize(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                action TEXT NOT NULL,
                entity TEXT,
                entity_id TEXT,
                actor TEXT,
                client_ip TEXT,
                result TEXT NOT NULL,
                detail TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);
            CREATE INDEX IF NOT EXISTS idx_audit_entity ON audit_log(entity, entity_id);
            "#,
        )?;
        Ok(())
    }

    /// Record an audit log entry
    #[allow(clippy::too_many_arguments)]
    pub fn log(
        &self,
        action: Action,
        entity: Option<&str>,
        entity_id: Option<&str>,
        actor: Option<&str>,
        client_ip: Option<&str>,
        success: bool,
        detail: Option<&str>,
    ) -> Result<()> {
        let result = if success { "success" } else { "error" };

        self.conn.execute(
            r#"
            INSERT INTO audit_log
            (timestamp, action, entity, entity_id, actor, client_ip, result, detail)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                Utc::now(),
                action.as_str(),
                entity,
                entity_id,
                actor,
                client_ip,
                result,
                detail,
            ],
        )?;

        Ok(())
    }

    /// Most recent entries, newest first
    pub fn recent(&self, limit: usize) -> Result<Vec<AuditEntry>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, timestamp, action, entity, entity_id, actor, client_ip, result, detail
            FROM audit_log
            ORDER BY id DESC
            LIMIT ?1
            "#,
        )?;

        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(AuditEntry {
                id: row.get(0)?,
                timestamp: row.get(1)?,
                action: row.get(2)?,
                entity: row.get(3)?,
                entity_id: row.get(4)?,
                actor: row.get(5)?,
                client_ip: row.get(6)?,
                result: row.get(7)?,
                detail: row.get(8)?,
            })
        })?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recent_entries_newest_first() {
        let audit = AuditLog::open(":memory:").unwrap();

        audit
            .log(Action::Create, Some("clinic"), Some("1"), Some("admin"), Some("127.0.0.1"), true, None)
            .unwrap();
        audit
            .log(Action::Enqueue, Some("scrap_job"), Some("7"), Some("admin"), None, true, None)
            .unwrap();
        audit
            .log(Action::Sync, Some("patient"), None, Some("cron"), None, false, Some("2 failed"))
            .unwrap();

        let entries = audit.recent(10).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].action, "sync");
        assert_eq!(entries[0].result, "error");
        assert_eq!(entries[0].detail.as_deref(), Some("2 failed"));
        assert_eq!(entries[2].entity.as_deref(), Some("clinic"));

        assert_eq!(audit.recent(1).unwrap().len(), 1);
    }
}
