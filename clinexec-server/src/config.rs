use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration loaded from YAML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server: ServerSettings,
    pub auth: AuthSettings,
    pub storage: StorageSettings,
    pub log: LogSettings,
    pub worker: WorkerSettings,
    pub zains: ZainsSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    pub enabled: bool,
    pub api_keys: Vec<ApiKey>,
    pub basic_auth: Vec<BasicAuthUser>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Admin,
    /// Scraper host: may only use /api/worker/*
    Worker,
    /// External scheduler: may only use /api/cron/*
    Cron,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub name: String,
    pub key: String,
    #[serde(default)]
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicAuthUser {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub data_dir: PathBuf,
    pub database: String,
    pub audit_db: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
}

/// Remote scraper worker
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Base URL of the worker service; triggering is disabled when unset.
    pub url: Option<String>,
    /// Bearer token sent with trigger calls
    pub token: Option<String>,
    pub timeout_secs: u64,
    /// Processing jobs older than this are failed by the cron sweep
    pub stale_after_secs: u64,
    /// Finished jobs older than this many days are pruned by the cron sweep
    pub retention_days: u32,
}

/// Zains accounting API
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ZainsSettings {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    /// Rows pushed per entity per run
    pub batch_size: u32,
    /// Rows that failed this many times are left alone until reset
    pub max_attempts: u32,
    pub patient_path: String,
    pub transaction_path: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            database: "clinexec.sqlite".to_string(),
            audit_db: "audit.sqlite".to_string(),
        }
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            url: None,
            token: None,
            timeout_secs: 10,
            stale_after_secs: 30 * 60,
            retention_days: 30,
        }
    }
}

impl Default for ZainsSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            timeout_secs: 15,
            batch_size: 50,
            max_attempts: 5,
            patient_path: "/api/patients".to_string(),
            transaction_path: "/api/transactions".to_string(),
        }
    }
}

impl WorkerSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// `None` when the configured value does not fit a `TimeDelta`.
    pub fn stale_after(&self) -> Option<chrono::TimeDelta> {
        i64::try_from(self.stale_after_secs)
            .ok()
            .and_then(chrono::TimeDelta::try_seconds)
    }

    pub fn retention(&self) -> Option<chrono::TimeDelta> {
        chrono::TimeDelta::try_days(i64::from(self.retention_days))
    }
}

impl ZainsSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ServerConfig {
    /// Load configuration from a YAML file
    pub fn load_from_file(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: ServerConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<&str>) -> Result<Self, Box<dyn std::error::Error>> {
        let mut config = if let Some(path) = config_path {
            Self::load_from_file(path)?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply `CLINEXEC_*` overrides from `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(port) = lookup("CLINEXEC_PORT")
            && let Ok(port_num) = port.parse()
        {
            self.server.port = port_num;
        }

        if let Some(host) = lookup("CLINEXEC_HOST") {
            self.server.host = host;
        }

        if let Some(data_dir) = lookup("CLINEXEC_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(data_dir);
        }

        if let Some(url) = lookup("CLINEXEC_WORKER_URL") {
            self.worker.url = Some(url);
        }

        if let Some(token) = lookup("CLINEXEC_WORKER_TOKEN") {
            self.worker.token = Some(token);
        }

        if let Some(url) = lookup("CLINEXEC_ZAINS_URL") {
            self.zains.base_url = Some(url);
        }

        if let Some(key) = lookup("CLINEXEC_ZAINS_API_KEY") {
            self.zains.api_key = Some(key);
        }
    }

    /// Get the full path to the operational database
    pub fn database_path(&self) -> PathBuf {
        self.storage.data_dir.join(&self.storage.database)
    }

    /// Get the full path to the audit database
    pub fn audit_db_path(&self) -> PathBuf {
        self.storage.data_dir.join(&self.storage.audit_db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert!(!config.auth.enabled);
        assert!(config.worker.url.is_none());
        assert_eq!(config.zains.batch_size, 50);
    }

    #[test]
    fn test_db_paths() {
        let config = ServerConfig::default();
        assert_eq!(config.database_path(), PathBuf::from("data/clinexec.sqlite"));
        assert_eq!(config.audit_db_path(), PathBuf::from("data/audit.sqlite"));
    }

    #[test]
    fn test_yaml_partial_sections() {
        let yaml = r#"
server:
  port: 9000
auth:
  enabled: true
  api_keys:
    - name: railway
      key: secret
      role: worker
    - name: ops
      key: other
zains:
  base_url: https://zains.example.org
  batch_size: 10
"#;
        let config: ServerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.auth.api_keys[0].role, Role::Worker);
        assert_eq!(config.auth.api_keys[1].role, Role::Admin);
        assert_eq!(config.zains.batch_size, 10);
        assert_eq!(config.zains.max_attempts, 5);
        assert_eq!(config.zains.patient_path, "/api/patients");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("CLINEXEC_PORT", "7070"),
            ("CLINEXEC_WORKER_URL", "http://worker.internal"),
            ("CLINEXEC_ZAINS_API_KEY", "k"),
        ]
        .into_iter()
        .collect();

        let mut config = ServerConfig::default();
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.server.port, 7070);
        assert_eq!(config.worker.url.as_deref(), Some("http://worker.internal"));
        assert_eq!(config.zains.api_key.as_deref(), Some("k"));
        assert!(config.zains.base_url.is_none());
    }
}
