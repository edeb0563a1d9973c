use anyhow::{bail, Context};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Listen address as `host:port`.
    #[serde(default = "default_address")]
    pub address: String,
    /// Dump file used by both the dump-per-write backend and the periodic saver.
    #[serde(default = "default_store_file")]
    pub store_file: PathBuf,
    /// Seconds between periodic dumps. `0` dumps on every write instead.
    #[serde(default = "default_store_interval")]
    pub store_interval_secs: u64,
    /// Restore the dump file at startup (memory and file backends only).
    #[serde(default = "default_restore")]
    pub restore: bool,
    /// Database connection string. Selects the database backend when set.
    #[serde(default)]
    pub database_dsn: Option<String>,
    /// Shared HMAC key for request verification and response signing.
    #[serde(default)]
    pub key: Option<String>,
    /// Path to the RSA private key (PEM) used to decrypt request bodies.
    #[serde(default)]
    pub crypto_key: Option<PathBuf>,
}

fn default_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_store_file() -> PathBuf {
    PathBuf::from("tmp/metrics-db.json")
}

fn default_store_interval() -> u64 {
    300
}

fn default_restore() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            store_file: default_store_file(),
            store_interval_secs: default_store_interval(),
            restore: default_restore(),
            database_dsn: None,
            key: None,
            crypto_key: None,
        }
    }
}

/// Which storage backend a configuration selects. Exactly one component ever
/// writes the dump file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    Database { dsn: String },
    /// In-memory with a dump after every write.
    File { path: PathBuf },
    /// In-memory with a periodic saver.
    Memory { path: PathBuf, interval: Duration },
}

impl ServerConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {path}"))?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn resolve(path: Option<&str>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        if let Some(v) = lookup("ADDRESS") {
            self.address = v;
        }
        if let Some(v) = lookup("STORE_INTERVAL") {
            self.store_interval_secs = v.parse().context("STORE_INTERVAL")?;
        }
        if let Some(v) = lookup("FILE_STORAGE_PATH") {
            self.store_file = PathBuf::from(v);
        }
        if let Some(v) = lookup("RESTORE") {
            self.restore = v.parse().context("RESTORE")?;
        }
        if let Some(v) = lookup("DATABASE_DSN") {
            self.database_dsn = Some(v);
        }
        if let Some(v) = lookup("KEY") {
            self.key = Some(v);
        }
        if let Some(v) = lookup("CRYPTO_KEY") {
            self.crypto_key = Some(PathBuf::from(v));
        }
        Ok(())
    }

    pub fn validate(&mut self) -> anyhow::Result<()> {
        if self.address.trim().is_empty() {
            bail!("address must not be empty");
        }
        if self.key.as_deref() == Some("") {
            self.key = None;
        }
        if self.database_dsn.as_deref() == Some("") {
            self.database_dsn = None;
        }
        Ok(())
    }

    pub fn backend(&self) -> StorageBackend {
        match &self.database_dsn {
            Some(dsn) => StorageBackend::Database { dsn: dsn.clone() },
            None if self.store_interval_secs == 0 => StorageBackend::File {
                path: self.store_file.clone(),
            },
            None => StorageBackend::Memory {
                path: self.store_file.clone(),
                interval: Duration::from_secs(self.store_interval_secs),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_select_memory_with_saver() {
        let config: ServerConfig = toml::from_str("").unwrap();
        assert_eq!(config.address, "0.0.0.0:8080");
        assert!(config.restore);
        assert_eq!(
            config.backend(),
            StorageBackend::Memory {
                path: PathBuf::from("tmp/metrics-db.json"),
                interval: Duration::from_secs(300),
            }
        );
    }

    #[test]
    fn zero_interval_selects_dump_per_write() {
        let config: ServerConfig =
            toml::from_str("store_interval_secs = 0\nstore_file = \"/var/lib/tally.json\"")
                .unwrap();
        assert_eq!(
            config.backend(),
            StorageBackend::File {
                path: PathBuf::from("/var/lib/tally.json")
            }
        );
    }

    #[test]
    fn dsn_wins_over_file_settings() {
        let mut config: ServerConfig = toml::from_str("store_interval_secs = 0").unwrap();
        let env = HashMap::from([
            ("DATABASE_DSN", "postgres://localhost/tally"),
            ("RESTORE", "false"),
        ]);
        config
            .apply_env(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();
        config.validate().unwrap();

        assert!(!config.restore);
        assert_eq!(
            config.backend(),
            StorageBackend::Database {
                dsn: "postgres://localhost/tally".into()
            }
        );
    }

    #[test]
    fn malformed_env_is_an_error() {
        let mut config = ServerConfig::default();
        assert!(config
            .apply_env(|name| (name == "RESTORE").then(|| "maybe".to_string()))
            .is_err());
    }

    #[test]
    fn sample_config_parses() {
        let config: ServerConfig =
            toml::from_str(include_str!("../../../config/server.toml")).unwrap();
        assert_eq!(config.store_interval_secs, 300);
        assert!(config.key.is_none());
    }
}
