use anyhow::{bail, Context};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Collector service address as `host:port`.
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,
    /// Number of concurrent delivery workers.
    #[serde(default = "default_rate_limit")]
    pub rate_limit: usize,
    /// Shared HMAC key. Requests are signed only when set.
    #[serde(default)]
    pub key: Option<String>,
    /// Path to the server's RSA public key (PEM). Bodies are encrypted only when set.
    #[serde(default)]
    pub crypto_key: Option<PathBuf>,
}

fn default_address() -> String {
    "localhost:8080".to_string()
}

fn default_poll_interval() -> u64 {
    2
}

fn default_report_interval() -> u64 {
    10
}

fn default_rate_limit() -> usize {
    1
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            poll_interval_secs: default_poll_interval(),
            report_interval_secs: default_report_interval(),
            rate_limit: default_rate_limit(),
            key: None,
            crypto_key: None,
        }
    }
}

impl AgentConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {path}"))?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Loads `path` when given, otherwise starts from defaults, then applies
    /// process environment overrides and validates.
    pub fn resolve(path: Option<&str>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Overrides fields from environment variables. Set variables win over
    /// the file.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        if let Some(v) = lookup("ADDRESS") {
            self.address = v;
        }
        if let Some(v) = lookup("POLL_INTERVAL") {
            self.poll_interval_secs = v.parse().context("POLL_INTERVAL")?;
        }
        if let Some(v) = lookup("REPORT_INTERVAL") {
            self.report_interval_secs = v.parse().context("REPORT_INTERVAL")?;
        }
        if let Some(v) = lookup("RATE_LIMIT") {
            self.rate_limit = v.parse().context("RATE_LIMIT")?;
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
        if self.poll_interval_secs == 0 {
            bail!("poll_interval_secs must be positive");
        }
        if self.report_interval_secs == 0 {
            bail!("report_interval_secs must be positive");
        }
        self.rate_limit = self.rate_limit.max(1);
        if self.key.as_deref() == Some("") {
            self.key = None;
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }
}
