use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

fn default_domain() -> String {
    "localhost".to_string()
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_audit() -> bool {
    true
}

fn default_reattach_window() -> u64 {
    5
}

fn default_grace_period_ms() -> u64 {
    30_000
}

fn default_retrieval_count() -> usize {
    10
}

/// Top-level configuration for the Courier runtime.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Domain suffix used when generating channel identifiers.
    #[serde(default = "default_domain")]
    pub domain: String,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            domain: default_domain(),
            dispatch: DispatchConfig::default(),
            session: SessionConfig::default(),
            retrieval: RetrievalConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Default per-command timeout, applied when a handler declares none.
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
    /// Persist non-transient commands and their results to the audit
    /// collections.
    #[serde(default = "default_audit")]
    pub audit: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_timeout_ms(),
            audit: default_audit(),
        }
    }
}

impl DispatchConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Accepted distance between the claimed and stored request sequence
    /// number on reattach.
    #[serde(default = "default_reattach_window")]
    pub reattach_window: u64,
    /// How long a disconnected session survives awaiting reattachment.
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reattach_window: default_reattach_window(),
            grace_period_ms: default_grace_period_ms(),
        }
    }
}

impl SessionConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalConfig {
    /// Message count returned by last-messages retrieval when neither the
    /// request nor the channel's MAX_MSG_RETRIEVAL header supplies one.
    #[serde(default = "default_retrieval_count")]
    pub default_count: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_count: default_retrieval_count(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TelemetryConfig {
    /// Log filter directive, e.g. "info" or "courier=debug".
    #[serde(default)]
    pub log_level: Option<String>,
}

impl Config {
    /// Load and validate a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.domain.is_empty() || self.domain.contains(['@', '/']) {
            bail!("domain must be a bare DNS-style name, got {:?}", self.domain);
        }
        if self.dispatch.default_timeout_ms == 0 {
            bail!("dispatch.default_timeout_ms must be positive");
        }
        if self.session.grace_period_ms == 0 {
            bail!("session.grace_period_ms must be positive");
        }
        if self.retrieval.default_count == 0 {
            bail!("retrieval.default_count must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_source_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        config.validate().unwrap();
        assert_eq!(config.domain, "localhost");
        assert_eq!(config.session.reattach_window, 5);
        assert_eq!(config.retrieval.default_count, 10);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("courier.toml");
        fs::write(&path, "domain = \"chat.example.org\"\n").unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.domain, "chat.example.org");

        assert!(Config::load(&dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let config: Config = toml::from_str("[dispatch]\ndefault_timeout_ms = 0\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_resourceful_domain() {
        let config: Config = toml::from_str("domain = \"host/resource\"").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_section_overrides() {
        let raw = r#"
            domain = "chat.example.org"

            [session]
            reattach_window = 2
            grace_period_ms = 5000
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        config.validate().unwrap();
        assert_eq!(config.domain, "chat.example.org");
        assert_eq!(config.session.reattach_window, 2);
        assert_eq!(config.session.grace_period(), Duration::from_secs(5));
    }
}
