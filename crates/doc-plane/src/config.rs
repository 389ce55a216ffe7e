use serde::Deserialize;
use thiserror::Error;

use crate::ingestion::DEFAULT_CHECKPOINT_DELAY_MS;

/// Typed system configuration. Unknown keys are rejected at parse time so a
/// typo in a section or field name fails startup instead of silently running
/// on defaults.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SystemConfig {
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub ingestion: IngestionConfig,
    pub bootstrap: BootstrapConfig,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Postgres DSN, or a `sqlite:`/`sqlite://` path. Empty means SQLite at
    /// `sqlite_path`.
    pub dsn: String,
    pub sqlite_path: String,
    /// Object-storage upload endpoint. Empty means in-memory storage.
    pub upload_endpoint: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dsn: String::new(),
            sqlite_path: "docvault.sqlite".to_string(),
            upload_endpoint: String::new(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_ttl_seconds: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "change-me".to_string(),
            token_ttl_seconds: 3600,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IngestionConfig {
    pub checkpoint_delay_ms: u64,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            checkpoint_delay_ms: DEFAULT_CHECKPOINT_DELAY_MS,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BootstrapConfig {
    pub seed_on_start: bool,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            seed_on_start: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config parse error: {0}")]
    Parse(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}

impl SystemConfig {
    pub fn from_toml(input: &str) -> Result<Self, ConfigError> {
        let config: SystemConfig =
            toml::from_str(input).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.jwt_secret.trim().is_empty() {
            return Err(ConfigError::Invalid("auth.jwt_secret", "must not be empty"));
        }
        if self.auth.token_ttl_seconds <= 0 {
            return Err(ConfigError::Invalid(
                "auth.token_ttl_seconds",
                "must be positive",
            ));
        }
        if self.ingestion.checkpoint_delay_ms == 0 {
            return Err(ConfigError::Invalid(
                "ingestion.checkpoint_delay_ms",
                "must be positive",
            ));
        }
        Ok(())
    }
}
