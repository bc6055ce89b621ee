//! Server configuration.
//!
//! Values come from an optional TOML file, overridden by environment
//! variables such as `KAFKA_GCP_AUTH__SERVER__PORT=9090`.

use std::path::PathBuf;

use config::{Config, Environment, File};
use kafka_gcp_auth::credentials::CLOUD_PLATFORM_SCOPE;
use serde::{Deserialize, Serialize};

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "KAFKA_GCP_AUTH";

/// Default config file name.
pub const DEFAULT_CONFIG_FILE: &str = "kafka-gcp-auth.toml";

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The sources could not be merged or deserialized.
    #[error("config build error: {0}")]
    Build(#[from] config::ConfigError),

    /// A value failed validation.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub credentials: CredentialsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 14293,
        }
    }
}

impl ServerConfig {
    /// Returns `host:port`.
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Credentials used to mint tokens.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CredentialsConfig {
    /// OAuth scopes requested for the upstream access token.
    pub scopes: Vec<String>,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            scopes: vec![CLOUD_PLATFORM_SCOPE.to_string()],
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::Invalid("server.host must not be empty".into()));
        }
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server.port must be > 0".into()));
        }
        if self.credentials.scopes.iter().all(|s| s.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "credentials.scopes must contain at least one scope".into(),
            ));
        }
        let level = self.logging.level.to_ascii_lowercase();
        if !["trace", "debug", "info", "warn", "error"].contains(&level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "logging.level must be one of trace, debug, info, warn, error (got {})",
                self.logging.level
            )));
        }
        Ok(())
    }
}

/// Loads configuration from `path` (if it exists) and the environment.
///
/// # Errors
///
/// Returns an error if the sources cannot be merged or validation fails.
pub fn load_config(path: Option<&str>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder();
    let path = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_FILE));
    if path.exists() {
        builder = builder.add_source(File::from(path));
    }
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .try_parsing(true)
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("credentials.scopes"),
    );

    let merged: AppConfig = builder.build()?.try_deserialize()?;
    merged.validate()?;
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.server.addr(), "localhost:14293");
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.credentials.scopes, vec![CLOUD_PLATFORM_SCOPE.to_string()]);
        cfg.validate().unwrap();
    }

    #[test]
    fn test_validation() {
        let mut cfg = AppConfig::default();
        cfg.server.port = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = AppConfig::default();
        cfg.logging.level = "loud".into();
        assert!(cfg.validate().unwrap_err().to_string().contains("logging.level"));

        let mut cfg = AppConfig::default();
        cfg.credentials.scopes.clear();
        assert!(cfg.validate().is_err());
    }
}
