//! Host-supplied configuration.
//!
//! Kafka and Schema Registry clients hand plugins an untyped map of
//! configuration values. [`ConfigReader`] reads the options this crate
//! understands out of that map.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::AuthError;

/// Configuration map passed in by the host client.
pub type HostConfigs = HashMap<String, Value>;

/// Logical cluster id of the target Schema Registry.
pub const BEARER_AUTH_LOGICAL_CLUSTER: &str = "bearer.auth.logical.cluster";

/// Identity pool id used by the Schema Registry.
pub const BEARER_AUTH_IDENTITY_POOL_ID: &str = "bearer.auth.identity.pool.id";

/// Typed view over [`HostConfigs`].
#[derive(Debug, Clone, Copy)]
pub struct ConfigReader<'a> {
    configs: &'a HostConfigs,
}

impl<'a> ConfigReader<'a> {
    /// Wraps a host configuration map.
    #[must_use]
    pub fn new(configs: &'a HostConfigs) -> Self {
        Self { configs }
    }

    /// Reads an optional or required string option.
    ///
    /// Values are trimmed; an empty value counts as absent.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if the value is not a string, or
    /// if `required` is set and the value is absent.
    pub fn validate_string(&self, name: &str, required: bool) -> Result<Option<String>, AuthError> {
        let value = match self.configs.get(name) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.trim()).filter(|s| !s.is_empty()).map(str::to_string),
            Some(other) => {
                return Err(AuthError::configuration(format!(
                    "{name} must be a string, got {other}"
                )));
            }
        };

        if required && value.is_none() {
            return Err(AuthError::configuration(format!("{name} is required")));
        }
        Ok(value)
    }
}
