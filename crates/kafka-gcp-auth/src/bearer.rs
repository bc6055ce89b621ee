//! Schema Registry bearer token provider.
//!
//! Unlike the OAUTHBEARER path this hands the Google access token to the
//! Schema Registry client as is. No principal is resolved.

use async_trait::async_trait;
use url::Url;

use crate::config::{BEARER_AUTH_IDENTITY_POOL_ID, BEARER_AUTH_LOGICAL_CLUSTER, ConfigReader, HostConfigs};
use crate::credentials::{CLOUD_PLATFORM_SCOPE, Credentials};
use crate::error::AuthError;

/// Provider alias the Schema Registry client selects this provider by.
pub const GCP_BEARER_AUTH_ALIAS: &str = "GCP";

/// A bearer token source for Schema Registry clients.
#[async_trait]
pub trait BearerAuthCredentialProvider: Send + Sync {
    /// Returns the alias used for provider selection.
    fn alias(&self) -> &str;

    /// Returns the configured target Schema Registry logical cluster.
    fn target_schema_registry(&self) -> Option<&str>;

    /// Returns the configured identity pool id.
    fn target_identity_pool_id(&self) -> Option<&str>;

    /// Returns a bearer token for a request to `url`.
    async fn bearer_token(&self, url: &Url) -> Result<String, AuthError>;

    /// Applies host configuration.
    fn configure(&mut self, configs: &HostConfigs) -> Result<(), AuthError>;
}

/// Bearer token provider backed by Google credentials.
#[derive(Debug, Clone)]
pub struct GcpBearerAuthCredentialProvider {
    credentials: Credentials,
    target_schema_registry: Option<String>,
    target_identity_pool_id: Option<String>,
}

impl GcpBearerAuthCredentialProvider {
    /// Creates a provider for explicit credentials.
    #[must_use]
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            target_schema_registry: None,
            target_identity_pool_id: None,
        }
    }

    /// Creates a provider for Application Default Credentials.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::CredentialConstruction`] if discovery fails.
    pub async fn from_application_default() -> Result<Self, AuthError> {
        let credentials = Credentials::application_default(&[CLOUD_PLATFORM_SCOPE]).await?;
        Ok(Self::new(credentials))
    }

    /// Returns the underlying credentials.
    #[must_use]
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }
}

#[async_trait]
impl BearerAuthCredentialProvider for GcpBearerAuthCredentialProvider {
    fn alias(&self) -> &str {
        GCP_BEARER_AUTH_ALIAS
    }

    fn target_schema_registry(&self) -> Option<&str> {
        self.target_schema_registry.as_deref()
    }

    fn target_identity_pool_id(&self) -> Option<&str> {
        self.target_identity_pool_id.as_deref()
    }

    async fn bearer_token(&self, url: &Url) -> Result<String, AuthError> {
        let token = self.credentials.fresh_access_token().await.map_err(|e| {
            tracing::debug!(url = %url, error = %e, "Bearer token refresh failed");
            AuthError::refresh(e.to_string())
        })?;
        Ok(token.token_value().to_string())
    }

    fn configure(&mut self, configs: &HostConfigs) -> Result<(), AuthError> {
        let reader = ConfigReader::new(configs);
        self.target_schema_registry = reader.validate_string(BEARER_AUTH_LOGICAL_CLUSTER, false)?;
        self.target_identity_pool_id = reader.validate_string(BEARER_AUTH_IDENTITY_POOL_ID, false)?;
        Ok(())
    }
}
