//! Application Default Credentials discovery.
//!
//! Lookup order:
//!
//! 1. The file named by `GOOGLE_APPLICATION_CREDENTIALS`
//! 2. The gcloud well-known file (`application_default_credentials.json`)
//! 3. The compute metadata server

use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::external_account::{ExternalAccountConfig, ExternalAccountSource};
use super::impersonated::ImpersonatedSource;
use super::metadata::{ComputeEngineSource, is_metadata_server_available, metadata_base_url};
use super::service_account::{ServiceAccountKey, ServiceAccountSource};
use super::user::{AuthorizedUserConfig, AuthorizedUserSource};
use super::{CredentialError, Credentials};

/// Environment variable naming an explicit credentials file.
pub const CREDENTIALS_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";

/// Environment variable overriding the gcloud configuration directory.
pub const CLOUDSDK_CONFIG_ENV: &str = "CLOUDSDK_CONFIG";

/// Broad scope covering every Google Cloud API.
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

const WELL_KNOWN_FILE: &str = "application_default_credentials.json";

/// A credentials file, discriminated by its `type` field.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CredentialsFile {
    /// Service account key.
    ServiceAccount(ServiceAccountKey),
    /// User refresh token.
    AuthorizedUser(AuthorizedUserConfig),
    /// Workload identity federation.
    ExternalAccount(ExternalAccountConfig),
    /// Impersonation on top of another credential.
    ImpersonatedServiceAccount {
        /// Full `generateAccessToken` URL of the target.
        service_account_impersonation_url: String,
        /// The credential used to call IAM.
        source_credentials: Box<CredentialsFile>,
        /// Delegation chain.
        #[serde(default)]
        delegates: Vec<String>,
    },
}

impl CredentialsFile {
    /// Builds credentials from this file.
    ///
    /// An empty `scopes` slice requests [`CLOUD_PLATFORM_SCOPE`].
    ///
    /// # Errors
    ///
    /// Returns a construction error if the file content is unusable.
    pub fn into_credentials(self, scopes: &[&str]) -> Result<Credentials, CredentialError> {
        let scopes = effective_scopes(scopes);
        match self {
            Self::ServiceAccount(key) => Ok(Credentials::new(ServiceAccountSource::new(key, scopes)?)),
            Self::AuthorizedUser(config) => Ok(Credentials::new(AuthorizedUserSource::new(config)?)),
            Self::ExternalAccount(config) => {
                Ok(Credentials::new(ExternalAccountSource::new(config, scopes)?))
            }
            Self::ImpersonatedServiceAccount {
                service_account_impersonation_url,
                source_credentials,
                delegates,
            } => {
                if matches!(*source_credentials, Self::ImpersonatedServiceAccount { .. }) {
                    return Err(CredentialError::construction(
                        "nested impersonated credentials are not supported",
                    ));
                }
                let source = source_credentials.into_credentials(&[CLOUD_PLATFORM_SCOPE])?;
                Ok(Credentials::new(ImpersonatedSource::from_impersonation_url(
                    source,
                    &service_account_impersonation_url,
                    delegates,
                    scopes,
                )?))
            }
        }
    }
}

/// Falls back to [`CLOUD_PLATFORM_SCOPE`] when no scopes are requested.
pub(crate) fn effective_scopes<'a>(scopes: &'a [&'a str]) -> &'a [&'a str] {
    if scopes.is_empty() {
        &[CLOUD_PLATFORM_SCOPE]
    } else {
        scopes
    }
}

/// Builds credentials from the JSON body of a credentials file.
///
/// # Errors
///
/// Returns a construction error if the JSON is not a supported credentials
/// file.
pub fn credentials_from_json(json: &str, scopes: &[&str]) -> Result<Credentials, CredentialError> {
    let file: CredentialsFile = serde_json::from_str(json)
        .map_err(|e| CredentialError::construction(format!("unsupported credentials file: {e}")))?;
    file.into_credentials(scopes)
}

/// Reads and builds credentials from a credentials file on disk.
///
/// # Errors
///
/// Returns a construction error if the file cannot be read or parsed.
pub async fn credentials_from_file(path: &Path, scopes: &[&str]) -> Result<Credentials, CredentialError> {
    let json = tokio::fs::read_to_string(path).await.map_err(|e| {
        CredentialError::construction(format!("failed to read {}: {e}", path.display()))
    })?;
    credentials_from_json(&json, scopes)
}

/// Returns the gcloud well-known credentials file path.
#[must_use]
pub fn well_known_file() -> Option<PathBuf> {
    let config_dir = match std::env::var_os(CLOUDSDK_CONFIG_ENV) {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => gcloud_config_dir()?,
    };
    Some(config_dir.join(WELL_KNOWN_FILE))
}

#[cfg(windows)]
fn gcloud_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("gcloud"))
}

#[cfg(not(windows))]
fn gcloud_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|dir| dir.join(".config").join("gcloud"))
}

/// Discovers Application Default Credentials.
///
/// An empty `scopes` slice requests [`CLOUD_PLATFORM_SCOPE`].
///
/// # Errors
///
/// Returns a construction error if no source yields credentials.
pub async fn find_default_credentials(scopes: &[&str]) -> Result<Credentials, CredentialError> {
    let explicit = std::env::var_os(CREDENTIALS_ENV)
        .filter(|p| !p.is_empty())
        .map(PathBuf::from);
    discover(
        explicit,
        well_known_file(),
        &metadata_base_url(),
        effective_scopes(scopes),
    )
    .await
}

async fn discover(
    explicit: Option<PathBuf>,
    well_known: Option<PathBuf>,
    metadata_base: &str,
    scopes: &[&str],
) -> Result<Credentials, CredentialError> {
    if let Some(path) = explicit {
        tracing::debug!(path = %path.display(), "Loading credentials from {CREDENTIALS_ENV}");
        return credentials_from_file(&path, scopes).await;
    }

    if let Some(path) = well_known.filter(|p| p.is_file()) {
        tracing::debug!(path = %path.display(), "Loading gcloud application default credentials");
        return credentials_from_file(&path, scopes).await;
    }

    if is_metadata_server_available(metadata_base).await {
        tracing::debug!("Using compute metadata server credentials");
        let source = ComputeEngineSource::with_base_url(metadata_base, scopes).await?;
        return Ok(Credentials::new(source));
    }

    Err(CredentialError::construction(format!(
        "the Application Default Credentials are not available; set {CREDENTIALS_ENV} \
         or run `gcloud auth application-default login`"
    )))
}
