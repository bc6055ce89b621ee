//! Google credentials.
//!
//! This module provides:
//!
//! - The [`Credentials`] handle shared by every token-producing component
//! - The [`TokenSource`] trait implemented by each credential kind
//! - Concrete sources for service accounts, authorized users, the compute
//!   metadata server, impersonation and workload identity federation
//! - Application Default Credentials discovery
//!
//! Callers always call [`Credentials::refresh_if_expired`] before reading
//! the access token; there is no background refresh.

pub mod adc;
pub mod error;
pub mod external_account;
mod http;
pub mod impersonated;
pub mod metadata;
pub mod service_account;
pub mod stub;
pub mod token;
pub mod user;

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use time::{Duration, OffsetDateTime};

pub use adc::{
    CLOUD_PLATFORM_SCOPE, CredentialsFile, credentials_from_file, credentials_from_json,
    find_default_credentials,
};
pub use error::CredentialError;
pub use external_account::{ExternalAccountConfig, ExternalAccountSource, SubjectTokenSource};
pub use impersonated::{ImpersonatedSource, email_from_impersonation_url};
pub use metadata::ComputeEngineSource;
pub use service_account::{ServiceAccountKey, ServiceAccountSource};
pub use stub::StubSource;
pub use token::AccessToken;
pub use user::{AuthorizedUserConfig, AuthorizedUserSource};

/// A cached token is refreshed once it is this close to expiry.
pub const EXPIRATION_MARGIN: Duration = Duration::minutes(3);

/// The closed set of credential kinds a principal can be read from.
///
/// Each variant carries the field the subject resolver extracts for it.
/// Sources that can only prove their identity through an identity token
/// report [`CredentialKind::Other`] and expose an [`IdTokenProvider`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialKind {
    /// Compute metadata server credentials bound to a service account.
    ComputeEngine {
        /// The bound service account e-mail.
        account: String,
    },
    /// Service account key credentials.
    ServiceAccount {
        /// The `client_email` of the key.
        client_email: String,
    },
    /// Workload identity federation credentials.
    ExternalAccount {
        /// The impersonated service account, if impersonation is configured.
        service_account_email: Option<String>,
    },
    /// Service account impersonation credentials.
    Impersonated {
        /// The impersonation target.
        target_principal: String,
    },
    /// Fixed test credentials.
    Stub {
        /// The exposed account.
        account: String,
    },
    /// Anything else.
    Other,
}

impl CredentialKind {
    /// Returns a short name for logging.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ComputeEngine { .. } => "compute_engine",
            Self::ServiceAccount { .. } => "service_account",
            Self::ExternalAccount { .. } => "external_account",
            Self::Impersonated { .. } => "impersonated",
            Self::Stub { .. } => "stub",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options for identity token requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdTokenOption {
    /// Include project and instance details (compute only).
    FormatFull,
    /// Include license codes (compute only, requires `FormatFull`).
    IncludeLicenses,
    /// Include the `email` and `email_verified` claims.
    IncludeEmail,
}

/// A credential that can produce signed identity tokens.
#[async_trait]
pub trait IdTokenProvider: Send + Sync {
    /// Requests an identity token for `target_audience`.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider call fails.
    async fn id_token_with_audience(
        &self,
        target_audience: &str,
        options: &[IdTokenOption],
    ) -> Result<String, CredentialError>;
}

/// A source of upstream access tokens.
///
/// Implementations perform the network call; caching and the refresh
/// policy live in [`Credentials`].
#[async_trait]
pub trait TokenSource: fmt::Debug + Send + Sync {
    /// Returns the credential kind used for principal resolution.
    fn kind(&self) -> CredentialKind {
        CredentialKind::Other
    }

    /// Fetches a fresh access token.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity provider rejects the request or
    /// cannot be reached.
    async fn fetch_token(&self) -> Result<AccessToken, CredentialError>;

    /// Returns the identity token capability, if this source has one.
    fn id_token_provider(&self) -> Option<&dyn IdTokenProvider> {
        None
    }
}

/// Shared handle to a credential and its current access token.
///
/// Cloning is cheap; clones share the cached token.
#[derive(Clone)]
pub struct Credentials {
    inner: Arc<CredentialsInner>,
}

struct CredentialsInner {
    source: Box<dyn TokenSource>,
    type_name: &'static str,
    token: RwLock<Option<AccessToken>>,
    refresh_lock: tokio::sync::Mutex<()>,
}

impl Credentials {
    /// Wraps a token source.
    #[must_use]
    pub fn new<S: TokenSource + 'static>(source: S) -> Self {
        Self {
            inner: Arc::new(CredentialsInner {
                source: Box::new(source),
                type_name: std::any::type_name::<S>(),
                token: RwLock::new(None),
                refresh_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Discovers Application Default Credentials.
    ///
    /// An empty `scopes` slice requests [`CLOUD_PLATFORM_SCOPE`].
    ///
    /// # Errors
    ///
    /// Returns a construction error if no usable credentials are found.
    pub async fn application_default(scopes: &[&str]) -> Result<Self, CredentialError> {
        find_default_credentials(scopes).await
    }

    /// Returns the credential kind.
    #[must_use]
    pub fn kind(&self) -> CredentialKind {
        self.inner.source.kind()
    }

    /// Returns the concrete type name of the underlying source.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.inner.type_name
    }

    /// Returns the identity token capability of the underlying source.
    #[must_use]
    pub fn id_token_provider(&self) -> Option<&dyn IdTokenProvider> {
        self.inner.source.id_token_provider()
    }

    /// Returns the current access token, if one has been fetched.
    #[must_use]
    pub fn access_token(&self) -> Option<AccessToken> {
        self.inner
            .token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Refreshes the access token unless the cached one is still valid.
    ///
    /// A token is valid while it has more than [`EXPIRATION_MARGIN`] left.
    /// Concurrent callers wait for a single refresh.
    ///
    /// # Errors
    ///
    /// Returns an error if the token source fails.
    pub async fn refresh_if_expired(&self) -> Result<(), CredentialError> {
        if self.has_valid_token() {
            return Ok(());
        }

        let _guard = self.inner.refresh_lock.lock().await;
        if self.has_valid_token() {
            return Ok(());
        }
        self.fetch_and_store().await
    }

    /// Unconditionally fetches a new access token.
    ///
    /// # Errors
    ///
    /// Returns an error if the token source fails.
    pub async fn refresh(&self) -> Result<(), CredentialError> {
        let _guard = self.inner.refresh_lock.lock().await;
        self.fetch_and_store().await
    }

    /// Refreshes if needed and returns the current access token.
    ///
    /// # Errors
    ///
    /// Returns an error if the refresh fails.
    pub async fn fresh_access_token(&self) -> Result<AccessToken, CredentialError> {
        self.refresh_if_expired().await?;
        self.access_token()
            .ok_or_else(|| CredentialError::refresh("no access token after refresh"))
    }

    fn has_valid_token(&self) -> bool {
        self.inner
            .token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|t| !t.expires_within(EXPIRATION_MARGIN, OffsetDateTime::now_utc()))
    }

    async fn fetch_and_store(&self) -> Result<(), CredentialError> {
        let token = self.inner.source.fetch_token().await.inspect_err(|e| {
            tracing::debug!(credential = self.type_name(), error = %e, "Access token refresh failed");
        })?;

        tracing::debug!(
            credential = self.type_name(),
            kind = %self.kind(),
            expires_at = %token.expires_at(),
            "Refreshed access token"
        );

        *self
            .inner
            .token
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(token);
        Ok(())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("type_name", &self.inner.type_name)
            .field("source", &self.inner.source)
            .finish_non_exhaustive()
    }
}
