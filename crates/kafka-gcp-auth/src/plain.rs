//! SASL/PLAIN with a Google access token as the password.
//!
//! For Kafka clients that cannot run OAUTHBEARER. The username is the
//! principal e-mail and the password is a fresh Google access token.

use std::sync::LazyLock;

use regex::Regex;

use crate::credentials::{CLOUD_PLATFORM_SCOPE, Credentials};
use crate::error::AuthError;
use crate::subject::resolve_subject;

/// SASL mechanism name.
pub const PLAIN_MECHANISM: &str = "PLAIN";

const PRINCIPAL_IDENTIFIER_PREFIX: &str = "principal://iam.googleapis.com/";
const WORKLOAD_IDENTITY_POOL_SUFFIX: &str = ".svc.id.goog";

static EMAIL_ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?)*$")
        .expect("valid regex")
});

/// Checks that `email` can be used as a SASL/PLAIN username.
///
/// Full IAM principal identifiers are accepted. Bare workload identity
/// pool names are rejected: GKE returns them when the Kubernetes service
/// account is not bound to a Google service account.
///
/// # Errors
///
/// Returns [`AuthError::InvalidPrincipal`] if the value is rejected.
pub fn validate_principal_email(email: &str) -> Result<(), AuthError> {
    if email.starts_with(PRINCIPAL_IDENTIFIER_PREFIX) {
        return Ok(());
    }
    if email.ends_with(WORKLOAD_IDENTITY_POOL_SUFFIX) {
        return Err(AuthError::invalid_principal(format!(
            "{email} is a workload identity pool, not a principal; configure Kubernetes \
             service account to Google service account impersonation, see \
             https://cloud.google.com/kubernetes-engine/docs/how-to/workload-identity#kubernetes-sa-to-iam"
        )));
    }
    if !EMAIL_ADDRESS.is_match(email) {
        return Err(AuthError::invalid_principal(format!(
            "invalid email address '{email}'"
        )));
    }
    Ok(())
}

/// SASL/PLAIN client mechanism.
#[derive(Debug, Clone)]
pub struct PlainMechanism {
    credentials: Credentials,
    principal_email: String,
}

impl PlainMechanism {
    /// Builds a mechanism for explicit credentials and principal.
    ///
    /// The credentials are refreshed once to prove they work.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidPrincipal`] for an unusable principal and
    /// [`AuthError::Refresh`] if the initial refresh fails.
    pub async fn with_credentials(
        credentials: Credentials,
        principal_email: impl Into<String>,
    ) -> Result<Self, AuthError> {
        let principal_email = principal_email.into();
        validate_principal_email(&principal_email)?;
        credentials
            .refresh_if_expired()
            .await
            .map_err(|e| AuthError::refresh(e.to_string()))?;

        Ok(Self {
            credentials,
            principal_email,
        })
    }

    /// Builds a mechanism from Application Default Credentials, resolving
    /// the principal from the credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if discovery, principal resolution or the initial
    /// refresh fails.
    pub async fn from_application_default() -> Result<Self, AuthError> {
        let credentials = Credentials::application_default(&[CLOUD_PLATFORM_SCOPE]).await?;
        let principal_email = resolve_subject(&credentials).await?;
        Self::with_credentials(credentials, principal_email).await
    }

    /// Returns the mechanism name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        PLAIN_MECHANISM
    }

    /// Returns the username sent to the broker.
    #[must_use]
    pub fn principal_email(&self) -> &str {
        &self.principal_email
    }

    /// Returns the initial client response `\0<email>\0<access token>`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Refresh`] if the access token cannot be refreshed.
    pub async fn initial_response(&self) -> Result<Vec<u8>, AuthError> {
        let token = self
            .credentials
            .fresh_access_token()
            .await
            .map_err(|e| AuthError::refresh(e.to_string()))?;
        Ok(format!("\0{}\0{}", self.principal_email, token.token_value()).into_bytes())
    }

    /// Handles a server challenge. PLAIN is single-step, so the exchange is
    /// always complete and nothing further is sent.
    #[must_use]
    pub fn next(&self, _challenge: &[u8]) -> Option<Vec<u8>> {
        None
    }
}
