//! Fixed credentials for tests and local development.

use async_trait::async_trait;
use time::{Duration, OffsetDateTime};

use super::{AccessToken, CredentialError, CredentialKind, TokenSource};

/// A source that always returns the same token for the same account.
///
/// Every fetch yields a token valid for one hour from the time of the call.
#[derive(Debug, Clone)]
pub struct StubSource {
    account: String,
    token_value: String,
    lifetime: Duration,
}

impl StubSource {
    /// Creates a stub for `account` returning `token_value`.
    #[must_use]
    pub fn new(account: impl Into<String>, token_value: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            token_value: token_value.into(),
            lifetime: Duration::hours(1),
        }
    }

    /// Overrides the token lifetime.
    #[must_use]
    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }
}

#[async_trait]
impl TokenSource for StubSource {
    fn kind(&self) -> CredentialKind {
        CredentialKind::Stub {
            account: self.account.clone(),
        }
    }

    async fn fetch_token(&self) -> Result<AccessToken, CredentialError> {
        Ok(AccessToken::expiring_in(
            self.token_value.clone(),
            OffsetDateTime::now_utc(),
            self.lifetime,
        ))
    }
}
