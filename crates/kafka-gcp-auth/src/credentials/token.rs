//! Upstream OAuth access token.

use std::fmt;

use time::{Duration, OffsetDateTime};

/// An access token issued by the identity provider.
///
/// Tokens are value objects: each refresh produces a new one and the
/// previous token is simply replaced.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    token_value: String,
    expires_at: OffsetDateTime,
}

impl AccessToken {
    /// Creates a new access token.
    #[must_use]
    pub fn new(token_value: impl Into<String>, expires_at: OffsetDateTime) -> Self {
        Self {
            token_value: token_value.into(),
            expires_at,
        }
    }

    /// Creates a token that expires `expires_in` after `now`.
    #[must_use]
    pub fn expiring_in(token_value: impl Into<String>, now: OffsetDateTime, expires_in: Duration) -> Self {
        Self::new(token_value, now + expires_in)
    }

    /// Returns the raw token value.
    #[must_use]
    pub fn token_value(&self) -> &str {
        &self.token_value
    }

    /// Returns the absolute expiry instant.
    #[must_use]
    pub fn expires_at(&self) -> OffsetDateTime {
        self.expires_at
    }

    /// Returns the expiry as Unix epoch seconds.
    #[must_use]
    pub fn expires_at_epoch_seconds(&self) -> i64 {
        self.expires_at.unix_timestamp()
    }

    /// Returns the expiry as Unix epoch milliseconds.
    #[must_use]
    pub fn expires_at_epoch_millis(&self) -> i64 {
        epoch_millis(self.expires_at)
    }

    /// Returns `true` if the token expires within `margin` of `now`.
    #[must_use]
    pub fn expires_within(&self, margin: Duration, now: OffsetDateTime) -> bool {
        self.expires_at - now <= margin
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token_value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Converts an instant to Unix epoch milliseconds.
///
/// Milliseconds are floored so that `epoch_millis(t) / 1000` always equals
/// `t.unix_timestamp()`.
pub(crate) fn epoch_millis(instant: OffsetDateTime) -> i64 {
    let millis = instant.unix_timestamp_nanos().div_euclid(1_000_000);
    i64::try_from(millis).unwrap_or(i64::MAX)
}
