//! HTTP plumbing shared by the token sources.

use std::time::Duration as StdDuration;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use time::{Duration, OffsetDateTime};

use super::{AccessToken, CredentialError};

/// Default Google OAuth 2.0 token endpoint.
pub(crate) const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

const REQUEST_TIMEOUT: StdDuration = StdDuration::from_secs(30);

fn default_expires_in() -> i64 {
    3600
}

/// Standard OAuth 2.0 token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct OAuthTokenResponse {
    pub access_token: Option<String>,
    #[serde(default = "default_expires_in")]
    pub expires_in: i64,
    #[serde(default)]
    pub id_token: Option<String>,
}

impl OAuthTokenResponse {
    /// Converts the response into an access token issued at `now`.
    pub fn into_access_token(self, now: OffsetDateTime) -> Result<AccessToken, CredentialError> {
        let value = self
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| CredentialError::refresh("token response has no access_token"))?;
        let expires_at = Some(self.expires_in)
            .filter(|secs| *secs >= 0)
            .and_then(|secs| now.checked_add(Duration::seconds(secs)))
            .ok_or_else(|| {
                CredentialError::refresh(format!(
                    "token response has invalid expires_in: {}",
                    self.expires_in
                ))
            })?;
        Ok(AccessToken::new(value, expires_at))
    }
}

/// Builds the HTTP client used by every source.
pub(crate) fn build_client() -> Result<reqwest::Client, CredentialError> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(CredentialError::from)
}

/// Reads a JSON body, turning non-success statuses into [`CredentialError::Http`].
pub(crate) async fn read_json<T: DeserializeOwned>(
    endpoint: &str,
    response: reqwest::Response,
) -> Result<T, CredentialError> {
    let response = check_status(endpoint, response).await?;
    let body = response.text().await?;
    Ok(serde_json::from_str(&body)?)
}

/// Reads a text body, turning non-success statuses into [`CredentialError::Http`].
pub(crate) async fn read_text(
    endpoint: &str,
    response: reqwest::Response,
) -> Result<String, CredentialError> {
    let response = check_status(endpoint, response).await?;
    Ok(response.text().await?)
}

async fn check_status(
    endpoint: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, CredentialError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    tracing::warn!(
        endpoint = %endpoint,
        status = %status,
        "Identity provider returned an error"
    );
    Err(CredentialError::http(endpoint, status.as_u16(), body))
}
