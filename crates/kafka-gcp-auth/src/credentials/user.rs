//! Authorized user credentials (`gcloud auth application-default login`).

use std::fmt;

use async_trait::async_trait;
use serde::Deserialize;
use time::OffsetDateTime;

use super::http::{GOOGLE_TOKEN_URI, OAuthTokenResponse, build_client, read_json};
use super::{AccessToken, CredentialError, IdTokenOption, IdTokenProvider, TokenSource};

/// An authorized user file (`"type": "authorized_user"`).
#[derive(Clone, Deserialize)]
pub struct AuthorizedUserConfig {
    /// OAuth client id.
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: String,
    /// Long-lived refresh token.
    pub refresh_token: String,
    /// Project billed for quota.
    #[serde(default)]
    pub quota_project_id: Option<String>,
    /// Token endpoint; defaults to Google's.
    #[serde(default)]
    pub token_uri: Option<String>,
}

impl fmt::Debug for AuthorizedUserConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizedUserConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("quota_project_id", &self.quota_project_id)
            .finish_non_exhaustive()
    }
}

/// Token source backed by a user refresh token.
///
/// User credentials carry no principal of their own; the e-mail is read
/// from the identity token returned alongside the access token.
pub struct AuthorizedUserSource {
    config: AuthorizedUserConfig,
    token_uri: String,
    client: reqwest::Client,
}

impl AuthorizedUserSource {
    /// Builds a source from a parsed authorized user file.
    ///
    /// # Errors
    ///
    /// Returns a construction error if the refresh token is missing.
    pub fn new(config: AuthorizedUserConfig) -> Result<Self, CredentialError> {
        if config.refresh_token.is_empty() {
            return Err(CredentialError::construction(
                "authorized user file has no refresh_token",
            ));
        }
        let token_uri = config
            .token_uri
            .clone()
            .unwrap_or_else(|| GOOGLE_TOKEN_URI.to_string());
        Ok(Self {
            config,
            token_uri,
            client: build_client()?,
        })
    }

    async fn refresh_grant(&self) -> Result<OAuthTokenResponse, CredentialError> {
        let response = self
            .client
            .post(&self.token_uri)
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("refresh_token", self.config.refresh_token.as_str()),
            ])
            .send()
            .await?;
        read_json(&self.token_uri, response).await
    }
}

impl fmt::Debug for AuthorizedUserSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizedUserSource")
            .field("config", &self.config)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TokenSource for AuthorizedUserSource {
    async fn fetch_token(&self) -> Result<AccessToken, CredentialError> {
        let now = OffsetDateTime::now_utc();
        self.refresh_grant().await?.into_access_token(now)
    }

    fn id_token_provider(&self) -> Option<&dyn IdTokenProvider> {
        Some(self)
    }
}

#[async_trait]
impl IdTokenProvider for AuthorizedUserSource {
    async fn id_token_with_audience(
        &self,
        _target_audience: &str,
        _options: &[IdTokenOption],
    ) -> Result<String, CredentialError> {
        self.refresh_grant()
            .await?
            .id_token
            .ok_or_else(|| CredentialError::refresh("refresh response has no id_token"))
    }
}
