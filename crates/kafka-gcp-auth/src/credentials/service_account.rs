//! Service account key credentials.
//!
//! Tokens are obtained with the JWT bearer grant (RFC 7523): a short-lived
//! assertion signed with the key's RSA private key is exchanged at the
//! key's `token_uri`.

use std::fmt;

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use super::http::{GOOGLE_TOKEN_URI, OAuthTokenResponse, build_client, read_json};
use super::{AccessToken, CredentialError, CredentialKind, IdTokenOption, IdTokenProvider, TokenSource};

/// OAuth grant type for JWT bearer assertions.
pub const JWT_BEARER_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

const ASSERTION_LIFETIME: Duration = Duration::hours(1);

/// A service account key file (`"type": "service_account"`).
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    /// Service account e-mail.
    pub client_email: String,
    /// PEM encoded PKCS#8 RSA private key.
    pub private_key: String,
    /// Key identifier, sent as the JWT `kid`.
    #[serde(default)]
    pub private_key_id: Option<String>,
    /// OAuth client id of the service account.
    #[serde(default)]
    pub client_id: Option<String>,
    /// Owning project.
    #[serde(default)]
    pub project_id: Option<String>,
    /// Token endpoint; defaults to Google's.
    #[serde(default)]
    pub token_uri: Option<String>,
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .field("private_key_id", &self.private_key_id)
            .field("project_id", &self.project_id)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    target_audience: Option<&'a str>,
}

/// Token source backed by a service account key.
pub struct ServiceAccountSource {
    client_email: String,
    private_key_id: Option<String>,
    token_uri: String,
    scopes: Vec<String>,
    encoding_key: EncodingKey,
    client: reqwest::Client,
}

impl ServiceAccountSource {
    /// Builds a source from a parsed key.
    ///
    /// # Errors
    ///
    /// Returns a construction error if the private key is not a valid RSA
    /// PEM key.
    pub fn new(key: ServiceAccountKey, scopes: &[&str]) -> Result<Self, CredentialError> {
        if key.client_email.trim().is_empty() {
            return Err(CredentialError::construction(
                "service account key has no client_email",
            ));
        }
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| CredentialError::construction(format!("invalid private key: {e}")))?;

        Ok(Self {
            client_email: key.client_email,
            private_key_id: key.private_key_id,
            token_uri: key.token_uri.unwrap_or_else(|| GOOGLE_TOKEN_URI.to_string()),
            scopes: scopes.iter().map(|s| (*s).to_string()).collect(),
            encoding_key,
            client: build_client()?,
        })
    }

    /// Parses a key file body and builds a source.
    ///
    /// # Errors
    ///
    /// Returns a construction error if the JSON or the key is invalid.
    pub fn from_json(json: &str, scopes: &[&str]) -> Result<Self, CredentialError> {
        let key: ServiceAccountKey = serde_json::from_str(json)
            .map_err(|e| CredentialError::construction(format!("invalid service account key: {e}")))?;
        Self::new(key, scopes)
    }

    /// Returns the service account e-mail.
    #[must_use]
    pub fn client_email(&self) -> &str {
        &self.client_email
    }

    fn sign_assertion(&self, now: OffsetDateTime, target_audience: Option<&str>) -> Result<String, CredentialError> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid.clone_from(&self.private_key_id);

        let claims = AssertionClaims {
            iss: &self.client_email,
            aud: &self.token_uri,
            iat: now.unix_timestamp(),
            exp: (now + ASSERTION_LIFETIME).unix_timestamp(),
            scope: target_audience.is_none().then(|| self.scopes.join(" ")),
            target_audience,
        };

        Ok(jsonwebtoken::encode(&header, &claims, &self.encoding_key)?)
    }

    async fn exchange(&self, assertion: String) -> Result<OAuthTokenResponse, CredentialError> {
        let response = self
            .client
            .post(&self.token_uri)
            .form(&[
                ("grant_type", JWT_BEARER_GRANT_TYPE),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await?;
        read_json(&self.token_uri, response).await
    }
}

impl fmt::Debug for ServiceAccountSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountSource")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TokenSource for ServiceAccountSource {
    fn kind(&self) -> CredentialKind {
        CredentialKind::ServiceAccount {
            client_email: self.client_email.clone(),
        }
    }

    async fn fetch_token(&self) -> Result<AccessToken, CredentialError> {
        let now = OffsetDateTime::now_utc();
        let assertion = self.sign_assertion(now, None)?;
        tracing::debug!(client_email = %self.client_email, "Exchanging service account assertion");
        self.exchange(assertion).await?.into_access_token(now)
    }

    fn id_token_provider(&self) -> Option<&dyn IdTokenProvider> {
        Some(self)
    }
}

#[async_trait]
impl IdTokenProvider for ServiceAccountSource {
    async fn id_token_with_audience(
        &self,
        target_audience: &str,
        _options: &[IdTokenOption],
    ) -> Result<String, CredentialError> {
        let assertion = self.sign_assertion(OffsetDateTime::now_utc(), Some(target_audience))?;
        self.exchange(assertion)
            .await?
            .id_token
            .ok_or_else(|| CredentialError::refresh("token response has no id_token"))
    }
}
