//! Service account impersonation through the IAM Credentials API.

use std::fmt;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use super::http::{build_client, read_json};
use super::{
    AccessToken, CredentialError, CredentialKind, Credentials, IdTokenOption, IdTokenProvider,
    TokenSource,
};

/// Default IAM Credentials API endpoint.
pub const IAM_CREDENTIALS_URL: &str = "https://iamcredentials.googleapis.com";

const DEFAULT_LIFETIME: &str = "3600s";

static EMAIL_IN_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[a-zA-Z0-9._-]+@[a-zA-Z0-9._-]+\.[a-zA-Z0-9_-]+").expect("valid regex")
});

/// Extracts the service account e-mail from an impersonation URL.
///
/// ```
/// use kafka_gcp_auth::credentials::email_from_impersonation_url;
///
/// let url = "https://iamcredentials.googleapis.com/v1/projects/-/serviceAccounts/sa@p.iam.gserviceaccount.com:generateAccessToken";
/// assert_eq!(
///     email_from_impersonation_url(url).as_deref(),
///     Some("sa@p.iam.gserviceaccount.com")
/// );
/// ```
#[must_use]
pub fn email_from_impersonation_url(url: &str) -> Option<String> {
    EMAIL_IN_URL.find(url).map(|m| m.as_str().to_string())
}

#[derive(Serialize)]
struct GenerateAccessTokenRequest<'a> {
    delegates: &'a [String],
    scope: &'a [String],
    lifetime: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateAccessTokenResponse {
    access_token: String,
    expire_time: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateIdTokenRequest<'a> {
    delegates: &'a [String],
    audience: &'a str,
    include_email: bool,
}

#[derive(Deserialize)]
struct GenerateIdTokenResponse {
    token: String,
}

/// Token source that acts as `target_principal` using `source` credentials.
pub struct ImpersonatedSource {
    source: Credentials,
    target_principal: String,
    delegates: Vec<String>,
    scopes: Vec<String>,
    base_url: String,
    client: reqwest::Client,
}

impl ImpersonatedSource {
    /// Builds an impersonation source.
    ///
    /// # Errors
    ///
    /// Returns a construction error if `target_principal` is empty.
    pub fn new(
        source: Credentials,
        target_principal: impl Into<String>,
        delegates: Vec<String>,
        scopes: &[&str],
    ) -> Result<Self, CredentialError> {
        let target_principal = target_principal.into();
        if target_principal.trim().is_empty() {
            return Err(CredentialError::construction(
                "impersonation target principal is empty",
            ));
        }
        Ok(Self {
            source,
            target_principal,
            delegates,
            scopes: scopes.iter().map(|s| (*s).to_string()).collect(),
            base_url: IAM_CREDENTIALS_URL.to_string(),
            client: build_client()?,
        })
    }

    /// Builds an impersonation source from a full `generateAccessToken` URL.
    ///
    /// # Errors
    ///
    /// Returns a construction error if the URL contains no e-mail.
    pub fn from_impersonation_url(
        source: Credentials,
        url: &str,
        delegates: Vec<String>,
        scopes: &[&str],
    ) -> Result<Self, CredentialError> {
        let target = email_from_impersonation_url(url).ok_or_else(|| {
            CredentialError::construction(format!("no service account in impersonation URL {url}"))
        })?;
        let base_url = url
            .find("/v1/")
            .map_or(IAM_CREDENTIALS_URL, |idx| &url[..idx])
            .to_string();
        Ok(Self::new(source, target, delegates, scopes)?.with_base_url(base_url))
    }

    /// Overrides the IAM Credentials API base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Returns the impersonated service account e-mail.
    #[must_use]
    pub fn target_principal(&self) -> &str {
        &self.target_principal
    }

    fn endpoint(&self, method: &str) -> String {
        format!(
            "{}/v1/projects/-/serviceAccounts/{}:{method}",
            self.base_url, self.target_principal
        )
    }

    async fn source_token(&self) -> Result<String, CredentialError> {
        Ok(self
            .source
            .fresh_access_token()
            .await?
            .token_value()
            .to_string())
    }
}

impl fmt::Debug for ImpersonatedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImpersonatedSource")
            .field("source", &self.source.type_name())
            .field("target_principal", &self.target_principal)
            .field("delegates", &self.delegates)
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TokenSource for ImpersonatedSource {
    fn kind(&self) -> CredentialKind {
        CredentialKind::Impersonated {
            target_principal: self.target_principal.clone(),
        }
    }

    async fn fetch_token(&self) -> Result<AccessToken, CredentialError> {
        let bearer = self.source_token().await?;
        let endpoint = self.endpoint("generateAccessToken");
        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(bearer)
            .json(&GenerateAccessTokenRequest {
                delegates: &self.delegates,
                scope: &self.scopes,
                lifetime: DEFAULT_LIFETIME,
            })
            .send()
            .await?;
        let body: GenerateAccessTokenResponse = read_json(&endpoint, response).await?;

        let expires_at = OffsetDateTime::parse(&body.expire_time, &Rfc3339).map_err(|e| {
            CredentialError::refresh(format!("invalid expireTime {}: {e}", body.expire_time))
        })?;

        tracing::debug!(target_principal = %self.target_principal, "Impersonated access token issued");
        Ok(AccessToken::new(body.access_token, expires_at))
    }

    fn id_token_provider(&self) -> Option<&dyn IdTokenProvider> {
        Some(self)
    }
}

#[async_trait]
impl IdTokenProvider for ImpersonatedSource {
    async fn id_token_with_audience(
        &self,
        target_audience: &str,
        options: &[IdTokenOption],
    ) -> Result<String, CredentialError> {
        let bearer = self.source_token().await?;
        let endpoint = self.endpoint("generateIdToken");
        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(bearer)
            .json(&GenerateIdTokenRequest {
                delegates: &self.delegates,
                audience: target_audience,
                include_email: options.contains(&IdTokenOption::IncludeEmail),
            })
            .send()
            .await?;
        let body: GenerateIdTokenResponse = read_json(&endpoint, response).await?;
        Ok(body.token)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::credentials::StubSource;

    const TARGET: &str = "target@my-project.iam.gserviceaccount.com";

    fn source_credentials() -> Credentials {
        Credentials::new(StubSource::new("caller@example.com", "source-token"))
    }

    #[test]
    fn test_email_from_impersonation_url() {
        let url = format!(
            "https://iamcredentials.googleapis.com/v1/projects/-/serviceAccounts/{TARGET}:generateAccessToken"
        );
        assert_eq!(email_from_impersonation_url(&url).as_deref(), Some(TARGET));
        assert!(email_from_impersonation_url("https://example.com/no-email").is_none());
    }

    #[test]
    fn test_from_impersonation_url_keeps_host() {
        let source = ImpersonatedSource::from_impersonation_url(
            source_credentials(),
            &format!("http://localhost:9999/v1/projects/-/serviceAccounts/{TARGET}:generateAccessToken"),
            vec![],
            &[],
        )
        .unwrap();
        assert_eq!(source.target_principal(), TARGET);
        assert_eq!(
            source.endpoint("generateIdToken"),
            format!("http://localhost:9999/v1/projects/-/serviceAccounts/{TARGET}:generateIdToken")
        );
    }

    #[test]
    fn test_empty_target_is_rejected() {
        let err = ImpersonatedSource::new(source_credentials(), " ", vec![], &[]).unwrap_err();
        assert!(err.is_construction_error());
    }

    #[tokio::test]
    async fn test_generate_access_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/v1/projects/-/serviceAccounts/{TARGET}:generateAccessToken")))
            .and(header("authorization", "Bearer source-token"))
            .and(body_partial_json(json!({"lifetime": "3600s"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "accessToken": "ya29.impersonated",
                "expireTime": "2030-01-01T00:00:00Z"
            })))
            .mount(&server)
            .await;

        let source = ImpersonatedSource::new(source_credentials(), TARGET, vec![], &["scope-a"])
            .unwrap()
            .with_base_url(server.uri());
        assert_eq!(
            source.kind(),
            CredentialKind::Impersonated {
                target_principal: TARGET.into()
            }
        );

        let token = source.fetch_token().await.unwrap();
        assert_eq!(token.token_value(), "ya29.impersonated");
        assert_eq!(token.expires_at_epoch_seconds(), 1_893_456_000);
    }

    #[tokio::test]
    async fn test_generate_id_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/v1/projects/-/serviceAccounts/{TARGET}:generateIdToken")))
            .and(body_partial_json(json!({"audience": "aud", "includeEmail": true})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "h.p.s"})))
            .mount(&server)
            .await;

        let source = ImpersonatedSource::new(source_credentials(), TARGET, vec![], &[])
            .unwrap()
            .with_base_url(server.uri());
        let token = source
            .id_token_with_audience("aud", &[IdTokenOption::IncludeEmail])
            .await
            .unwrap();
        assert_eq!(token, "h.p.s");
    }
}
