//! Compute metadata server credentials.
//!
//! Used on Compute Engine, GKE, Cloud Run and friends. The bound service
//! account e-mail is looked up once when the source is built so that
//! [`TokenSource::kind`] never performs I/O.

use std::fmt;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use time::OffsetDateTime;

use super::http::{OAuthTokenResponse, build_client, read_json, read_text};
use super::{AccessToken, CredentialError, CredentialKind, IdTokenOption, IdTokenProvider, TokenSource};

/// Environment variable overriding the metadata server host.
pub const METADATA_HOST_ENV: &str = "GCE_METADATA_HOST";

/// Default metadata server host.
pub const DEFAULT_METADATA_HOST: &str = "metadata.google.internal";

const METADATA_FLAVOR_HEADER: &str = "Metadata-Flavor";
const METADATA_FLAVOR: &str = "Google";
const SERVICE_ACCOUNT_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default";
const PROBE_TIMEOUT: StdDuration = StdDuration::from_millis(500);

/// Returns the metadata server base URL, honouring [`METADATA_HOST_ENV`].
#[must_use]
pub fn metadata_base_url() -> String {
    let host = std::env::var(METADATA_HOST_ENV)
        .ok()
        .filter(|h| !h.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_METADATA_HOST.to_string());
    format!("http://{host}")
}

/// Returns `true` if a metadata server answers at `base_url`.
pub async fn is_metadata_server_available(base_url: &str) -> bool {
    let Ok(client) = reqwest::Client::builder().timeout(PROBE_TIMEOUT).build() else {
        return false;
    };
    match client
        .get(format!("{base_url}/computeMetadata/v1/"))
        .header(METADATA_FLAVOR_HEADER, METADATA_FLAVOR)
        .send()
        .await
    {
        Ok(response) => response
            .headers()
            .get(METADATA_FLAVOR_HEADER)
            .is_some_and(|v| v == METADATA_FLAVOR),
        Err(e) => {
            tracing::debug!(error = %e, "Metadata server probe failed");
            false
        }
    }
}

/// Token source backed by the compute metadata server.
pub struct ComputeEngineSource {
    base_url: String,
    account: String,
    scopes: Vec<String>,
    client: reqwest::Client,
}

impl ComputeEngineSource {
    /// Builds a source against the default metadata server.
    ///
    /// # Errors
    ///
    /// Returns a construction error if the service account e-mail cannot be
    /// read.
    pub async fn new(scopes: &[&str]) -> Result<Self, CredentialError> {
        Self::with_base_url(metadata_base_url(), scopes).await
    }

    /// Builds a source against an explicit metadata server URL.
    ///
    /// # Errors
    ///
    /// Returns a construction error if the service account e-mail cannot be
    /// read.
    pub async fn with_base_url(
        base_url: impl Into<String>,
        scopes: &[&str],
    ) -> Result<Self, CredentialError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let client = build_client()?;

        let endpoint = format!("{base_url}{SERVICE_ACCOUNT_PATH}/email");
        let response = client
            .get(&endpoint)
            .header(METADATA_FLAVOR_HEADER, METADATA_FLAVOR)
            .send()
            .await
            .map_err(|e| CredentialError::construction(format!("metadata server unreachable: {e}")))?;
        let account = read_text(&endpoint, response)
            .await
            .map_err(|e| CredentialError::construction(format!("failed to read service account e-mail: {e}")))?
            .trim()
            .to_string();

        tracing::debug!(account = %account, "Using compute metadata credentials");

        Ok(Self {
            base_url,
            account,
            scopes: scopes.iter().map(|s| (*s).to_string()).collect(),
            client,
        })
    }

    /// Returns the bound service account e-mail.
    #[must_use]
    pub fn account(&self) -> &str {
        &self.account
    }
}

impl fmt::Debug for ComputeEngineSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputeEngineSource")
            .field("base_url", &self.base_url)
            .field("account", &self.account)
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TokenSource for ComputeEngineSource {
    fn kind(&self) -> CredentialKind {
        CredentialKind::ComputeEngine {
            account: self.account.clone(),
        }
    }

    async fn fetch_token(&self) -> Result<AccessToken, CredentialError> {
        let now = OffsetDateTime::now_utc();
        let endpoint = format!("{}{SERVICE_ACCOUNT_PATH}/token", self.base_url);
        let mut request = self
            .client
            .get(&endpoint)
            .header(METADATA_FLAVOR_HEADER, METADATA_FLAVOR);
        if !self.scopes.is_empty() {
            request = request.query(&[("scopes", self.scopes.join(","))]);
        }
        let response: OAuthTokenResponse = read_json(&endpoint, request.send().await?).await?;
        response.into_access_token(now)
    }

    fn id_token_provider(&self) -> Option<&dyn IdTokenProvider> {
        Some(self)
    }
}

#[async_trait]
impl IdTokenProvider for ComputeEngineSource {
    async fn id_token_with_audience(
        &self,
        target_audience: &str,
        options: &[IdTokenOption],
    ) -> Result<String, CredentialError> {
        let endpoint = format!("{}{SERVICE_ACCOUNT_PATH}/identity", self.base_url);
        let mut query = vec![("audience", target_audience)];
        if options.contains(&IdTokenOption::FormatFull) {
            query.push(("format", "full"));
            if options.contains(&IdTokenOption::IncludeLicenses) {
                query.push(("licenses", "TRUE"));
            }
        }

        let response = self
            .client
            .get(&endpoint)
            .header(METADATA_FLAVOR_HEADER, METADATA_FLAVOR)
            .query(&query)
            .send()
            .await?;
        Ok(read_text(&endpoint, response).await?.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    async fn mount_email(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path(format!("{SERVICE_ACCOUNT_PATH}/email")))
            .and(header("Metadata-Flavor", "Google"))
            .respond_with(ResponseTemplate::new(200).set_body_string("vm-sa@my-project.iam.gserviceaccount.com\n"))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_kind_carries_account() {
        let server = MockServer::start().await;
        mount_email(&server).await;

        let source = ComputeEngineSource::with_base_url(server.uri(), &[]).await.unwrap();
        assert_eq!(source.account(), "vm-sa@my-project.iam.gserviceaccount.com");
        assert_eq!(
            source.kind(),
            CredentialKind::ComputeEngine {
                account: "vm-sa@my-project.iam.gserviceaccount.com".into()
            }
        );
    }

    #[tokio::test]
    async fn test_fetch_token() {
        let server = MockServer::start().await;
        mount_email(&server).await;
        Mock::given(method("GET"))
            .and(path(format!("{SERVICE_ACCOUNT_PATH}/token")))
            .and(query_param("scopes", "https://www.googleapis.com/auth/cloud-platform"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "ya29.vm",
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .mount(&server)
            .await;

        let source = ComputeEngineSource::with_base_url(
            server.uri(),
            &["https://www.googleapis.com/auth/cloud-platform"],
        )
        .await
        .unwrap();
        let token = source.fetch_token().await.unwrap();
        assert_eq!(token.token_value(), "ya29.vm");
    }

    #[tokio::test]
    async fn test_identity_token_request() {
        let server = MockServer::start().await;
        mount_email(&server).await;
        Mock::given(method("GET"))
            .and(path(format!("{SERVICE_ACCOUNT_PATH}/identity")))
            .and(query_param("audience", "https://example.com"))
            .and(query_param("format", "full"))
            .respond_with(ResponseTemplate::new(200).set_body_string("h.p.s"))
            .mount(&server)
            .await;

        let source = ComputeEngineSource::with_base_url(server.uri(), &[]).await.unwrap();
        let token = source
            .id_token_with_audience(
                "https://example.com",
                &[IdTokenOption::FormatFull, IdTokenOption::IncludeEmail],
            )
            .await
            .unwrap();
        assert_eq!(token, "h.p.s");
    }

    #[tokio::test]
    async fn test_email_lookup_failure_is_construction_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = ComputeEngineSource::with_base_url(server.uri(), &[]).await.unwrap_err();
        assert!(err.is_construction_error());
    }

    #[tokio::test]
    async fn test_probe() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/computeMetadata/v1/"))
            .respond_with(ResponseTemplate::new(200).insert_header("Metadata-Flavor", "Google"))
            .mount(&server)
            .await;

        assert!(is_metadata_server_available(&server.uri()).await);
        assert!(!is_metadata_server_available("http://127.0.0.1:1").await);
    }
}
