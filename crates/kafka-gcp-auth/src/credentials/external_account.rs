//! Workload identity federation credentials (`"type": "external_account"`).
//!
//! A third-party subject token is read from a file or a URL and exchanged
//! at the Security Token Service (RFC 8693). When the configuration names a
//! service account impersonation URL, the federated token is then used to
//! impersonate that service account.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;
use time::OffsetDateTime;

use super::http::{OAuthTokenResponse, build_client, read_json, read_text};
use super::impersonated::{ImpersonatedSource, email_from_impersonation_url};
use super::{AccessToken, CredentialError, CredentialKind, Credentials, TokenSource};

/// Default Security Token Service endpoint.
pub const STS_TOKEN_URL: &str = "https://sts.googleapis.com/v1/token";

/// OAuth grant type for RFC 8693 token exchange.
pub const TOKEN_EXCHANGE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:token-exchange";

/// Requested token type for the exchange.
pub const ACCESS_TOKEN_TYPE: &str = "urn:ietf:params:oauth:token-type:access_token";

/// Scope requested from STS when the result is only used to impersonate.
pub const IAM_SCOPE: &str = "https://www.googleapis.com/auth/iam";

/// An external account file as written by `gcloud iam workload-identity-pools
/// create-cred-config`.
#[derive(Debug, Clone, Deserialize)]
pub struct ExternalAccountConfig {
    /// Workload identity pool provider audience.
    pub audience: String,
    /// Type of the third-party subject token.
    pub subject_token_type: String,
    /// STS endpoint; defaults to Google's.
    #[serde(default)]
    pub token_url: Option<String>,
    /// Optional service account impersonation URL.
    #[serde(default)]
    pub service_account_impersonation_url: Option<String>,
    /// Where the subject token comes from.
    pub credential_source: CredentialSourceConfig,
    /// Optional client id for STS basic authentication.
    #[serde(default)]
    pub client_id: Option<String>,
    /// Optional client secret for STS basic authentication.
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Workforce pool user project.
    #[serde(default)]
    pub workforce_pool_user_project: Option<String>,
}

/// The raw `credential_source` object.
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialSourceConfig {
    /// Path of a file holding the subject token.
    #[serde(default)]
    pub file: Option<PathBuf>,
    /// URL serving the subject token.
    #[serde(default)]
    pub url: Option<String>,
    /// Headers sent with the URL request.
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Subject token format.
    #[serde(default)]
    pub format: Option<SubjectTokenFormat>,
    /// Executable-sourced tokens (unsupported).
    #[serde(default)]
    pub executable: Option<serde_json::Value>,
    /// AWS environment marker (unsupported).
    #[serde(default)]
    pub environment_id: Option<String>,
}

/// How to read a subject token out of its container.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SubjectTokenFormat {
    /// The whole body is the token.
    Text,
    /// The token is a string field of a JSON object.
    Json {
        /// Name of the field holding the token.
        subject_token_field_name: String,
    },
}

impl SubjectTokenFormat {
    fn extract(&self, body: &str) -> Result<String, CredentialError> {
        let token = match self {
            Self::Text => body.trim().to_string(),
            Self::Json {
                subject_token_field_name,
            } => {
                let value: serde_json::Value = serde_json::from_str(body)?;
                value
                    .get(subject_token_field_name)
                    .and_then(serde_json::Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| {
                        CredentialError::refresh(format!(
                            "subject token field {subject_token_field_name} is missing"
                        ))
                    })?
            }
        };
        if token.is_empty() {
            return Err(CredentialError::refresh("subject token is empty"));
        }
        Ok(token)
    }
}

/// Where the subject token is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectTokenSource {
    /// A local file, re-read on every refresh.
    File {
        /// File path.
        path: PathBuf,
        /// Body format.
        format: SubjectTokenFormat,
    },
    /// An HTTP endpoint.
    Url {
        /// Endpoint URL.
        url: String,
        /// Extra request headers.
        headers: HashMap<String, String>,
        /// Body format.
        format: SubjectTokenFormat,
    },
}

impl TryFrom<CredentialSourceConfig> for SubjectTokenSource {
    type Error = CredentialError;

    fn try_from(config: CredentialSourceConfig) -> Result<Self, Self::Error> {
        if config.executable.is_some() {
            return Err(CredentialError::construction(
                "executable-sourced external account credentials are not supported",
            ));
        }
        if config.environment_id.is_some() {
            return Err(CredentialError::construction(
                "AWS external account credentials are not supported",
            ));
        }

        let format = config.format.unwrap_or(SubjectTokenFormat::Text);
        match (config.file, config.url) {
            (Some(path), None) => Ok(Self::File { path, format }),
            (None, Some(url)) => Ok(Self::Url {
                url,
                headers: config.headers,
                format,
            }),
            _ => Err(CredentialError::construction(
                "credential_source must set exactly one of file or url",
            )),
        }
    }
}

struct StsExchange {
    audience: String,
    subject_token_type: String,
    token_url: String,
    subject: SubjectTokenSource,
    client_id: Option<String>,
    client_secret: Option<String>,
    workforce_pool_user_project: Option<String>,
    scope: String,
    client: reqwest::Client,
}

impl fmt::Debug for StsExchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StsExchange")
            .field("audience", &self.audience)
            .field("token_url", &self.token_url)
            .field("subject", &self.subject)
            .field("client_id", &self.client_id)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl StsExchange {
    async fn subject_token(&self) -> Result<String, CredentialError> {
        match &self.subject {
            SubjectTokenSource::File { path, format } => {
                let body = tokio::fs::read_to_string(path).await?;
                format.extract(&body)
            }
            SubjectTokenSource::Url {
                url,
                headers,
                format,
            } => {
                let mut request = self.client.get(url);
                for (name, value) in headers {
                    request = request.header(name.as_str(), value.as_str());
                }
                let body = read_text(url, request.send().await?).await?;
                format.extract(&body)
            }
        }
    }
}

#[async_trait]
impl TokenSource for StsExchange {
    async fn fetch_token(&self) -> Result<AccessToken, CredentialError> {
        let now = OffsetDateTime::now_utc();
        let subject_token = self.subject_token().await?;

        let mut form = vec![
            ("grant_type", TOKEN_EXCHANGE_GRANT_TYPE.to_string()),
            ("audience", self.audience.clone()),
            ("scope", self.scope.clone()),
            ("requested_token_type", ACCESS_TOKEN_TYPE.to_string()),
            ("subject_token", subject_token),
            ("subject_token_type", self.subject_token_type.clone()),
        ];
        if self.client_id.is_none()
            && let Some(project) = &self.workforce_pool_user_project
        {
            form.push((
                "options",
                serde_json::json!({ "userProject": project }).to_string(),
            ));
        }

        let mut request = self.client.post(&self.token_url).form(&form);
        if let Some(client_id) = &self.client_id {
            request = request.basic_auth(client_id, self.client_secret.as_deref());
        }

        let response: OAuthTokenResponse = read_json(&self.token_url, request.send().await?).await?;
        tracing::debug!(audience = %self.audience, "Exchanged subject token at STS");
        response.into_access_token(now)
    }
}

enum Exchange {
    Direct(StsExchange),
    Impersonated(ImpersonatedSource),
}

/// Token source for workload identity federation.
pub struct ExternalAccountSource {
    service_account_email: Option<String>,
    exchange: Exchange,
}

impl ExternalAccountSource {
    /// Builds a source from a parsed external account file.
    ///
    /// # Errors
    ///
    /// Returns a construction error for unsupported credential sources or a
    /// malformed impersonation URL.
    pub fn new(config: ExternalAccountConfig, scopes: &[&str]) -> Result<Self, CredentialError> {
        let subject = SubjectTokenSource::try_from(config.credential_source)?;
        let impersonation_url = config
            .service_account_impersonation_url
            .filter(|u| !u.trim().is_empty());

        let sts = StsExchange {
            audience: config.audience,
            subject_token_type: config.subject_token_type,
            token_url: config.token_url.unwrap_or_else(|| STS_TOKEN_URL.to_string()),
            subject,
            client_id: config.client_id,
            client_secret: config.client_secret,
            workforce_pool_user_project: config.workforce_pool_user_project,
            scope: if impersonation_url.is_some() {
                IAM_SCOPE.to_string()
            } else {
                scopes.join(" ")
            },
            client: build_client()?,
        };

        let Some(url) = impersonation_url else {
            return Ok(Self {
                service_account_email: None,
                exchange: Exchange::Direct(sts),
            });
        };

        let impersonated =
            ImpersonatedSource::from_impersonation_url(Credentials::new(sts), &url, Vec::new(), scopes)?;
        Ok(Self {
            service_account_email: email_from_impersonation_url(&url),
            exchange: Exchange::Impersonated(impersonated),
        })
    }

    /// Returns the impersonated service account e-mail, if any.
    #[must_use]
    pub fn service_account_email(&self) -> Option<&str> {
        self.service_account_email.as_deref()
    }
}

impl fmt::Debug for ExternalAccountSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("ExternalAccountSource");
        s.field("service_account_email", &self.service_account_email);
        match &self.exchange {
            Exchange::Direct(sts) => s.field("sts", sts),
            Exchange::Impersonated(imp) => s.field("impersonated", imp),
        };
        s.finish()
    }
}

#[async_trait]
impl TokenSource for ExternalAccountSource {
    fn kind(&self) -> CredentialKind {
        CredentialKind::ExternalAccount {
            service_account_email: self.service_account_email.clone(),
        }
    }

    async fn fetch_token(&self) -> Result<AccessToken, CredentialError> {
        match &self.exchange {
            Exchange::Direct(sts) => sts.fetch_token().await,
            Exchange::Impersonated(imp) => imp.fetch_token().await,
        }
    }
}
