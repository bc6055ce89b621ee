use async_trait::async_trait;
use kafka_gcp_auth::credentials::{AccessToken, CredentialError, StubSource};
use kafka_gcp_auth::prelude::*;
use serde_json::json;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug)]
struct CannotRefresh;

#[async_trait]
impl TokenSource for CannotRefresh {
    async fn fetch_token(&self) -> Result<AccessToken, CredentialError> {
        Err(CredentialError::refresh_unsupported("CannotRefresh"))
    }
}

fn registry_url() -> Url {
    Url::parse("https://psrc-123.us-central1.gcp.confluent.cloud/subjects").unwrap()
}

#[tokio::test]
async fn unsupported_credentials_fail_with_refresh_error() {
    let provider = GcpBearerAuthCredentialProvider::new(Credentials::new(CannotRefresh));
    let err = provider.bearer_token(&registry_url()).await.unwrap_err();
    assert!(matches!(err, AuthError::Refresh { .. }));
    assert!(err.is_credential_error());
}

#[tokio::test]
async fn refreshable_credentials_return_raw_token() {
    let provider = GcpBearerAuthCredentialProvider::new(Credentials::new(StubSource::new(
        "fake-account@google.com",
        "fake-access-token",
    )));
    assert_eq!(
        provider.bearer_token(&registry_url()).await.unwrap(),
        "fake-access-token"
    );
}

#[tokio::test]
async fn authorized_user_token_is_refreshed_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "ya29.user-token",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;

    let credentials = kafka_gcp_auth::credentials::credentials_from_json(
        &json!({
            "type": "authorized_user",
            "client_id": "client",
            "client_secret": "secret",
            "refresh_token": "1//refresh",
            "token_uri": format!("{}/token", server.uri())
        })
        .to_string(),
        &[],
    )
    .unwrap();
    let provider = GcpBearerAuthCredentialProvider::new(credentials);

    for _ in 0..3 {
        assert_eq!(
            provider.bearer_token(&registry_url()).await.unwrap(),
            "ya29.user-token"
        );
    }
}

#[tokio::test]
async fn configure_reads_schema_registry_options() {
    let mut provider = GcpBearerAuthCredentialProvider::new(Credentials::new(StubSource::new(
        "fake-account@google.com",
        "fake-access-token",
    )));
    let configs: HostConfigs = [
        ("bearer.auth.logical.cluster".to_string(), json!("lsrc-abc")),
        ("bearer.auth.identity.pool.id".to_string(), json!(" pool-1 ")),
        ("unrelated".to_string(), json!(3)),
    ]
    .into_iter()
    .collect();

    provider.configure(&configs).unwrap();
    assert_eq!(provider.alias(), "GCP");
    assert_eq!(provider.target_schema_registry(), Some("lsrc-abc"));
    assert_eq!(provider.target_identity_pool_id(), Some("pool-1"));
}
