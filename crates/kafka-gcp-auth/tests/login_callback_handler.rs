use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use kafka_gcp_auth::credentials::{AccessToken, CredentialError, StubSource};
use kafka_gcp_auth::prelude::*;
use kafka_gcp_auth::{DecodedKafkaToken, HandlerState};
use serde_json::Value;
use time::OffsetDateTime;

#[derive(Debug)]
struct UnknownKindSource;

#[async_trait]
impl TokenSource for UnknownKindSource {
    async fn fetch_token(&self) -> Result<AccessToken, CredentialError> {
        Ok(AccessToken::expiring_in(
            "unused",
            OffsetDateTime::now_utc(),
            time::Duration::hours(1),
        ))
    }
}

fn configured(credentials: Credentials) -> GcpLoginCallbackHandler {
    let mut handler = GcpLoginCallbackHandler::new(credentials);
    handler
        .configure(
            &HostConfigs::new(),
            OAUTHBEARER_MECHANISM,
            &[LoginModuleEntry::required(
                "org.apache.kafka.common.security.oauthbearer.OAuthBearerLoginModule",
            )],
        )
        .expect("configure");
    handler
}

fn delivered(callbacks: &[Callback]) -> &MintedToken {
    match &callbacks[0] {
        Callback::Token(cb) => cb.token().expect("token delivered"),
        other => panic!("unexpected callback {other:?}"),
    }
}

#[tokio::test]
async fn stub_credentials_mint_kafka_token() {
    let before = OffsetDateTime::now_utc().unix_timestamp();
    let handler = configured(Credentials::new(StubSource::new(
        "fake-account@google.com",
        "fake-access-token",
    )));

    let mut callbacks = vec![Callback::Token(TokenCallback::new())];
    handler.handle(&mut callbacks).await.expect("handle");
    let token = delivered(&callbacks);

    assert_eq!(token.principal(), "fake-account@google.com");
    assert_eq!(token.scopes().iter().collect::<Vec<_>>(), vec!["kafka"]);

    let segments: Vec<&str> = token.value().split('.').collect();
    assert_eq!(segments.len(), 3);

    let header: Value = serde_json::from_slice(&URL_SAFE_NO_PAD.decode(segments[0]).unwrap()).unwrap();
    assert_eq!(header["typ"], "JWT");
    assert_eq!(header["alg"], "GOOG_OAUTH2_TOKEN");

    let signature = URL_SAFE_NO_PAD.decode(segments[2]).unwrap();
    assert_eq!(signature, b"fake-access-token");

    let decoded = DecodedKafkaToken::parse(token.value()).unwrap();
    let now = OffsetDateTime::now_utc().unix_timestamp();
    assert!(decoded.claims.exp > now);
    assert!(decoded.claims.iat >= before && decoded.claims.iat <= now);
    assert_eq!(decoded.claims.scope, "kafka");
    assert_eq!(decoded.claims.sub, "fake-account@google.com");
    assert_eq!(token.expires_at_epoch_ms() / 1000, decoded.claims.exp);
}

#[tokio::test]
async fn unknown_credential_kind_is_rejected() {
    let handler = configured(Credentials::new(UnknownKindSource));

    let mut callbacks = vec![Callback::Token(TokenCallback::new())];
    let err = handler.handle(&mut callbacks).await.unwrap_err();

    match err {
        AuthError::UnknownCredentialKind { type_name } => {
            assert!(type_name.contains("UnknownKindSource"));
        }
        other => panic!("expected UnknownCredentialKind, got {other:?}"),
    }
}

#[tokio::test]
async fn handler_lifecycle() {
    let mut handler = GcpLoginCallbackHandler::new(Credentials::new(StubSource::new(
        "fake-account@google.com",
        "fake-access-token",
    )));
    assert_eq!(handler.state(), HandlerState::Unconfigured);

    let err = handler.handle(&mut []).await.unwrap_err();
    assert!(matches!(err, AuthError::NotConfigured));

    let err = handler
        .configure(&HostConfigs::new(), "SCRAM-SHA-512", &[])
        .unwrap_err();
    assert_eq!(err.to_string(), "Unexpected SASL mechanism: SCRAM-SHA-512");
    assert_eq!(handler.state(), HandlerState::Unconfigured);

    handler
        .configure(&HostConfigs::new(), OAUTHBEARER_MECHANISM, &[])
        .unwrap();
    assert_eq!(handler.state(), HandlerState::Configured);
    handler.handle(&mut []).await.unwrap();

    handler.close();
}

#[tokio::test]
async fn every_call_mints_a_fresh_token() {
    let handler = configured(Credentials::new(StubSource::new(
        "fake-account@google.com",
        "fake-access-token",
    )));

    let mut first = vec![Callback::Token(TokenCallback::new())];
    let mut second = vec![Callback::Token(TokenCallback::new())];
    handler.handle(&mut first).await.unwrap();
    handler.handle(&mut second).await.unwrap();

    let first = delivered(&first);
    let second = delivered(&second);
    assert_eq!(first.principal(), second.principal());
    assert_eq!(first.expires_at_epoch_ms(), second.expires_at_epoch_ms());
    assert!(second.issued_at_epoch_ms() >= first.issued_at_epoch_ms());
}
