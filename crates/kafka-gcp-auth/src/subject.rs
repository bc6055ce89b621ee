//! Principal resolution.
//!
//! Every credential kind exposes its principal differently. Resolution is
//! split into a pure classification step ([`subject_source`]), an optional
//! network step for credentials that can only prove their identity through
//! an identity token ([`fetch_identity_token`]) and a pure payload parse
//! ([`email_from_id_token`]).
//!
//! Kinds are checked in this order:
//!
//! 1. Compute metadata credentials: the bound service account
//! 2. Service account keys: `client_email`
//! 3. External accounts: the impersonated service account
//! 4. Impersonated credentials: the target principal
//! 5. Stub credentials: the exposed account
//! 6. Anything with an identity token provider: the token's `email` claim

use crate::credentials::{CredentialKind, Credentials, IdTokenOption, IdTokenProvider};
use crate::error::AuthError;
use crate::token::IdTokenPayload;

/// Audience requested for identity tokens used only to learn the e-mail.
pub const ID_TOKEN_TARGET_AUDIENCE: &str = "https://www.googleapis.com/oauth2/v4/token";

/// Where a credential's principal comes from.
pub enum SubjectSource<'a> {
    /// The principal is known without I/O.
    Principal(String),
    /// The principal must be read from an identity token.
    IdToken(&'a dyn IdTokenProvider),
}

impl std::fmt::Debug for SubjectSource<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Principal(principal) => f.debug_tuple("Principal").field(principal).finish(),
            Self::IdToken(_) => f.write_str("IdToken(..)"),
        }
    }
}

/// Classifies `credentials` without performing any I/O.
///
/// # Errors
///
/// - [`AuthError::UnknownCredentialKind`] if no strategy applies
/// - [`AuthError::MissingSubject`] if the kind is known but carries no
///   principal
pub fn subject_source(credentials: &Credentials) -> Result<SubjectSource<'_>, AuthError> {
    let principal = match credentials.kind() {
        CredentialKind::ComputeEngine { account } => Some(account),
        CredentialKind::ServiceAccount { client_email } => Some(client_email),
        CredentialKind::ExternalAccount {
            service_account_email,
        } => service_account_email,
        CredentialKind::Impersonated { target_principal } => Some(target_principal),
        CredentialKind::Stub { account } => Some(account),
        CredentialKind::Other => {
            return credentials
                .id_token_provider()
                .map(SubjectSource::IdToken)
                .ok_or_else(|| AuthError::unknown_credential_kind(credentials.type_name()));
        }
    };

    principal
        .filter(|p| !p.is_empty())
        .map(SubjectSource::Principal)
        .ok_or_else(|| AuthError::missing_subject(credentials.type_name()))
}

/// Requests a full-format identity token including the e-mail claim.
///
/// # Errors
///
/// Returns [`AuthError::Refresh`] if the provider call fails.
pub async fn fetch_identity_token(provider: &dyn IdTokenProvider) -> Result<String, AuthError> {
    provider
        .id_token_with_audience(
            ID_TOKEN_TARGET_AUDIENCE,
            &[IdTokenOption::FormatFull, IdTokenOption::IncludeEmail],
        )
        .await
        .map_err(|e| AuthError::refresh(format!("identity token request failed: {e}")))
}

/// Extracts the `email` claim from an identity token.
///
/// # Errors
///
/// Returns [`AuthError::InvalidIdToken`] if the payload cannot be read or has
/// no e-mail.
pub fn email_from_id_token(id_token: &str) -> Result<String, AuthError> {
    IdTokenPayload::parse(id_token)?
        .email
        .filter(|e| !e.is_empty())
        .ok_or_else(|| AuthError::invalid_id_token("identity token has no email claim"))
}

/// Resolves the principal for `credentials`.
///
/// The result is never cached: every call re-derives it.
///
/// # Errors
///
/// See [`subject_source`], [`fetch_identity_token`] and
/// [`email_from_id_token`].
pub async fn resolve_subject(credentials: &Credentials) -> Result<String, AuthError> {
    let subject = match subject_source(credentials)? {
        SubjectSource::Principal(principal) => principal,
        SubjectSource::IdToken(provider) => {
            let id_token = fetch_identity_token(provider).await?;
            email_from_id_token(&id_token)?
        }
    };

    tracing::debug!(
        credential = credentials.type_name(),
        kind = %credentials.kind(),
        subject = %subject,
        "Resolved principal"
    );
    Ok(subject)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};

    use super::*;
    use crate::credentials::{AccessToken, CredentialError, StubSource, TokenSource};

    #[derive(Debug)]
    struct KindOnly(CredentialKind);

    #[async_trait]
    impl TokenSource for KindOnly {
        fn kind(&self) -> CredentialKind {
            self.0.clone()
        }

        async fn fetch_token(&self) -> Result<AccessToken, CredentialError> {
            Err(CredentialError::refresh_unsupported("KindOnly"))
        }
    }

    #[derive(Debug, Default)]
    struct IdTokenUser {
        requests: Mutex<Vec<(String, Vec<IdTokenOption>)>>,
    }

    #[async_trait]
    impl TokenSource for IdTokenUser {
        async fn fetch_token(&self) -> Result<AccessToken, CredentialError> {
            Err(CredentialError::refresh_unsupported("IdTokenUser"))
        }

        fn id_token_provider(&self) -> Option<&dyn IdTokenProvider> {
            Some(self)
        }
    }

    #[async_trait]
    impl IdTokenProvider for IdTokenUser {
        async fn id_token_with_audience(
            &self,
            target_audience: &str,
            options: &[IdTokenOption],
        ) -> Result<String, CredentialError> {
            self.requests
                .lock()
                .unwrap()
                .push((target_audience.to_string(), options.to_vec()));
            let payload = serde_json::json!({"email": "human@example.com"}).to_string();
            Ok(format!("h.{}.s", URL_SAFE_NO_PAD.encode(payload)))
        }
    }

    fn creds(kind: CredentialKind) -> Credentials {
        Credentials::new(KindOnly(kind))
    }

    async fn resolve(kind: CredentialKind) -> Result<String, AuthError> {
        resolve_subject(&creds(kind)).await
    }

    #[tokio::test]
    async fn test_two_legged_kinds() {
        assert_eq!(
            resolve(CredentialKind::ComputeEngine { account: "vm@p.iam.gserviceaccount.com".into() })
                .await
                .unwrap(),
            "vm@p.iam.gserviceaccount.com"
        );
        assert_eq!(
            resolve(CredentialKind::ServiceAccount { client_email: "sa@p.iam.gserviceaccount.com".into() })
                .await
                .unwrap(),
            "sa@p.iam.gserviceaccount.com"
        );
        assert_eq!(
            resolve(CredentialKind::ExternalAccount {
                service_account_email: Some("wif@p.iam.gserviceaccount.com".into())
            })
            .await
            .unwrap(),
            "wif@p.iam.gserviceaccount.com"
        );
        assert_eq!(
            resolve(CredentialKind::Impersonated { target_principal: "target@p.iam.gserviceaccount.com".into() })
                .await
                .unwrap(),
            "target@p.iam.gserviceaccount.com"
        );
        assert_eq!(
            resolve_subject(&Credentials::new(StubSource::new("fake-account@google.com", "t")))
                .await
                .unwrap(),
            "fake-account@google.com"
        );
    }

    #[tokio::test]
    async fn test_external_account_without_impersonation() {
        let err = resolve(CredentialKind::ExternalAccount { service_account_email: None })
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::MissingSubject { .. }));
    }

    #[tokio::test]
    async fn test_empty_principal_is_missing() {
        let err = resolve(CredentialKind::Stub { account: String::new() }).await.unwrap_err();
        assert!(matches!(err, AuthError::MissingSubject { .. }));
    }

    #[tokio::test]
    async fn test_unknown_kind_carries_type_name() {
        let err = resolve(CredentialKind::Other).await.unwrap_err();
        match err {
            AuthError::UnknownCredentialKind { type_name } => assert!(type_name.ends_with("KindOnly")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_id_token_fallback() {
        let credentials = Credentials::new(IdTokenUser::default());
        assert!(matches!(
            subject_source(&credentials).unwrap(),
            SubjectSource::IdToken(_)
        ));
        assert_eq!(resolve_subject(&credentials).await.unwrap(), "human@example.com");
    }

    #[tokio::test]
    async fn test_id_token_request_parameters() {
        let user = IdTokenUser::default();
        fetch_identity_token(&user).await.unwrap();
        let requests = user.requests.lock().unwrap();
        assert_eq!(
            requests.as_slice(),
            &[(
                ID_TOKEN_TARGET_AUDIENCE.to_string(),
                vec![IdTokenOption::FormatFull, IdTokenOption::IncludeEmail]
            )]
        );
    }

    #[tokio::test]
    async fn test_resolution_is_repeatable() {
        let credentials = creds(CredentialKind::ServiceAccount { client_email: "sa@p.iam.gserviceaccount.com".into() });
        let first = resolve_subject(&credentials).await.unwrap();
        let second = resolve_subject(&credentials).await.unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_email_from_id_token() {
        let token = format!(
            "h.{}.s",
            URL_SAFE_NO_PAD.encode(r#"{"sub":"1","email":"a@b.co"}"#)
        );
        assert_eq!(email_from_id_token(&token).unwrap(), "a@b.co");

        let token = format!("h.{}.s", URL_SAFE_NO_PAD.encode(r#"{"sub":"1"}"#));
        assert!(matches!(
            email_from_id_token(&token),
            Err(AuthError::InvalidIdToken { .. })
        ));
    }
}
