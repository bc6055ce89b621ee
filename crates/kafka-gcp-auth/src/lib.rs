//! # kafka-gcp-auth
//!
//! Google Cloud authentication for Kafka clients.
//!
//! This crate provides:
//! - A SASL/OAUTHBEARER login callback handler minting Kafka tokens from
//!   Google credentials
//! - A Schema Registry bearer token provider
//! - A SASL/PLAIN mechanism using a Google access token as the password
//! - Google credential sources and Application Default Credentials discovery
//!
//! ## Overview
//!
//! The OAUTHBEARER path resolves a principal from the credentials, refreshes
//! the Google access token and wraps both into a three-segment token:
//!
//! ```text
//! base64url(header) . base64url(claims) . base64url(google access token)
//! ```
//!
//! The broker validates the embedded access token with Google; the header and
//! claims only describe it.
//!
//! ## Modules
//!
//! - [`credentials`] - Credential sources and the shared [`Credentials`] handle
//! - [`subject`] - Principal resolution per credential kind
//! - [`token`] - Token minting and identity token parsing
//! - [`callback`] - OAUTHBEARER login callback handler
//! - [`bearer`] - Schema Registry bearer token provider
//! - [`plain`] - SASL/PLAIN mechanism
//! - [`config`] - Host configuration access
//!
//! ## Example
//!
//! ```ignore
//! use kafka_gcp_auth::prelude::*;
//!
//! let mut handler = GcpLoginCallbackHandler::from_application_default().await?;
//! handler.configure(&HostConfigs::new(), OAUTHBEARER_MECHANISM, &[])?;
//!
//! let mut callbacks = vec![Callback::Token(TokenCallback::new())];
//! handler.handle(&mut callbacks).await?;
//! ```

pub mod bearer;
pub mod callback;
pub mod config;
pub mod credentials;
pub mod error;
pub mod plain;
pub mod subject;
pub mod token;

pub use bearer::{BearerAuthCredentialProvider, GCP_BEARER_AUTH_ALIAS, GcpBearerAuthCredentialProvider};
pub use callback::{
    AuthenticateCallbackHandler, Callback, ControlFlag, GcpLoginCallbackHandler, HandlerState,
    LoginModuleEntry, OAUTHBEARER_MECHANISM, SaslExtensionsCallback, TokenCallback,
};
pub use config::{ConfigReader, HostConfigs};
pub use credentials::{AccessToken, CredentialError, CredentialKind, Credentials, TokenSource};
pub use error::{AuthError, ErrorCategory};
pub use plain::{PLAIN_MECHANISM, PlainMechanism, validate_principal_email};
pub use subject::resolve_subject;
pub use token::{DecodedKafkaToken, KAFKA_SCOPE, MintedToken, mint};

/// Type alias for authentication results.
pub type AuthResult<T> = Result<T, AuthError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use kafka_gcp_auth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::bearer::{BearerAuthCredentialProvider, GcpBearerAuthCredentialProvider};
    pub use crate::callback::{
        AuthenticateCallbackHandler, Callback, GcpLoginCallbackHandler, LoginModuleEntry,
        OAUTHBEARER_MECHANISM, TokenCallback,
    };
    pub use crate::config::HostConfigs;
    pub use crate::credentials::{AccessToken, CredentialKind, Credentials, TokenSource};
    pub use crate::error::{AuthError, ErrorCategory};
    pub use crate::plain::PlainMechanism;
    pub use crate::subject::resolve_subject;
    pub use crate::token::{MintedToken, mint};
}
