//! Kafka SASL/OAUTHBEARER login callback handler.
//!
//! The Kafka client drives the handler in two steps: `configure` once with
//! the SASL mechanism and JAAS login entries, then `handle` whenever it needs
//! a token. Each token callback gets a freshly minted token; nothing is
//! cached between calls apart from the upstream access token held by
//! [`Credentials`].

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use async_trait::async_trait;

use crate::config::HostConfigs;
use crate::credentials::{CLOUD_PLATFORM_SCOPE, Credentials};
use crate::error::AuthError;
use crate::subject::resolve_subject;
use crate::token::{MintedToken, mint};

/// The only SASL mechanism the handler accepts.
pub const OAUTHBEARER_MECHANISM: &str = "OAUTHBEARER";

// ============================================================================
// Host Types
// ============================================================================

/// JAAS login module control flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControlFlag {
    /// The module must succeed.
    #[default]
    Required,
    /// The module must succeed; failure stops the chain.
    Requisite,
    /// Success is enough; failure continues the chain.
    Sufficient,
    /// The module is not required to succeed.
    Optional,
}

/// One entry of the JAAS login configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginModuleEntry {
    /// Fully qualified login module name.
    pub login_module_name: String,
    /// Control flag.
    pub control_flag: ControlFlag,
    /// Module options.
    pub options: HashMap<String, String>,
}

impl LoginModuleEntry {
    /// Creates a `Required` entry without options.
    #[must_use]
    pub fn required(login_module_name: impl Into<String>) -> Self {
        Self {
            login_module_name: login_module_name.into(),
            control_flag: ControlFlag::Required,
            options: HashMap::new(),
        }
    }
}

/// Receives a minted OAUTHBEARER token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenCallback {
    token: Option<MintedToken>,
}

impl TokenCallback {
    /// Creates an empty callback.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the delivered token.
    #[must_use]
    pub fn token(&self) -> Option<&MintedToken> {
        self.token.as_ref()
    }

    /// Delivers a token.
    pub fn set_token(&mut self, token: MintedToken) {
        self.token = Some(token);
    }
}

/// Requests SASL extensions. Not supported by this handler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaslExtensionsCallback {
    /// Extensions to send with the initial client response.
    pub extensions: BTreeMap<String, String>,
}

/// A callback presented by the Kafka client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Callback {
    /// Token request.
    Token(TokenCallback),
    /// SASL extensions request.
    SaslExtensions(SaslExtensionsCallback),
}

impl Callback {
    /// Returns the callback name used in diagnostics.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Token(_) => "OAuthBearerTokenCallback",
            Self::SaslExtensions(_) => "SaslExtensionsCallback",
        }
    }
}

// ============================================================================
// Handler
// ============================================================================

/// A SASL login callback handler.
#[async_trait]
pub trait AuthenticateCallbackHandler: Send + Sync {
    /// Configures the handler for `sasl_mechanism`.
    fn configure(
        &mut self,
        configs: &HostConfigs,
        sasl_mechanism: &str,
        login_entries: &[LoginModuleEntry],
    ) -> Result<(), AuthError>;

    /// Fills in each callback in order.
    async fn handle(&self, callbacks: &mut [Callback]) -> Result<(), AuthError>;

    /// Releases resources held by the handler.
    fn close(&mut self);
}

/// Configuration state of a [`GcpLoginCallbackHandler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState {
    /// `configure` has not succeeded yet.
    Unconfigured,
    /// Ready to mint tokens. Never left once entered.
    Configured,
}

/// OAUTHBEARER login callback handler backed by Google credentials.
pub struct GcpLoginCallbackHandler {
    credentials: Credentials,
    state: HandlerState,
}

impl GcpLoginCallbackHandler {
    /// Creates an unconfigured handler for explicit credentials.
    #[must_use]
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            state: HandlerState::Unconfigured,
        }
    }

    /// Creates an unconfigured handler for Application Default Credentials.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::CredentialConstruction`] if discovery fails.
    pub async fn from_application_default() -> Result<Self, AuthError> {
        let credentials = Credentials::application_default(&[CLOUD_PLATFORM_SCOPE]).await?;
        Ok(Self::new(credentials))
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> HandlerState {
        self.state
    }

    /// Returns `true` once `configure` has succeeded.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.state == HandlerState::Configured
    }

    /// Resolves the principal, refreshes the access token and mints.
    async fn mint_token(&self) -> Result<MintedToken, AuthError> {
        let subject = resolve_subject(&self.credentials).await?;
        let access_token = self.credentials.fresh_access_token().await?;
        mint(&access_token, &subject)
    }
}

impl fmt::Debug for GcpLoginCallbackHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GcpLoginCallbackHandler")
            .field("credentials", &self.credentials.type_name())
            .field("state", &self.state)
            .finish()
    }
}

#[async_trait]
impl AuthenticateCallbackHandler for GcpLoginCallbackHandler {
    fn configure(
        &mut self,
        _configs: &HostConfigs,
        sasl_mechanism: &str,
        login_entries: &[LoginModuleEntry],
    ) -> Result<(), AuthError> {
        if sasl_mechanism != OAUTHBEARER_MECHANISM {
            tracing::warn!(mechanism = %sasl_mechanism, "Rejected SASL mechanism");
            return Err(AuthError::unsupported_mechanism(sasl_mechanism));
        }

        tracing::debug!(
            login_entries = login_entries.len(),
            credential = self.credentials.type_name(),
            "Configured OAUTHBEARER login callback handler"
        );
        self.state = HandlerState::Configured;
        Ok(())
    }

    async fn handle(&self, callbacks: &mut [Callback]) -> Result<(), AuthError> {
        if !self.is_configured() {
            return Err(AuthError::NotConfigured);
        }

        for callback in callbacks.iter_mut() {
            match callback {
                Callback::Token(token_callback) => {
                    token_callback.set_token(self.mint_token().await?);
                }
                other => {
                    tracing::warn!(callback = other.name(), "Rejected unsupported callback");
                    return Err(AuthError::unsupported_callback(other.name()));
                }
            }
        }
        Ok(())
    }

    fn close(&mut self) {}
}
