//! Authentication error types.
//!
//! This module defines the errors surfaced to the host runtime (Kafka client,
//! Schema Registry client or the local token server). Nothing in this crate
//! swallows an error: every failure below reaches the immediate caller.

use std::fmt;

use crate::credentials::CredentialError;

/// Errors that can occur while resolving principals and minting tokens.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Default credential discovery or credential construction failed.
    #[error("Failed to create Google credentials: {message}")]
    CredentialConstruction {
        /// Description of the construction failure.
        message: String,
    },

    /// Refreshing or fetching the upstream access token failed.
    #[error("Failed to refresh or fetch Google credentials: {message}")]
    Refresh {
        /// Description of the refresh failure.
        message: String,
    },

    /// The credential is not one of the recognized kinds.
    #[error("Unknown credentials type: {type_name}")]
    UnknownCredentialKind {
        /// Concrete type name of the presented credential.
        type_name: String,
    },

    /// The credential is recognized but does not expose a principal.
    #[error("Credentials of type {type_name} do not expose a principal")]
    MissingSubject {
        /// Concrete type name of the presented credential.
        type_name: String,
    },

    /// The identity token returned by the provider could not be parsed.
    #[error("Invalid identity token: {message}")]
    InvalidIdToken {
        /// Description of why the token is invalid.
        message: String,
    },

    /// The principal cannot be used with the requested mechanism.
    #[error("Invalid principal: {message}")]
    InvalidPrincipal {
        /// Description of why the principal was rejected.
        message: String,
    },

    /// Configuration requested a SASL mechanism other than OAUTHBEARER.
    #[error("Unexpected SASL mechanism: {mechanism}")]
    UnsupportedMechanism {
        /// The mechanism name that was requested.
        mechanism: String,
    },

    /// A token-producing operation was invoked before `configure`.
    #[error("Callback handler not configured")]
    NotConfigured,

    /// An unrecognized callback was presented to the handler.
    #[error("Unsupported callback: {callback}")]
    UnsupportedCallback {
        /// Name of the rejected callback.
        callback: String,
    },

    /// A host-supplied configuration value is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// Serializing a token segment failed.
    #[error("Failed to encode token: {message}")]
    Encoding {
        /// Description of the encoding error.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `CredentialConstruction` error.
    #[must_use]
    pub fn credential_construction(message: impl Into<String>) -> Self {
        Self::CredentialConstruction {
            message: message.into(),
        }
    }

    /// Creates a new `Refresh` error.
    #[must_use]
    pub fn refresh(message: impl Into<String>) -> Self {
        Self::Refresh {
            message: message.into(),
        }
    }

    /// Creates a new `UnknownCredentialKind` error.
    #[must_use]
    pub fn unknown_credential_kind(type_name: impl Into<String>) -> Self {
        Self::UnknownCredentialKind {
            type_name: type_name.into(),
        }
    }

    /// Creates a new `MissingSubject` error.
    #[must_use]
    pub fn missing_subject(type_name: impl Into<String>) -> Self {
        Self::MissingSubject {
            type_name: type_name.into(),
        }
    }

    /// Creates a new `InvalidIdToken` error.
    #[must_use]
    pub fn invalid_id_token(message: impl Into<String>) -> Self {
        Self::InvalidIdToken {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidPrincipal` error.
    #[must_use]
    pub fn invalid_principal(message: impl Into<String>) -> Self {
        Self::InvalidPrincipal {
            message: message.into(),
        }
    }

    /// Creates a new `UnsupportedMechanism` error.
    #[must_use]
    pub fn unsupported_mechanism(mechanism: impl Into<String>) -> Self {
        Self::UnsupportedMechanism {
            mechanism: mechanism.into(),
        }
    }

    /// Creates a new `UnsupportedCallback` error.
    #[must_use]
    pub fn unsupported_callback(callback: impl Into<String>) -> Self {
        Self::UnsupportedCallback {
            callback: callback.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Encoding` error.
    #[must_use]
    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding {
            message: message.into(),
        }
    }

    /// Returns `true` if the failure came from the credential layer.
    #[must_use]
    pub fn is_credential_error(&self) -> bool {
        matches!(
            self,
            Self::CredentialConstruction { .. } | Self::Refresh { .. }
        )
    }

    /// Returns `true` if the principal could not be determined.
    #[must_use]
    pub fn is_resolution_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownCredentialKind { .. }
                | Self::MissingSubject { .. }
                | Self::InvalidIdToken { .. }
                | Self::InvalidPrincipal { .. }
        )
    }

    /// Returns `true` if the host drove the handler incorrectly.
    #[must_use]
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedMechanism { .. } | Self::NotConfigured | Self::UnsupportedCallback { .. }
        )
    }

    /// Returns `true` if a configuration value was rejected.
    #[must_use]
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. } | Self::UnsupportedMechanism { .. }
        )
    }

    /// Returns the error category for logging purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::CredentialConstruction { .. } | Self::Refresh { .. } => ErrorCategory::Credential,
            Self::UnknownCredentialKind { .. }
            | Self::MissingSubject { .. }
            | Self::InvalidIdToken { .. }
            | Self::InvalidPrincipal { .. } => ErrorCategory::Resolution,
            Self::UnsupportedMechanism { .. }
            | Self::NotConfigured
            | Self::UnsupportedCallback { .. } => ErrorCategory::Protocol,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Encoding { .. } => ErrorCategory::Token,
        }
    }
}

impl From<CredentialError> for AuthError {
    fn from(err: CredentialError) -> Self {
        if err.is_construction_error() {
            Self::credential_construction(err.to_string())
        } else {
            Self::refresh(err.to_string())
        }
    }
}

/// Categories of errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Credential discovery or refresh.
    Credential,
    /// Principal resolution.
    Resolution,
    /// Host lifecycle or callback protocol misuse.
    Protocol,
    /// Host configuration.
    Configuration,
    /// Token assembly.
    Token,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Credential => write!(f, "credential"),
            Self::Resolution => write!(f, "resolution"),
            Self::Protocol => write!(f, "protocol"),
            Self::Configuration => write!(f, "configuration"),
            Self::Token => write!(f, "token"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AuthError::unknown_credential_kind("my_crate::Creds");
        assert_eq!(err.to_string(), "Unknown credentials type: my_crate::Creds");

        let err = AuthError::unsupported_mechanism("PLAIN");
        assert_eq!(err.to_string(), "Unexpected SASL mechanism: PLAIN");

        let err = AuthError::NotConfigured;
        assert_eq!(err.to_string(), "Callback handler not configured");

        let err = AuthError::refresh("connection reset");
        assert_eq!(
            err.to_string(),
            "Failed to refresh or fetch Google credentials: connection reset"
        );
    }

    #[test]
    fn test_error_predicates() {
        let err = AuthError::refresh("x");
        assert!(err.is_credential_error());
        assert!(!err.is_protocol_error());

        let err = AuthError::unsupported_callback("SaslExtensionsCallback");
        assert!(err.is_protocol_error());
        assert!(!err.is_credential_error());

        let err = AuthError::unsupported_mechanism("PLAIN");
        assert!(err.is_protocol_error());
        assert!(err.is_configuration_error());

        let err = AuthError::missing_subject("x");
        assert!(err.is_resolution_error());
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            AuthError::credential_construction("x").category(),
            ErrorCategory::Credential
        );
        assert_eq!(
            AuthError::unknown_credential_kind("x").category(),
            ErrorCategory::Resolution
        );
        assert_eq!(AuthError::NotConfigured.category(), ErrorCategory::Protocol);
        assert_eq!(
            AuthError::configuration("x").category(),
            ErrorCategory::Configuration
        );
        assert_eq!(AuthError::encoding("x").category(), ErrorCategory::Token);
    }

    #[test]
    fn test_credential_error_conversion() {
        let err: AuthError = CredentialError::construction("no ADC found").into();
        assert!(matches!(err, AuthError::CredentialConstruction { .. }));

        let err: AuthError = CredentialError::refresh("token endpoint down").into();
        assert!(matches!(err, AuthError::Refresh { .. }));
    }

    #[test]
    fn test_error_category_display() {
        assert_eq!(ErrorCategory::Credential.to_string(), "credential");
        assert_eq!(ErrorCategory::Protocol.to_string(), "protocol");
    }
}
