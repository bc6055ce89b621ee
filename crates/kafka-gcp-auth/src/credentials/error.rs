//! Error types for credential discovery and token refresh.

/// Errors that can occur while constructing credentials or fetching tokens.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// Credentials could not be discovered or built.
    #[error("Invalid credentials: {message}")]
    Construction {
        /// Description of the construction error.
        message: String,
    },

    /// The upstream token could not be obtained.
    #[error("Token refresh failed: {message}")]
    Refresh {
        /// Description of the refresh error.
        message: String,
    },

    /// The credential source cannot produce tokens at all.
    #[error("Credentials of type {type_name} do not support refreshing")]
    RefreshUnsupported {
        /// Concrete type name of the source.
        type_name: String,
    },

    /// An identity provider endpoint answered with a non-success status.
    #[error("Endpoint {endpoint} returned {status}: {body}")]
    Http {
        /// The endpoint that was called.
        endpoint: String,
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },

    /// The request never produced a response.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A credentials or subject-token file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A response or credentials file was not valid JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Signing a JWT assertion failed.
    #[error("Signing error: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

impl CredentialError {
    /// Creates a new `Construction` error.
    #[must_use]
    pub fn construction(message: impl Into<String>) -> Self {
        Self::Construction {
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

    /// Creates a new `RefreshUnsupported` error.
    #[must_use]
    pub fn refresh_unsupported(type_name: impl Into<String>) -> Self {
        Self::RefreshUnsupported {
            type_name: type_name.into(),
        }
    }

    /// Creates a new `Http` error.
    #[must_use]
    pub fn http(endpoint: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self::Http {
            endpoint: endpoint.into(),
            status,
            body: body.into(),
        }
    }

    /// Returns `true` if the credentials could not be built at all.
    #[must_use]
    pub fn is_construction_error(&self) -> bool {
        matches!(self, Self::Construction { .. })
    }

    /// Returns `true` if the failure came from talking to an endpoint.
    #[must_use]
    pub fn is_external_error(&self) -> bool {
        matches!(self, Self::Http { .. } | Self::Network(_))
    }
}
