//! Identity token payload parsing.
//!
//! Only the payload is read. Signatures are not verified: the token comes
//! straight from Google over TLS and is used to learn the caller's own
//! e-mail, not to authenticate anyone else.

use base64::Engine;
use base64::engine::DecodePaddingMode;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use serde::Deserialize;

use crate::error::AuthError;

const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &base64::alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// The identity token claims this crate cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct IdTokenPayload {
    /// Issuer.
    #[serde(default)]
    pub iss: Option<String>,
    /// Subject (numeric Google account id).
    #[serde(default)]
    pub sub: Option<String>,
    /// E-mail address; present when requested.
    #[serde(default)]
    pub email: Option<String>,
    /// Whether Google verified the e-mail.
    #[serde(default)]
    pub email_verified: Option<bool>,
    /// Expiry (epoch seconds).
    #[serde(default)]
    pub exp: Option<i64>,
    /// Issue time (epoch seconds).
    #[serde(default)]
    pub iat: Option<i64>,
}

impl IdTokenPayload {
    /// Decodes the payload segment of a compact JWS.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidIdToken`] if the token is not three
    /// segments or the payload is not base64url JSON.
    pub fn parse(id_token: &str) -> Result<Self, AuthError> {
        let mut segments = id_token.split('.');
        let payload = match (segments.next(), segments.next(), segments.next(), segments.next()) {
            (Some(_), Some(payload), Some(_), None) => payload,
            _ => return Err(AuthError::invalid_id_token("expected 3 segments")),
        };

        let bytes = URL_SAFE_LENIENT
            .decode(payload)
            .map_err(|e| AuthError::invalid_id_token(format!("payload is not base64url: {e}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| AuthError::invalid_id_token(format!("payload is not JSON: {e}")))
    }
}
