//! Kafka OAUTHBEARER token minting.
//!
//! A minted token is three dot-joined, unpadded base64url segments:
//!
//! ```text
//! base64url({"typ":"JWT","alg":"GOOG_OAUTH2_TOKEN"})
//!   . base64url({"exp":..,"iat":..,"scope":"kafka","sub":..})
//!   . base64url(<raw Google access token>)
//! ```
//!
//! The third segment is not a signature. It carries the Google access token
//! so the broker can verify it with Google directly.

use std::collections::BTreeSet;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::credentials::AccessToken;
use crate::credentials::token::epoch_millis;
use crate::error::AuthError;

/// The only scope carried by minted tokens.
pub const KAFKA_SCOPE: &str = "kafka";

/// Header `typ` value.
pub const TOKEN_TYPE: &str = "JWT";

/// Header `alg` value marking the third segment as a Google access token.
pub const GOOGLE_TOKEN_ALGORITHM: &str = "GOOG_OAUTH2_TOKEN";

// ============================================================================
// Wire Types
// ============================================================================

/// The fixed token header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KafkaTokenHeader {
    /// Always `"JWT"`.
    pub typ: String,
    /// Always `"GOOG_OAUTH2_TOKEN"`.
    pub alg: String,
}

impl Default for KafkaTokenHeader {
    fn default() -> Self {
        Self {
            typ: TOKEN_TYPE.to_string(),
            alg: GOOGLE_TOKEN_ALGORITHM.to_string(),
        }
    }
}

/// Token claims. Times are epoch seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KafkaTokenClaims {
    /// Upstream access token expiry.
    pub exp: i64,
    /// Mint time.
    pub iat: i64,
    /// Always `"kafka"`.
    pub scope: String,
    /// The resolved principal.
    pub sub: String,
}

// ============================================================================
// Minted Token
// ============================================================================

/// A token ready to hand to the Kafka SASL layer.
///
/// Times are epoch milliseconds. `expires_at_epoch_ms` always equals the
/// upstream access token's expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintedToken {
    value: String,
    scopes: BTreeSet<String>,
    expires_at_epoch_ms: i64,
    principal: String,
    issued_at_epoch_ms: i64,
}

impl MintedToken {
    /// Returns the encoded token.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Returns the token scopes (always `{"kafka"}`).
    #[must_use]
    pub fn scopes(&self) -> &BTreeSet<String> {
        &self.scopes
    }

    /// Returns the expiry in epoch milliseconds.
    #[must_use]
    pub fn expires_at_epoch_ms(&self) -> i64 {
        self.expires_at_epoch_ms
    }

    /// Returns the principal the token was minted for.
    #[must_use]
    pub fn principal(&self) -> &str {
        &self.principal
    }

    /// Returns the mint time in epoch milliseconds.
    #[must_use]
    pub fn issued_at_epoch_ms(&self) -> i64 {
        self.issued_at_epoch_ms
    }

    /// Consumes the token and returns the encoded value.
    #[must_use]
    pub fn into_value(self) -> String {
        self.value
    }
}

/// Mints a token for `subject` from `access_token`, issued now.
///
/// # Errors
///
/// Returns [`AuthError::Encoding`] if a segment cannot be serialized.
pub fn mint(access_token: &AccessToken, subject: &str) -> Result<MintedToken, AuthError> {
    mint_at(access_token, subject, OffsetDateTime::now_utc())
}

/// Mints a token with an explicit issue instant.
///
/// # Errors
///
/// Returns [`AuthError::Encoding`] if a segment cannot be serialized.
pub fn mint_at(
    access_token: &AccessToken,
    subject: &str,
    now: OffsetDateTime,
) -> Result<MintedToken, AuthError> {
    let claims = KafkaTokenClaims {
        exp: access_token.expires_at_epoch_seconds(),
        iat: now.unix_timestamp(),
        scope: KAFKA_SCOPE.to_string(),
        sub: subject.to_string(),
    };

    let value = [
        encode_json(&KafkaTokenHeader::default())?,
        encode_json(&claims)?,
        URL_SAFE_NO_PAD.encode(access_token.token_value()),
    ]
    .join(".");

    tracing::debug!(
        principal = %subject,
        exp = claims.exp,
        iat = claims.iat,
        "Minted Kafka token"
    );

    Ok(MintedToken {
        value,
        scopes: BTreeSet::from([KAFKA_SCOPE.to_string()]),
        expires_at_epoch_ms: access_token.expires_at_epoch_millis(),
        principal: subject.to_string(),
        issued_at_epoch_ms: epoch_millis(now),
    })
}

fn encode_json<T: Serialize>(value: &T) -> Result<String, AuthError> {
    let json = serde_json::to_vec(value).map_err(|e| AuthError::encoding(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

// ============================================================================
// Inspection
// ============================================================================

/// A minted token split back into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedKafkaToken {
    /// Decoded header.
    pub header: KafkaTokenHeader,
    /// Decoded claims.
    pub claims: KafkaTokenClaims,
    /// The embedded upstream access token.
    pub access_token: String,
}

impl DecodedKafkaToken {
    /// Splits and decodes a minted token. Nothing is verified.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Encoding`] if the value is not three decodable
    /// segments.
    pub fn parse(value: &str) -> Result<Self, AuthError> {
        let segments: Vec<&str> = value.split('.').collect();
        let [header, claims, access_token] = segments.as_slice() else {
            return Err(AuthError::encoding(format!(
                "expected 3 segments, found {}",
                segments.len()
            )));
        };

        Ok(Self {
            header: decode_json(header)?,
            claims: decode_json(claims)?,
            access_token: String::from_utf8(decode_segment(access_token)?)
                .map_err(|e| AuthError::encoding(e.to_string()))?,
        })
    }
}

fn decode_segment(segment: &str) -> Result<Vec<u8>, AuthError> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| AuthError::encoding(e.to_string()))
}

fn decode_json<T: serde::de::DeserializeOwned>(segment: &str) -> Result<T, AuthError> {
    serde_json::from_slice(&decode_segment(segment)?).map_err(|e| AuthError::encoding(e.to_string()))
}

#[cfg(test)]
mod tests {
    use time::Duration;
    use time::macros::datetime;

    use super::*;

    fn access_token(now: OffsetDateTime) -> AccessToken {
        AccessToken::expiring_in("ya29.upstream-token", now, Duration::seconds(3600))
    }

    #[test]
    fn test_token_has_three_unpadded_segments() {
        let minted = mint(&access_token(OffsetDateTime::now_utc()), "sa@p.iam.gserviceaccount.com").unwrap();
        let segments: Vec<&str> = minted.value().split('.').collect();
        assert_eq!(segments.len(), 3);
        assert!(!minted.value().contains('='));
    }

    #[test]
    fn test_header_is_fixed() {
        let minted = mint(&access_token(OffsetDateTime::now_utc()), "sub").unwrap();
        let header = minted.value().split('.').next().unwrap();
        let json: serde_json::Value =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(header).unwrap()).unwrap();
        assert_eq!(json, serde_json::json!({"typ": "JWT", "alg": "GOOG_OAUTH2_TOKEN"}));
    }

    #[test]
    fn test_signature_segment_is_raw_access_token() {
        let minted = mint(&access_token(OffsetDateTime::now_utc()), "sub").unwrap();
        let decoded = DecodedKafkaToken::parse(minted.value()).unwrap();
        assert_eq!(decoded.access_token, "ya29.upstream-token");
    }

    #[test]
    fn test_claims_and_units() {
        let now = datetime!(2025-03-01 12:00:00.250 UTC);
        let token = access_token(now);
        let minted = mint_at(&token, "user@example.com", now).unwrap();
        let decoded = DecodedKafkaToken::parse(minted.value()).unwrap();

        assert_eq!(
            decoded.claims,
            KafkaTokenClaims {
                exp: token.expires_at_epoch_seconds(),
                iat: now.unix_timestamp(),
                scope: "kafka".into(),
                sub: "user@example.com".into(),
            }
        );
        assert_eq!(minted.expires_at_epoch_ms(), token.expires_at_epoch_millis());
        assert_eq!(minted.expires_at_epoch_ms() / 1000, decoded.claims.exp);
        assert_eq!(minted.issued_at_epoch_ms(), 1_740_830_400_250);
        assert_eq!(minted.issued_at_epoch_ms() / 1000, decoded.claims.iat);
    }

    #[test]
    fn test_scope_and_principal() {
        let minted = mint(&access_token(OffsetDateTime::now_utc()), "fake-account@google.com").unwrap();
        assert_eq!(minted.scopes(), &BTreeSet::from(["kafka".to_string()]));
        assert_eq!(minted.principal(), "fake-account@google.com");
    }

    #[test]
    fn test_iat_within_call_window() {
        let before = OffsetDateTime::now_utc().unix_timestamp();
        let minted = mint(&access_token(OffsetDateTime::now_utc()), "sub").unwrap();
        let after = OffsetDateTime::now_utc().unix_timestamp();
        let iat = DecodedKafkaToken::parse(minted.value()).unwrap().claims.iat;
        assert!(iat >= before && iat <= after);
    }

    #[test]
    fn test_parse_rejects_malformed_values() {
        assert!(DecodedKafkaToken::parse("only.two").is_err());
        assert!(DecodedKafkaToken::parse("a.b.c.d").is_err());
        assert!(DecodedKafkaToken::parse("!!!.b.c").is_err());
    }
}
