//! Token assembly and inspection.
//!
//! - [`minter`] builds the Kafka OAUTHBEARER token
//! - [`id_token`] reads the payload of Google identity tokens

pub mod id_token;
pub mod minter;

pub use id_token::IdTokenPayload;
pub use minter::{
    DecodedKafkaToken, GOOGLE_TOKEN_ALGORITHM, KAFKA_SCOPE, KafkaTokenClaims, KafkaTokenHeader,
    MintedToken, TOKEN_TYPE, mint, mint_at,
};
