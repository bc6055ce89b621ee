//! Local credentials server for Kafka clients that cannot run the
//! OAUTHBEARER login callback handler themselves.
//!
//! Clients point their OAuth token endpoint at this server and receive a
//! Kafka token minted from the machine's Google credentials.

pub mod config;
pub mod observability;
pub mod server;

pub use config::{AppConfig, ConfigError, load_config};
pub use server::{AppState, ErrorResponse, TokenResponse, build_router, run};
