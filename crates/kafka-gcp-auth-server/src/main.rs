use anyhow::Context;
use clap::Parser;
use kafka_gcp_auth::Credentials;
use kafka_gcp_auth_server::config::DEFAULT_CONFIG_FILE;
use kafka_gcp_auth_server::{load_config, observability, run};

/// Serves Kafka OAUTHBEARER tokens minted from Google credentials.
#[derive(Debug, Parser)]
#[command(name = "kafka-gcp-auth-server", version, about)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, env = "KAFKA_GCP_AUTH_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine.
    if let Err(e) = dotenvy::dotenv()
        && !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
    {
        eprintln!("Warning: Failed to load .env file: {e}");
    }

    observability::init_tracing();

    let cli = Cli::parse();
    let cfg = load_config(Some(&cli.config)).context("Configuration error")?;
    observability::apply_logging_level(&cfg.logging.level);
    tracing::info!(path = %cli.config, addr = %cfg.server.addr(), "Configuration loaded");

    let scopes: Vec<&str> = cfg.credentials.scopes.iter().map(String::as_str).collect();
    let credentials = Credentials::application_default(&scopes)
        .await
        .context("Failed to find Application Default Credentials")?;
    tracing::info!(
        credential = credentials.type_name(),
        kind = %credentials.kind(),
        "Using Google credentials"
    );

    run(&cfg, credentials).await.context("Server error")
}
