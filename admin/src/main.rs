//! Boxoffice operator CLI.
//!
//! Confirms, cancels and redeems orders against the `PostgreSQL` store and
//! prints results as JSON. Domain failures are printed as
//! `{"error": <code>, "message": ...}` and exit with status 1.

mod cli;
mod config;
mod delivery;

use boxoffice_core::TicketingError;
use boxoffice_postgres::PostgresTicketingStore;
use clap::Parser;
use cli::{App, Cli, Command};
use config::Config;
use std::process;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    let _env = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,boxoffice=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    if let Err(err) = run(cli.command).await {
        match err.downcast_ref::<TicketingError>() {
            Some(domain) if domain.is_business_error() => {
                println!(
                    "{}",
                    serde_json::json!({ "error": domain.code(), "message": domain.to_string() })
                );
            }
            _ => error!(error = ?err, "command failed"),
        }
        process::exit(1);
    }
}

async fn run(command: Command) -> anyhow::Result<()> {
    let config = Config::from_env();
    info!(
        postgres_url = %config.postgres.redacted_url(),
        currency = %config.orders.currency,
        "Configuration loaded"
    );

    let secret = config::signing_secret()?;
    let store = PostgresTicketingStore::connect(&config.postgres).await?;
    let app = App::new(store, secret, config.orders.policy());
    app.run(command).await
}
