use anyhow::Result;
use clap::Parser;
use gatekeeper_core::{config::Config, server, telemetry};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "gatekeeper-core", version, about = "Access and admission control service")]
struct Cli {
    /// Load and validate configuration, then exit
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    if cli.check_config {
        config.validate()?;
        println!("Configuration OK");
        return Ok(());
    }

    let prometheus = telemetry::init(&config.telemetry)?;

    info!("Starting Gatekeeper Core Service");
    info!("HTTP server listening on {}", config.http_addr());

    server::run(config, prometheus).await
}
