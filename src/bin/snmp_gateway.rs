//! snmp-gateway: run the sensor-ingest gateway.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use snmp_gateway::{Agent, Config};
use tracing_subscriber::EnvFilter;

/// SNMP sensor-ingest gateway.
///
/// Ingests SNMPv2c traps and polls, and fronts each device to the
/// monitoring hub as its own agent session.
#[derive(Debug, Parser)]
#[command(name = "snmp-gateway", version, about)]
struct Args {
    /// Path to the configuration JSON.
    #[arg(value_name = "CONFIG")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = config.require_hub() {
        eprintln!("Error: {e}");
        return ExitCode::FAILURE;
    }

    let agent = Agent::new(config);

    // SIGINT/SIGTERM cancel every loop; sessions close with code 1000.
    let cancel = agent.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
            cancel.cancel();
        }
    });

    match agent.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
