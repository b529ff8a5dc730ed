mod config;
mod connection;
mod error;
mod source;
mod transport;

use clap::Parser;
use config::{Args, NodeConfig};
use connection::ConnectionManager;
use error::FatalError;
use source::SimulatedSensor;
use std::process::ExitCode;
use telemetry_shared::signing::PayloadSigner;
use telemetry_shared::RsaSigner;
use transport::TcpConnector;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.log_json);

    match run(NodeConfig::from(args)).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Sensor node stopped: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

/// Load the key, then tick until shutdown or a fatal error
async fn run(config: NodeConfig) -> Result<(), FatalError> {
    info!("Sensor node starting: id={}", config.sensor_id);
    info!("  Collector: {}", config.collector);
    info!("  Key file: {}", config.key_path.display());

    // Key problems are reported before any network activity
    let signer = RsaSigner::from_pem_file(&config.key_path)?;
    info!(signature_len = signer.signature_len(), "Signing key loaded");

    let connector = TcpConnector::new(config.collector.clone(), config.connect_timeout);
    let source = SimulatedSensor::new(config.sensor_id);
    let mut manager = ConnectionManager::new(config.connection, connector, source, signer);

    tokio::select! {
        result = manager.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested");
            Ok(())
        }
    }
}
