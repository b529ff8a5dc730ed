mod connection;

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use telemetry_shared::signing;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Reference collector for signed sensor readings
#[derive(Parser, Debug)]
#[command(name = "collector")]
#[command(about = "Verifies signed sensor frames and acknowledges each with one byte")]
struct Args {
    /// Address to listen on
    #[arg(short, long, env = "COLLECTOR_LISTEN", default_value = "0.0.0.0:8080")]
    listen: String,

    /// Sensor public key PEM file (SPKI or PKCS#1)
    #[arg(short, long, env = "COLLECTOR_PUBLIC_KEY", default_value = "public_key.pem")]
    public_key: PathBuf,

    /// Emit logs as JSON
    #[arg(long, env = "COLLECTOR_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if args.log_json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }

    match serve(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Collector stopped: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn serve(args: Args) -> anyhow::Result<()> {
    let public_key = Arc::new(signing::load_public_key(&args.public_key)?);
    let listener = TcpListener::bind(&args.listen).await?;
    info!("Collector listening on {}", args.listen);

    loop {
        let (socket, addr) = listener.accept().await?;
        info!("Connection from: {}", addr);

        let public_key = public_key.clone();
        tokio::spawn(async move {
            match connection::handle_connection(socket, &public_key).await {
                Ok(stats) => info!(
                    accepted = stats.accepted,
                    rejected = stats.rejected,
                    "Sensor disconnected: {}",
                    addr
                ),
                Err(e) => error!("Connection from {} dropped: {}", addr, e),
            }
        });
    }
}
