//! Node configuration
//!
//! Every option can be given on the command line or through a `SENSOR_*`
//! environment variable. Defaults are the reference constants.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;
use telemetry_shared::protocol;

use crate::connection::ConnectionConfig;

/// What to do when the collector rejects a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum NackPolicy {
    /// Drop the connection and reconnect after the backoff delay
    #[default]
    Reconnect,
    /// Keep the connection and resend the same frame after the tick interval
    RetryInPlace,
}

/// Signed telemetry producer
#[derive(Parser, Debug)]
#[command(name = "sensor-node")]
#[command(about = "Simulated sensor that signs each reading and streams it to a collector")]
pub struct Args {
    /// Collector address (host:port)
    #[arg(short, long, env = "SENSOR_COLLECTOR", default_value = "127.0.0.1:8080")]
    pub collector: String,

    /// Private key PEM file (PKCS#8 or PKCS#1)
    #[arg(short, long, env = "SENSOR_KEY", default_value = "private_key.pem")]
    pub key: PathBuf,

    /// Sensor id carried in every reading
    #[arg(long, env = "SENSOR_ID", default_value_t = 1)]
    pub sensor_id: i16,

    /// Delay between accepted readings
    #[arg(long, env = "SENSOR_TICK_INTERVAL_MS", default_value_t = protocol::TICK_INTERVAL_MS)]
    pub tick_interval_ms: u64,

    /// Delay before each reconnect attempt
    #[arg(long, env = "SENSOR_RECONNECT_DELAY_MS", default_value_t = protocol::RECONNECT_DELAY_MS)]
    pub reconnect_delay_ms: u64,

    /// Give up on a connect attempt after this long (default: no limit)
    #[arg(long, env = "SENSOR_CONNECT_TIMEOUT_MS")]
    pub connect_timeout_ms: Option<u64>,

    /// Give up waiting for an acknowledgment after this long (default: no limit)
    #[arg(long, env = "SENSOR_ACK_TIMEOUT_MS")]
    pub ack_timeout_ms: Option<u64>,

    /// Reaction to a rejected frame
    #[arg(long, env = "SENSOR_NACK_POLICY", value_enum, default_value_t = NackPolicy::Reconnect)]
    pub nack_policy: NackPolicy,

    /// Exit cleanly after this many accepted readings
    #[arg(long, env = "SENSOR_MAX_TICKS")]
    pub max_ticks: Option<u64>,

    /// Emit logs as JSON
    #[arg(long, env = "SENSOR_LOG_JSON")]
    pub log_json: bool,
}

/// Resolved configuration for one node
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Collector address (host:port)
    pub collector: String,
    /// Private key PEM path
    pub key_path: PathBuf,
    /// Sensor id
    pub sensor_id: i16,
    /// Connect timeout, if any
    pub connect_timeout: Option<Duration>,
    /// Tick loop settings
    pub connection: ConnectionConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            collector: "127.0.0.1:8080".into(),
            key_path: "private_key.pem".into(),
            sensor_id: 1,
            connect_timeout: None,
            connection: ConnectionConfig::default(),
        }
    }
}

impl From<Args> for NodeConfig {
    fn from(args: Args) -> Self {
        Self {
            collector: args.collector,
            key_path: args.key,
            sensor_id: args.sensor_id,
            connect_timeout: args.connect_timeout_ms.map(Duration::from_millis),
            connection: ConnectionConfig {
                tick_interval: Duration::from_millis(args.tick_interval_ms),
                reconnect_delay: Duration::from_millis(args.reconnect_delay_ms),
                ack_timeout: args.ack_timeout_ms.map(Duration::from_millis),
                nack_policy: args.nack_policy,
                max_ticks: args.max_ticks,
                ..Default::default()
            },
        }
    }
}
