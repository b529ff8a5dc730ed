//! Connection management for the signed telemetry stream
//!
//! This module handles:
//! - Connecting to the collector with a fixed, unbounded retry backoff
//! - The per-tick produce, serialize, sign, send, acknowledge cycle
//! - Discarding the connection on transient failures and rejections
//! - Stopping on unrecoverable local errors

mod manager;

pub use manager::{ConnectionConfig, ConnectionEvent, ConnectionManager};
