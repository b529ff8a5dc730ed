//! Sensor Telemetry Shared Protocol Types
//!
//! This crate provides the reading type, frame codec and signing primitives
//! shared by the sensor node and the collector.

pub mod codec;
pub mod signing;
pub mod state_machine;

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Get current timestamp in whole seconds since Unix epoch
pub fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Wire protocol parameters
pub mod protocol {
    /// Acknowledgment byte sent by the collector for an accepted frame
    pub const ACK: u8 = 0x01;

    /// Byte the reference collector sends for a rejected frame.
    /// Any value other than [`ACK`] is a rejection.
    pub const NACK: u8 = 0x00;

    /// Largest frame (signature + payload) the collector buffers
    pub const MAX_FRAME_SIZE: usize = 4096;

    /// Headroom reserved for the signature
    pub const SIGNATURE_HEADROOM: usize = 256;

    /// Maximum serialized payload size
    pub const MAX_PAYLOAD_SIZE: usize = MAX_FRAME_SIZE - SIGNATURE_HEADROOM;

    /// Delay between accepted ticks in milliseconds
    pub const TICK_INTERVAL_MS: u64 = 1000;

    /// Delay before reconnecting after a failure in milliseconds
    pub const RECONNECT_DELAY_MS: u64 = 5000;
}

/// One sensor sample.
///
/// Field order is the canonical serialization order. Field names on the wire
/// are the collector's (`temperatura`, `presion`, `humedad`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub id: i16,
    pub timestamp: i64,
    #[serde(rename = "temperatura")]
    pub temperature: f32,
    #[serde(rename = "presion")]
    pub pressure: f32,
    #[serde(rename = "humedad")]
    pub humidity: f32,
}

impl Reading {
    /// Create a reading stamped with the current time
    pub fn now(id: i16, temperature: f32, pressure: f32, humidity: f32) -> Self {
        Self {
            id,
            timestamp: now_secs(),
            temperature,
            pressure,
            humidity,
        }
    }
}

pub use codec::{CodecError, SignedFrame};
pub use signing::{KeyLoadError, RsaSigner, SigningError, VerifyError};
