//! One live connection to the collector
//!
//! A session writes a single frame, then blocks on a single acknowledgment
//! byte. There is no pipelining and no internal retry; the connection manager
//! decides what to do with every [`AckOutcome`].

use crate::transport::traits::TransportStream;
use std::time::Duration;
use telemetry_shared::{protocol, SignedFrame};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;
use tracing::debug;

/// Result of one send/acknowledge exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckOutcome {
    /// Collector replied with the ACK byte
    Accepted,
    /// Collector replied with any other byte
    Rejected { byte: u8 },
    /// Connection closed before a reply byte arrived
    PeerClosed,
    /// Signature or payload could not be written completely
    SendFailed { reason: String },
    /// Reading the reply failed or timed out
    ReadError { reason: String },
}

impl AckOutcome {
    /// Classify a single reply byte
    pub fn classify(byte: u8) -> Self {
        if byte == protocol::ACK {
            AckOutcome::Accepted
        } else {
            AckOutcome::Rejected { byte }
        }
    }

    /// True for outcomes that end the connection but not the process
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AckOutcome::PeerClosed | AckOutcome::SendFailed { .. } | AckOutcome::ReadError { .. }
        )
    }
}

impl std::fmt::Display for AckOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AckOutcome::Accepted => write!(f, "accepted"),
            AckOutcome::Rejected { byte } => write!(f, "rejected (0x{:02x})", byte),
            AckOutcome::PeerClosed => write!(f, "peer closed before acknowledging"),
            AckOutcome::SendFailed { reason } => write!(f, "send failed: {}", reason),
            AckOutcome::ReadError { reason } => write!(f, "acknowledgment read failed: {}", reason),
        }
    }
}

/// Exclusive owner of one connected stream
pub struct TransportSession<S> {
    stream: S,
    ack_timeout: Option<Duration>,
}

impl<S: TransportStream> TransportSession<S> {
    /// Wrap a connected stream; `None` waits for the acknowledgment indefinitely
    pub fn new(stream: S, ack_timeout: Option<Duration>) -> Self {
        Self {
            stream,
            ack_timeout,
        }
    }

    /// Write `signature` then `payload`, then wait for exactly one reply byte
    pub async fn send_frame(&mut self, frame: &SignedFrame) -> AckOutcome {
        if let Err(e) = self.stream.write_all(&frame.signature).await {
            return AckOutcome::SendFailed {
                reason: format!("signature: {}", e),
            };
        }
        if let Err(e) = self.stream.write_all(&frame.payload).await {
            return AckOutcome::SendFailed {
                reason: format!("payload: {}", e),
            };
        }
        if let Err(e) = self.stream.flush().await {
            return AckOutcome::SendFailed {
                reason: format!("flush: {}", e),
            };
        }

        debug!(bytes = frame.len(), "Frame written, awaiting acknowledgment");
        self.await_ack().await
    }

    async fn await_ack(&mut self) -> AckOutcome {
        let mut reply = [0u8; 1];

        let read = match self.ack_timeout {
            Some(limit) => match timeout(limit, self.stream.read(&mut reply)).await {
                Ok(read) => read,
                Err(_) => {
                    return AckOutcome::ReadError {
                        reason: format!("no acknowledgment within {:?}", limit),
                    }
                }
            },
            None => self.stream.read(&mut reply).await,
        };

        match read {
            Ok(0) => AckOutcome::PeerClosed,
            Ok(_) => AckOutcome::classify(reply[0]),
            Err(e) => AckOutcome::ReadError {
                reason: e.to_string(),
            },
        }
    }

    /// Shut the stream down and discard it
    pub async fn close(mut self) {
        if let Err(e) = TransportStream::shutdown(&mut self.stream).await {
            debug!("Shutdown of discarded connection failed: {}", e);
        }
    }
}
