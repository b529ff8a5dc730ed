//! Per-connection frame handling
//!
//! Reads `[signature][payload]` frames off one stream, verifies each, and
//! answers every frame with a single ACK or NACK byte.

use anyhow::Result;
use telemetry_shared::codec::FrameDecoder;
use telemetry_shared::signing::{self, RsaPublicKey};
use telemetry_shared::protocol;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};

/// Frames seen on one connection
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStats {
    pub accepted: u64,
    pub rejected: u64,
}

/// Serve one sensor until it disconnects
///
/// A frame that does not decode gets a NACK and ends the connection, since
/// the stream has no delimiter to resynchronise on.
pub async fn handle_connection<S>(mut stream: S, public_key: &RsaPublicKey) -> Result<ConnectionStats>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut decoder = FrameDecoder::new(signing::signature_len(public_key));
    let mut buf = vec![0u8; protocol::MAX_FRAME_SIZE];
    let mut stats = ConnectionStats::default();

    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(stats);
        }
        decoder.extend(&buf[..n]);

        loop {
            let decoded = match decoder.decode_next() {
                Ok(Some(decoded)) => decoded,
                Ok(None) => break,
                Err(e) => {
                    warn!("Undecodable frame: {}", e);
                    stream.write_all(&[protocol::NACK]).await?;
                    stats.rejected += 1;
                    return Ok(stats);
                }
            };

            let frame = decoded.frame;
            let reply = match signing::verify(public_key, &frame.payload, &frame.signature) {
                Ok(()) => {
                    let r = decoded.reading;
                    info!(
                        id = r.id,
                        timestamp = r.timestamp,
                        temperature = r.temperature,
                        pressure = r.pressure,
                        humidity = r.humidity,
                        "Verified reading"
                    );
                    stats.accepted += 1;
                    protocol::ACK
                }
                Err(e) => {
                    warn!(signature_len = frame.signature.len(), "Verification failed: {}", e);
                    stats.rejected += 1;
                    protocol::NACK
                }
            };
            stream.write_all(&[reply]).await?;
        }
    }
}
