//! Errors that stop the node

use telemetry_shared::{CodecError, KeyLoadError, SigningError};
use thiserror::Error;

/// Conditions no reconnect can fix
#[derive(Error, Debug)]
pub enum FatalError {
    #[error("cannot load signing key: {0}")]
    KeyLoad(#[from] KeyLoadError),

    #[error("reading cannot be framed: {0}")]
    Codec(#[from] CodecError),

    #[error("signing failed: {0}")]
    Signing(#[from] SigningError),
}

impl FatalError {
    /// Process exit status for this error
    pub fn exit_code(&self) -> u8 {
        1
    }
}
