//! Detached RSA signatures over serialized readings
//!
//! Signatures are RSASSA-PKCS1-v1_5 with SHA-256, which is what the
//! collector verifies. The signature length equals the key modulus size.

use bytes::Bytes;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::traits::PublicKeyParts;
pub use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failure to produce a signature
#[derive(Error, Debug)]
pub enum SigningError {
    #[error("Signature buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },

    #[error("Signing primitive failed: {0}")]
    Primitive(String),

    #[error("Signature length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
}

/// Failure to load key material at startup
#[derive(Error, Debug)]
pub enum KeyLoadError {
    #[error("Key file not found: {}", path.display())]
    Missing { path: PathBuf },

    #[error("Key file unreadable: {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Key file {} is not a valid {kind} PEM: {reason}", path.display())]
    Malformed {
        path: PathBuf,
        kind: &'static str,
        reason: String,
    },
}

/// Signature did not verify
#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("Signature has wrong length: expected {expected}, got {actual}")]
    WrongLength { expected: usize, actual: usize },

    #[error("Signature does not match payload")]
    Mismatch,
}

/// Produces detached signatures over payload bytes
pub trait PayloadSigner: Send + Sync {
    /// Length of every signature this signer produces
    fn signature_len(&self) -> usize;

    /// Sign `payload` into a caller-sized buffer, returning the bytes written
    fn sign_into(&self, payload: &[u8], out: &mut [u8]) -> Result<usize, SigningError>;

    /// Sign `payload`, sizing the buffer from [`PayloadSigner::signature_len`] first
    fn sign(&self, payload: &[u8]) -> Result<Bytes, SigningError> {
        let mut out = vec![0u8; self.signature_len()];
        let written = self.sign_into(payload, &mut out)?;
        out.truncate(written);
        Ok(Bytes::from(out))
    }
}

/// RSA PKCS#1 v1.5 / SHA-256 signer
#[derive(Clone)]
pub struct RsaSigner {
    key: RsaPrivateKey,
}

impl RsaSigner {
    pub fn new(key: RsaPrivateKey) -> Self {
        Self { key }
    }

    /// Load the private key from a PEM file and build a signer
    pub fn from_pem_file(path: impl AsRef<Path>) -> Result<Self, KeyLoadError> {
        load_private_key(path).map(Self::new)
    }

    /// Public half, for handing to a verifier
    pub fn public_key(&self) -> RsaPublicKey {
        self.key.to_public_key()
    }
}

impl std::fmt::Debug for RsaSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RsaSigner")
            .field("bits", &(self.key.size() * 8))
            .finish_non_exhaustive()
    }
}

impl PayloadSigner for RsaSigner {
    fn signature_len(&self) -> usize {
        self.key.size()
    }

    fn sign_into(&self, payload: &[u8], out: &mut [u8]) -> Result<usize, SigningError> {
        let needed = self.signature_len();
        if out.len() < needed {
            return Err(SigningError::BufferTooSmall {
                needed,
                available: out.len(),
            });
        }

        // The signing context lives only for this call
        let context = SigningKey::<Sha256>::new(self.key.clone());
        let signature = context
            .try_sign(payload)
            .map_err(|e| SigningError::Primitive(e.to_string()))?
            .to_vec();

        if signature.len() != needed {
            return Err(SigningError::LengthMismatch {
                expected: needed,
                actual: signature.len(),
            });
        }

        out[..needed].copy_from_slice(&signature);
        Ok(needed)
    }
}

/// Length of signatures that verify under `public_key`
pub fn signature_len(public_key: &RsaPublicKey) -> usize {
    public_key.size()
}

/// Verify a detached signature against the payload it should cover
pub fn verify(
    public_key: &RsaPublicKey,
    payload: &[u8],
    signature: &[u8],
) -> Result<(), VerifyError> {
    let expected = signature_len(public_key);
    if signature.len() != expected {
        return Err(VerifyError::WrongLength {
            expected,
            actual: signature.len(),
        });
    }

    let signature = Signature::try_from(signature).map_err(|_| VerifyError::Mismatch)?;
    VerifyingKey::<Sha256>::new(public_key.clone())
        .verify(payload, &signature)
        .map_err(|_| VerifyError::Mismatch)
}

fn read_key_file(path: &Path) -> Result<String, KeyLoadError> {
    // Existence is checked before any parse so a missing file is reported as such
    match path.try_exists() {
        Ok(true) => {}
        Ok(false) => {
            return Err(KeyLoadError::Missing {
                path: path.to_path_buf(),
            })
        }
        Err(source) => {
            return Err(KeyLoadError::Unreadable {
                path: path.to_path_buf(),
                source,
            })
        }
    }

    std::fs::read_to_string(path).map_err(|source| KeyLoadError::Unreadable {
        path: path.to_path_buf(),
        source,
    })
}

/// Load an RSA private key (PKCS#8 or PKCS#1 PEM)
pub fn load_private_key(path: impl AsRef<Path>) -> Result<RsaPrivateKey, KeyLoadError> {
    let path = path.as_ref();
    let pem = read_key_file(path)?;

    let key = match RsaPrivateKey::from_pkcs8_pem(&pem) {
        Ok(key) => key,
        Err(pkcs8_err) => RsaPrivateKey::from_pkcs1_pem(&pem).map_err(|_| {
            KeyLoadError::Malformed {
                path: path.to_path_buf(),
                kind: "private key",
                reason: pkcs8_err.to_string(),
            }
        })?,
    };

    key.validate().map_err(|e| KeyLoadError::Malformed {
        path: path.to_path_buf(),
        kind: "private key",
        reason: e.to_string(),
    })?;

    Ok(key)
}

/// Load an RSA public key (SPKI or PKCS#1 PEM)
pub fn load_public_key(path: impl AsRef<Path>) -> Result<RsaPublicKey, KeyLoadError> {
    let path = path.as_ref();
    let pem = read_key_file(path)?;

    match RsaPublicKey::from_public_key_pem(&pem) {
        Ok(key) => Ok(key),
        Err(spki_err) => {
            RsaPublicKey::from_pkcs1_pem(&pem).map_err(|_| KeyLoadError::Malformed {
                path: path.to_path_buf(),
                kind: "public key",
                reason: spki_err.to_string(),
            })
        }
    }
}
