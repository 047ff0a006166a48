//! Error types for envelope cryptography.

use thiserror::Error;

/// Result alias for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors raised by the codec, cipher, and signing layers.
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("table artifact rejected: {0}")]
    TableArtifact(String),

    #[error("envelope is empty")]
    EmptyEnvelope,

    #[error("envelope missing leading marker")]
    MissingMarker,

    #[error("invalid base64 in envelope: {0}")]
    InvalidBase64(String),

    #[error("ciphertext length {0} is not a multiple of the block size")]
    BlockMisaligned(usize),

    #[error("invalid padding")]
    InvalidPadding,

    #[error("key must be {expected} hex characters, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("{field} is not valid hex")]
    InvalidHex { field: &'static str },

    #[error("decrypted payload is not valid UTF-8")]
    InvalidUtf8,
}
