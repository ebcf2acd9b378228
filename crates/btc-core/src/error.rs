use thiserror::Error;

/// Errors surfaced by the key model, address codecs and PSBT helpers.
///
/// Streaming parsers do not return these: they record failure in their
/// [`ParseStatus`](crate::streamable::ParseStatus). Only the one-shot
/// convenience constructors translate a failed status into `ParseFailed`.
#[derive(Debug, Error)]
pub enum BtcError {
    #[error("parse failed: {0}")]
    ParseFailed(String),

    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("derivation failed: {0}")]
    DerivationFailed(String),

    #[error("derivation mismatch: {0}")]
    DerivationMismatch(String),

    #[error("incomplete data: {0}")]
    IncompleteData(String),

    #[error("signing error: {0}")]
    SigningError(String),

    #[error("invalid network: {0}")]
    InvalidNetwork(String),
}
