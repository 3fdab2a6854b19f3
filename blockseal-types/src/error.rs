//! Error types for blockseal

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Malformed base64, JSON or imprint bytes
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Envelope version missing or outside the supported set
    #[error("Unsupported envelope version: {found} (supported: {supported})")]
    Version { found: String, supported: String },

    /// Record digests do not justify the signature, or an extend clause failed
    #[error("Integrity violation: {0}")]
    Integrity(String),

    #[error("No envelope stored at key: {key}")]
    NotFound { key: String },

    /// Block identity lacks a field the canonical encoding needs
    #[error("Incomplete block identity: {0}")]
    Canonicalization(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Timestamping authority error: {0}")]
    Authority(String),

    #[error("Ledger error: {0}")]
    Ledger(String),
}

impl Error {
    /// True for the "nothing stored here" case drivers are allowed to skip.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Encoding(e.to_string())
    }
}

impl From<base64::DecodeError> for Error {
    fn from(e: base64::DecodeError) -> Self {
        Error::Encoding(format!("invalid base64: {}", e))
    }
}

impl From<hex::FromHexError> for Error {
    fn from(e: hex::FromHexError) -> Self {
        Error::Encoding(format!("invalid hex: {}", e))
    }
}
