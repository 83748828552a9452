//! [`Error`] type for various errors this library can encounter

use std::path::PathBuf;

/// Errors this library can encounter
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A principal string could not be parsed
    #[error("Invalid principal: {reason}")]
    InvalidPrincipal {
        /// What was wrong with the input
        reason: String,
    },

    /// A principal text form failed to parse at a specific byte offset
    #[error("Parse error at offset {offset}: {reason}")]
    ParseError {
        /// Byte offset of the failure in the input
        offset: usize,
        /// What was wrong with the input
        reason: String,
    },

    /// A keytab byte stream is structurally invalid
    #[error("Malformed keytab at offset {offset}")]
    MalformedKeytab {
        /// Byte offset of the record that could not be decoded
        offset: usize,
    },

    /// The requested encryption type is not supported by the derivation path
    #[error("Unsupported encryption type: {code}")]
    UnsupportedEtype {
        /// Numeric etype code
        code: u16,
    },

    /// A PBKDF2 iteration count of zero was requested
    #[error("Invalid iteration count: must be non-zero")]
    InvalidIterationCount,

    /// The underlying cryptographic primitive failed
    #[error("Key derivation failed: {cause}")]
    DerivationFailed {
        /// Description from the primitive
        cause: String,
    },

    /// Raw key bytes do not match the declared etype's key length
    #[error("Key length mismatch for etype {etype}: expected {expected}, got {got}")]
    KeyLengthMismatch {
        /// Numeric etype code
        etype: u16,
        /// Key length the etype declares
        expected: usize,
        /// Key length that was supplied
        got: usize,
    },

    /// A sensitive operation was requested without acknowledging its risk
    #[error("Risk not acknowledged: this operation requires explicit acknowledgment and a justification")]
    RiskNotAcknowledged,

    /// Two keytabs carry different keys for the same (principal, kvno, etype)
    #[error("Merge conflict on {identity}")]
    MergeConflict {
        /// Rendered `(principal, kvno, etype)` identity of the colliding entries
        identity: String,
    },

    /// The at-rest protection layer failed to wrap or unwrap a blob
    #[error("Protection error: {cause}")]
    ProtectionError {
        /// Description of the failure
        cause: String,
    },

    /// An I/O operation failed
    #[error("I/O error on {path}: {cause}")]
    IoError {
        /// Path the operation was working on
        path: PathBuf,
        /// Underlying error
        cause: std::io::Error,
    },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, cause: std::io::Error) -> Self {
        Self::IoError {
            path: path.into(),
            cause,
        }
    }
}

/// Helper type for errors returned by this library
pub type Result<T> = std::result::Result<T, Error>;
