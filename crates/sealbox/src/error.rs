//! error types for sealbox
//!
//! errors fall into three classes:
//! - validation: bad parameters or malformed input, fail closed immediately
//! - transient: a custodian is unreachable, retried with bounded backoff
//! - security: tag or binding failures, one uniform variant per operation

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    // === field / sharing ===
    #[error("invalid prime modulus: {0}")]
    InvalidPrime(String),

    #[error("invalid threshold: need 1 <= t <= n < p, got t={t} n={n}")]
    InvalidThreshold { t: u32, n: u32 },

    #[error("secret is not an element of the field")]
    InvalidSecret,

    #[error("insufficient shares: have {have}, need {need}")]
    InsufficientShares { have: usize, need: usize },

    #[error("duplicate share index: {0}")]
    DuplicateShare(u32),

    #[error("share index must be a nonzero field element")]
    InvalidShareIndex,

    #[error("shares were issued over different prime fields")]
    InconsistentField,

    #[error("shares were issued with different thresholds")]
    InconsistentThreshold,

    #[error("share failed verification against polynomial commitment")]
    ShareVerificationFailed,

    #[error("verifiable sharing requires the bn254 scalar field")]
    UnsupportedField,

    // === curve / commitments ===
    #[error("invalid curve point")]
    InvalidCurvePoint,

    #[error("scalar out of range for curve order")]
    InvalidScalar,

    #[error("revealed opening does not match published commitment")]
    RevealMismatch,

    // === viewing keys ===
    #[error("decryption failed")]
    Decryption,

    #[error("encryption failed")]
    Encryption,

    #[error("key derivation failed")]
    KeyDerivationFailed,

    // === encoding ===
    #[error("unsupported format version {0}")]
    UnsupportedVersion(u8),

    #[error("malformed encoding: {0}")]
    Malformed(&'static str),

    // === state ===
    #[error("unknown dispute: {0}")]
    UnknownDispute(String),

    #[error("dispute already registered: {0}")]
    DuplicateDispute(String),

    #[error("invalid state transition: {0}")]
    InvalidState(String),

    #[error("unknown share holder: {0}")]
    UnknownHolder(String),

    #[error("share holder listed twice: {0}")]
    DuplicateHolder(String),

    #[error("unknown submission: {0}")]
    UnknownSubmission(u64),

    #[error("unknown batch: {0}")]
    UnknownBatch(u64),

    // === custodians ===
    #[error("custodian unavailable: {0}")]
    Unavailable(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("config error: {0}")]
    Config(String),
}

impl Error {
    /// true when retrying the same request may succeed
    ///
    /// only availability failures qualify. a share that fails decryption or
    /// commitment checks is never retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Unavailable(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => Error::Storage(e.to_string()),
            std::io::ErrorKind::TimedOut
            | std::io::ErrorKind::Interrupted
            | std::io::ErrorKind::WouldBlock => Error::Unavailable(e.to_string()),
            _ => Error::Storage(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(Error::Unavailable("node down".into()).is_transient());
        assert!(!Error::Decryption.is_transient());
        assert!(!Error::ShareVerificationFailed.is_transient());
        assert!(!Error::InsufficientShares { have: 1, need: 2 }.is_transient());
    }

    #[test]
    fn test_io_mapping() {
        let e: Error = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow").into();
        assert!(e.is_transient());
        let e: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(!e.is_transient());
    }
}
