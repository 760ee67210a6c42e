//! Error taxonomy shared by every fallible operation in the crate.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure classes surfaced by index construction, loading, and querying.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration rejected before any work was done.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// File open/read/write failure, including malformed sketch records.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Unparseable textual input or a serialized index the reader cannot accept.
    #[error("parse error: {0}")]
    Parse(String),

    /// Index answers diverged from the brute-force ground truth.
    #[error("validation error: {0}")]
    Validation(String),

    /// Query aborted by the signature-explosion guard; no scores were produced.
    #[error("search aborted: at least {expected} signatures would be enumerated")]
    SearchAbort { expected: u64 },

    /// Corrupted index or an internal bug; the index must not be trusted.
    #[error("invariant violated: {0}")]
    Invariant(String),
}
