//! Error types for bcstatus.

use crate::node::NodeError;
use thiserror::Error;

/// Result type alias using the crate's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by bcstatus.
///
/// Most core operations never return these: "not found" and operational
/// node failures are folded into `Option`/`bool` results at the facade.
/// `Error` is used where the caller needs the reason, such as loading
/// configuration or submitting a transaction.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be read, parsed or validated.
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The node interface failed or rejected a submitted transaction.
    #[error("node error: {0}")]
    Node(#[from] NodeError),

    /// No route exists for submitting a transaction.
    #[error("cannot submit transaction: {0}")]
    Submit(String),

    /// A caller supplied a malformed argument (bad hex, wrong length).
    #[error("invalid input: {0}")]
    InvalidInput(String),
}
