//! Extraction Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// An extraction error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for extraction operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
/// In every case the answer is the same: skip the document, log it, move on.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The XML structure is broken (unclosed/mismatched tags, bad attributes,
    /// truncated stream).
    #[display("malformed document: {_0}")]
    Malformed(#[error(not(source))] String),
    /// The XML is well-formed but is not a FictionBook document.
    #[display("invalid FictionBook document: missing root element")]
    InvalidDocument,
    /// The underlying stream could not be read.
    #[display("could not read document stream")]
    Io,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // A document is either valid or it isn't; only a failing stream
        // might behave differently next time.
        matches!(self, Self::Io)
    }
}
