//! Conversion Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::time::Duration;

/// A conversion error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for conversion operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("ebook-convert not detected on your system")]
    ConverterNotFound,
    /// The requested output format is not one this library can produce.
    #[display("unsupported format: {_0}")]
    UnsupportedFormat(#[error(not(source))] String),
    /// The converter could not be started at all.
    #[display("could not start the converter")]
    Spawn,
    #[display("conversion did not finish within {_0:?}")]
    Timeout(#[error(not(source))] Duration),
    /// The converter exited unsuccessfully; `stderr` holds its diagnostics.
    /// No exit code means it was killed by a signal.
    #[display("converter exited with code {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },
    /// The converter claimed success but produced nothing.
    #[display("converter produced an empty file")]
    EmptyOutput,
    Io,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Io)
    }
}
