//! Library Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use libris_cache::BookId;

/// A library error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classifies the origin of a library failure.
///
/// ### Startup Errors
/// - [`ErrorKind::InvalidRoot`]
/// - [`ErrorKind::Watch`]
/// - [`ErrorKind::AlreadyRunning`]
///
/// ### Per-Item Errors
/// Logged by the workers; an item failing never stops the pipeline.
/// - [`ErrorKind::Io`]
/// - [`ErrorKind::Extract`]
/// - [`ErrorKind::Archive`]
/// - [`ErrorKind::Store`]
/// - [`ErrorKind::Task`]
///
/// ### Retrieval Errors
/// - [`ErrorKind::BookNotFound`]
/// - [`ErrorKind::ContainerNotFound`]
/// - [`ErrorKind::MemberNotFound`]
/// - [`ErrorKind::ConverterUnavailable`]
/// - [`ErrorKind::Conversion`]
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The library root does not exist or is not a directory.
    #[display("invalid library root: {_0}")]
    InvalidRoot(#[error(not(source))] String),
    /// The filesystem watcher could not be attached to the library root.
    #[display("could not watch the library root")]
    Watch,
    #[display("the library is already running")]
    AlreadyRunning,
    /// A directory could not be read during a scan.
    #[display("could not walk the library")]
    Walk,
    /// A store operation via [`libris_cache::Repository`] failed.
    #[display("book store error")]
    Store,
    Io,
    /// A document could not be parsed.
    #[display("could not extract document metadata")]
    Extract,
    /// A zip archive could not be read.
    #[display("could not read archive")]
    Archive,
    /// A blocking task panicked or was cancelled.
    #[display("background task failed")]
    Task,
    #[display("book not found: {_0}")]
    BookNotFound(#[error(not(source))] BookId),
    /// The file a book was indexed from is gone.
    #[display("book file not found: {_0}")]
    ContainerNotFound(#[error(not(source))] String),
    /// The archive a book was indexed from no longer holds it.
    #[display("{member} not found in archive {path}")]
    MemberNotFound { path: String, member: String },
    /// A converted format was requested but no converter is configured.
    #[display("no converter available")]
    ConverterUnavailable,
    #[display("conversion failed")]
    Conversion,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io | Self::Store | Self::Conversion)
    }
}
