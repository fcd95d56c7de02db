//! Command Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A command error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for commands.
pub type Result<T> = std::result::Result<T, Error>;

/// Which part of the application a command failed in.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("configuration error")]
    Config,
    #[display("could not open the book store")]
    Database,
    #[display("library error")]
    Library,
    /// Writing results to a file or the terminal failed.
    #[display("could not write output")]
    Output,
}
