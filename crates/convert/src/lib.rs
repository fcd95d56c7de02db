//! E-book format conversion.
//!
//! Conversion shells out to Calibre's `ebook-convert`, which picks the input
//! and output formats from the file extensions it is given. Every temporary
//! file this crate creates is removed on every exit path, except the
//! converted output, which is handed to the caller as a [`TempPath`].

mod convert;
pub mod error;
mod format;

pub use crate::convert::{Converted, Converter};
pub use crate::format::Format;
pub use tempfile::TempPath;
