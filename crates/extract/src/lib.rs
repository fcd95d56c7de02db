//! Metadata extraction for FictionBook 2 (`.fb2`) documents.
//!
//! The extractor is a pure function over a byte stream: it has no shared
//! state and never buffers the whole document, so it is safe to run many of
//! them concurrently (one per archive member, for example).

mod consts;
pub mod error;
mod extract;
pub mod models;

use std::io::BufRead;
use std::path::Path;
use tracing::instrument;

use crate::error::Result;
pub use crate::extract::Extractor;
use crate::models::Metadata;

/// File extension of a loose FictionBook document.
pub const DOCUMENT_EXTENSION: &str = "fb2";

/// Easy, top-level entrypoint for the extraction of [`Metadata`] from a
/// document stream.
///
/// The whole stream is consumed so that a document that is broken anywhere
/// (not just in its header) is reported as malformed instead of yielding a
/// partially-filled record.
#[instrument(skip_all)]
pub fn extract<R: BufRead>(source: R) -> Result<Metadata> {
    Extractor::new(source).metadata()
}

/// Returns `true` if the name (file path or archive member name) has the
/// FictionBook extension, ignoring ASCII case.
///
/// ```rust
/// use libris_extract::is_document_name;
/// assert!(is_document_name("books/The Iliad.FB2"));
/// assert!(!is_document_name("books/The Iliad.fb2.zip"));
/// ```
pub fn is_document_name(name: impl AsRef<Path>) -> bool {
    name.as_ref()
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(DOCUMENT_EXTENSION))
}
