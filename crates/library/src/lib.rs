//! Indexing and retrieval for a directory of FictionBook e-books.
//!
//! A [`Library`] discovers `.fb2` documents and `.zip` archives of them,
//! either with a one-shot [`scan`](Library::scan) or live through a
//! filesystem watcher, and hands each to a fixed pool of workers:
//!
//! ```text
//! scan ─────────────────────┐
//! watcher ──► debounce ─────┴──► queue ──► workers ──► extract ──► store
//! ```
//!
//! Archives are extracted member by member in parallel, and stored in one
//! transaction so an archive is either fully indexed or not at all. Books are
//! read back with [`Library::get_book`], converted on the way out when a
//! format other than FictionBook is asked for.

mod debounce;
pub mod error;
mod ingest;
mod library;
mod queue;
mod retrieve;
mod walk;
mod watch;


pub use crate::library::{Builder, Library};
pub use crate::retrieve::Release;
pub use libris_convert::{Converter, Format};

use libris_cache::ContainerKind;
use std::path::Path;

/// Extension of archives holding documents.
pub const ARCHIVE_EXTENSION: &str = "zip";
/// The format books are indexed in and served as without conversion.
pub const NATIVE_FORMAT: Format = Format::Fb2;

/// The container kind a file would be indexed as, judging by its name.
///
/// ```
/// use libris_library::container_kind;
/// use libris_cache::ContainerKind;
///
/// assert_eq!(container_kind("books/Iliad.ZIP"), Some(ContainerKind::Archive));
/// assert_eq!(container_kind("republic.fb2"), Some(ContainerKind::Document));
/// assert_eq!(container_kind("cover.jpg"), None);
/// ```
pub fn container_kind(path: impl AsRef<Path>) -> Option<ContainerKind> {
    let path = path.as_ref();
    if libris_extract::is_document_name(path) {
        return Some(ContainerKind::Document);
    }
    path.extension()
        .is_some_and(|extension| extension.eq_ignore_ascii_case(ARCHIVE_EXTENSION))
        .then_some(ContainerKind::Archive)
}
