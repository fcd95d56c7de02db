//! SQLite book store with a full-text search index.
//!
//! This crate persists the metadata of every indexed book and keeps an FTS5
//! projection of titles and author names in step with it. The files in the
//! library are the source of truth: if the database is deleted, it can be
//! rebuilt by scanning the library again.
//!
//! # Architecture
//! - **Books**: one row per document, either a loose `.fb2` file or a member
//!   of a `.zip` archive, keyed by an identifier that is never reused.
//! - **Search index**: one row per book (same rowid), holding only the title
//!   and author names.
//!
//! A container path counts as processed once any book references it, which
//! is why [`Repository::store`] writes a whole archive in one transaction.

pub mod book;
mod db;
pub mod error;
mod models;
mod repo;

pub use crate::book::{Book, BookId, ContainerKind, NewBook, Source};
pub use crate::db::Database;
pub use crate::repo::{Repository, Stats};
