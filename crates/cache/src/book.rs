//! Book records as stored in (and returned from) the repository.

use crate::error::{Error, ErrorKind};
use derive_more::Display;
use libris_extract::models::Metadata;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use time::UtcDateTime;

/// Store-assigned identifier of a book. Never reused.
pub type BookId = i64;

/// The kind of file a book lives in.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    /// A loose `.fb2` document.
    #[display("fb2")]
    Document,
    /// A member of a `.zip` archive.
    #[display("zip")]
    Archive,
}
impl FromStr for ContainerKind {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fb2" => Ok(Self::Document),
            "zip" => Ok(Self::Archive),
            _ => exn::bail!(ErrorKind::InvalidData("container kind")),
        }
    }
}

/// Where the bytes of a book can be found, relative to the library root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize), serde(tag = "kind", rename_all = "lowercase"))]
pub enum Source {
    Document { path: PathBuf },
    Archive { path: PathBuf, member: String },
}
impl Source {
    pub fn document(path: impl Into<PathBuf>) -> Self {
        Self::Document { path: path.into() }
    }

    pub fn archive(path: impl Into<PathBuf>, member: impl Into<String>) -> Self {
        Self::Archive { path: path.into(), member: member.into() }
    }

    pub fn kind(&self) -> ContainerKind {
        match self {
            Self::Document { .. } => ContainerKind::Document,
            Self::Archive { .. } => ContainerKind::Archive,
        }
    }

    /// The container path: the loose document itself, or the archive.
    pub fn path(&self) -> &Path {
        match self {
            Self::Document { path } | Self::Archive { path, .. } => path,
        }
    }

    /// The member name inside the archive; empty for loose documents.
    pub fn member(&self) -> &str {
        match self {
            Self::Document { .. } => "",
            Self::Archive { member, .. } => member,
        }
    }
}

/// A book that has been extracted but not yet stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBook {
    pub source: Source,
    pub metadata: Metadata,
}
impl NewBook {
    pub fn new(source: Source, metadata: Metadata) -> Self {
        Self { source, metadata }
    }
}

/// A stored book.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Book {
    pub id: BookId,
    pub source: Source,
    pub metadata: Metadata,
    /// When the book was first indexed.
    #[cfg_attr(feature = "serde", serde(serialize_with = "serialize_timestamp"))]
    pub indexed_at: UtcDateTime,
}

#[cfg(feature = "serde")]
fn serialize_timestamp<S: serde::Serializer>(value: &UtcDateTime, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_i64(value.unix_timestamp())
}
