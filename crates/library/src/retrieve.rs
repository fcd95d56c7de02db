//! Opening the bytes behind a stored book.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use libris_cache::{Book, Source};
use libris_convert::TempPath;
use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::path::Path;
use zip::ZipArchive;
use zip::result::ZipError;

/// Cleanup handle returned alongside a book's byte stream.
///
/// For a converted book it owns the temporary output file, which is deleted
/// on [`release`](Self::release) or when the handle is dropped. For a book
/// served as-is there is nothing to clean up.
#[derive(Debug)]
#[must_use = "dropping a Release deletes the file behind the returned stream"]
pub struct Release {
    path: Option<TempPath>,
}

impl Release {
    pub(crate) fn noop() -> Self {
        Self { path: None }
    }

    pub(crate) fn new(path: TempPath) -> Self {
        Self { path: Some(path) }
    }

    /// The temporary file backing the stream, if there is one.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Delete the temporary file now, reporting failure.
    pub fn release(self) -> Result<()> {
        match self.path {
            Some(path) => path.close().or_raise(|| ErrorKind::Io),
            None => Ok(()),
        }
    }
}

/// Open the native bytes of a book, rewound to the start.
///
/// Archive members are copied into an anonymous temporary file, which the
/// operating system reclaims once the handle is closed.
pub(crate) fn open(root: &Path, book: &Book) -> Result<File> {
    let container = root.join(book.source.path());
    let file = File::open(&container).or_raise(|| match std::fs::exists(&container) {
        Ok(false) => ErrorKind::ContainerNotFound(book.source.path().display().to_string()),
        _ => ErrorKind::Io,
    })?;
    let member = match &book.source {
        Source::Document { .. } => return Ok(file),
        Source::Archive { member, .. } => member,
    };
    let mut archive = ZipArchive::new(file).or_raise(|| ErrorKind::Archive)?;
    let mut entry = match archive.by_name(member) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => exn::bail!(ErrorKind::MemberNotFound {
            path: book.source.path().display().to_string(),
            member: member.clone(),
        }),
        Err(e) => return Err(e).or_raise(|| ErrorKind::Archive),
    };
    let mut spool = tempfile::tempfile().or_raise(|| ErrorKind::Io)?;
    std::io::copy(&mut entry, &mut spool).or_raise(|| ErrorKind::Archive)?;
    spool.seek(SeekFrom::Start(0)).or_raise(|| ErrorKind::Io)?;
    Ok(spool)
}
