//! Element and attribute names of the FictionBook 2 schema that carry
//! bibliographic metadata. All comparisons are on local names, so namespace
//! prefixes (`l:href`, `xlink:href`) don't matter.

pub(crate) const ROOT: &[u8] = b"FictionBook";

pub(crate) const BOOK_TITLE: &[u8] = b"book-title";
pub(crate) const AUTHOR: &[u8] = b"author";
pub(crate) const FIRST_NAME: &[u8] = b"first-name";
pub(crate) const LAST_NAME: &[u8] = b"last-name";
pub(crate) const ANNOTATION: &[u8] = b"annotation";
pub(crate) const GENRE: &[u8] = b"genre";
pub(crate) const DATE: &[u8] = b"date";
pub(crate) const LANG: &[u8] = b"lang";
pub(crate) const COVERPAGE: &[u8] = b"coverpage";
pub(crate) const IMAGE: &[u8] = b"image";

pub(crate) const HREF: &[u8] = b"href";
pub(crate) const VALUE: &[u8] = b"value";
