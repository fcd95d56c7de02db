use crate::book::{Book, ContainerKind, NewBook, Source};
use crate::error::{Error, ErrorKind};
use exn::{OptionExt, ResultExt};
use libris_extract::models::{Author, Metadata};
use std::path::PathBuf;
use time::UtcDateTime;

/// Number of bound parameters [`NewBookRow`] needs per inserted row.
pub(crate) const NEW_BOOK_COLUMNS: usize = 12;

#[derive(sqlx::FromRow)]
pub(crate) struct BookRow {
    id: i64,
    file_type: String,
    file_path: String,
    member_name: String,
    title: String,
    author_last_name: String,
    author_first_name: String,
    annotation: String,
    genre: String,
    published: String,
    language: String,
    has_cover: bool,
    indexed_at: i64,
}
impl TryFrom<BookRow> for Book {
    type Error = Error;
    fn try_from(row: BookRow) -> Result<Self, Self::Error> {
        let path = PathBuf::from(row.file_path);
        let source = match row.file_type.parse::<ContainerKind>()? {
            ContainerKind::Document => Source::Document { path },
            ContainerKind::Archive => Source::Archive { path, member: row.member_name },
        };
        Ok(Self {
            id: row.id,
            source,
            metadata: Metadata {
                title: row.title,
                author: Author::new(row.author_first_name, row.author_last_name),
                annotation: row.annotation,
                genre: row.genre,
                date: row.published,
                language: row.language,
                has_cover: row.has_cover,
            },
            indexed_at: UtcDateTime::from_unix_timestamp(row.indexed_at)
                .or_raise(|| ErrorKind::InvalidData("indexed at"))?,
        })
    }
}

/// Column values of a book about to be inserted (no identifier yet).
pub(crate) struct NewBookRow {
    pub(crate) file_type: String,
    pub(crate) file_path: String,
    pub(crate) member_name: String,
    pub(crate) title: String,
    pub(crate) author_last_name: String,
    pub(crate) author_first_name: String,
    pub(crate) annotation: String,
    pub(crate) genre: String,
    pub(crate) published: String,
    pub(crate) language: String,
    pub(crate) has_cover: bool,
    pub(crate) indexed_at: i64,
}
impl NewBookRow {
    pub(crate) fn new(book: &NewBook, indexed_at: UtcDateTime) -> Result<Self, Error> {
        let metadata = &book.metadata;
        Ok(Self {
            file_type: book.source.kind().to_string(),
            file_path: book.source.path().to_str().ok_or_raise(|| ErrorKind::InvalidData("path"))?.to_string(),
            member_name: book.source.member().to_string(),
            title: metadata.title.clone(),
            author_last_name: metadata.author.last_name.clone(),
            author_first_name: metadata.author.first_name.clone(),
            annotation: metadata.annotation.clone(),
            genre: metadata.genre.clone(),
            published: metadata.date.clone(),
            language: metadata.language.clone(),
            has_cover: metadata.has_cover,
            indexed_at: indexed_at.unix_timestamp(),
        })
    }
}
