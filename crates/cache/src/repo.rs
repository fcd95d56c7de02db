//! Repository for book records and their search-index projection.
//!
//! The `books` table and the `books_fts` index are written together, in the
//! same transaction, so every row in one always has exactly one row in the
//! other.

use crate::Database;
use crate::book::{Book, BookId, NewBook};
use crate::error::{ErrorKind, Result};
use crate::models::{BookRow, NEW_BOOK_COLUMNS, NewBookRow};
use exn::{OptionExt, ResultExt};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use time::UtcDateTime;
use tokio::sync::Mutex;
use tracing::instrument;

/// SQLite refuses statements with more bound parameters than this.
const MAX_BOUND_PARAMETERS: usize = 32766;
const DEFAULT_CHUNK_SIZE: usize = MAX_BOUND_PARAMETERS / NEW_BOOK_COLUMNS;

/// Row counts describing the state of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Stats {
    /// Rows in the primary table.
    pub books: i64,
    /// Rows in the search index.
    pub indexed: i64,
    /// Primary rows with a matching search-index row.
    pub consistent: i64,
    /// Distinct container paths (processed files).
    pub containers: i64,
}
impl Stats {
    /// Every book has exactly one search-index row, and vice versa.
    pub fn is_consistent(&self) -> bool {
        self.books == self.indexed && self.books == self.consistent
    }
}

/// Repository for managing books in the store.
///
/// Every operation, reads included, runs under one lock shared by all
/// repositories created from the same [`Database`].
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
    lock: Arc<Mutex<()>>,
    chunk_size: usize,
}
impl From<&Database> for Repository {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone(), lock: db.lock().clone(), chunk_size: DEFAULT_CHUNK_SIZE }
    }
}
impl Repository {
    /// Limit how many books go into a single `INSERT` statement.
    ///
    /// The default is as many as SQLite's bound-parameter ceiling allows.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.clamp(1, DEFAULT_CHUNK_SIZE);
        self
    }

    fn sqlx_hates_paths(path: impl AsRef<Path>) -> Result<String> {
        Ok(path.as_ref().to_str().ok_or_raise(|| ErrorKind::InvalidData("path"))?.to_string())
    }

    // =========================================================================
    // Insert
    // =========================================================================

    /// Store a batch of books, assigning each an identifier.
    ///
    /// The whole batch is written in one transaction, however many `INSERT`
    /// statements it takes: either every book (and its search-index row) is
    /// stored, or none is. A book that already exists for the same container
    /// path and member name fails the entire batch.
    ///
    /// Returns the stored books in the order they were given.
    #[instrument(skip_all, fields(books = books.len()))]
    pub async fn store(&self, books: &[NewBook]) -> Result<Vec<Book>> {
        if books.is_empty() {
            exn::bail!(ErrorKind::EmptyBatch);
        }
        let now = UtcDateTime::now().unix_timestamp();
        let indexed_at = UtcDateTime::from_unix_timestamp(now).or_raise(|| ErrorKind::InvalidData("indexed at"))?;
        let rows = books.iter().map(|book| NewBookRow::new(book, indexed_at)).collect::<Result<Vec<_>>>()?;

        let _guard = self.lock.lock().await;
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        let mut ids = Vec::with_capacity(rows.len());
        for chunk in rows.chunks(self.chunk_size) {
            let mut insert = QueryBuilder::<Sqlite>::new(
                "INSERT INTO books (file_type, file_path, member_name, title, author_last_name, \
                 author_first_name, annotation, genre, published, language, has_cover, indexed_at) ",
            );
            insert.push_values(chunk, |mut b, row| {
                b.push_bind(row.file_type.as_str())
                    .push_bind(row.file_path.as_str())
                    .push_bind(row.member_name.as_str())
                    .push_bind(row.title.as_str())
                    .push_bind(row.author_last_name.as_str())
                    .push_bind(row.author_first_name.as_str())
                    .push_bind(row.annotation.as_str())
                    .push_bind(row.genre.as_str())
                    .push_bind(row.published.as_str())
                    .push_bind(row.language.as_str())
                    .push_bind(row.has_cover)
                    .push_bind(row.indexed_at);
            });
            insert.push(" RETURNING id, file_path, member_name");
            let returned: Vec<(BookId, String, String)> =
                insert.build_query_as().fetch_all(&mut *tx).await.or_raise(|| ErrorKind::Database)?;
            // RETURNING makes no promise about row order.
            let returned: HashMap<(String, String), BookId> =
                returned.into_iter().map(|(id, path, member)| ((path, member), id)).collect();
            let chunk_ids = chunk
                .iter()
                .map(|row| {
                    returned
                        .get(&(row.file_path.clone(), row.member_name.clone()))
                        .copied()
                        .ok_or_raise(|| ErrorKind::InvalidData("returned identifier"))
                })
                .collect::<Result<Vec<_>>>()?;

            let mut index = QueryBuilder::<Sqlite>::new(
                "INSERT INTO books_fts (rowid, title, author_last_name, author_first_name) ",
            );
            index.push_values(chunk.iter().zip(&chunk_ids), |mut b, (row, id)| {
                b.push_bind(*id)
                    .push_bind(row.title.as_str())
                    .push_bind(row.author_last_name.as_str())
                    .push_bind(row.author_first_name.as_str());
            });
            index.build().execute(&mut *tx).await.or_raise(|| ErrorKind::Database)?;
            ids.extend(chunk_ids);
        }
        // Dropping an uncommitted transaction rolls it back, so every early
        // return above leaves the store untouched.
        tx.commit().await.or_raise(|| ErrorKind::Database)?;

        Ok(books
            .iter()
            .zip(ids)
            .map(|(book, id)| Book {
                id,
                source: book.source.clone(),
                metadata: book.metadata.clone(),
                indexed_at,
            })
            .collect())
    }

    // =========================================================================
    // Get/Fetch
    // =========================================================================

    /// Whether any book references the given container path.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn is_processed(&self, path: impl AsRef<Path>) -> Result<bool> {
        let path = Self::sqlx_hates_paths(path)?;
        let _guard = self.lock.lock().await;
        sqlx::query_scalar(include_str!("../queries/is_processed.sql"))
            .bind(path)
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)
    }

    /// Get a book by its identifier.
    #[instrument(skip(self))]
    pub async fn get(&self, id: BookId) -> Result<Option<Book>> {
        let _guard = self.lock.lock().await;
        let row: Option<BookRow> = sqlx::query_as(include_str!("../queries/get_by_id.sql"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(Book::try_from).transpose()
    }

    /// List every book stored for a container path, in identifier order.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn list_by_path(&self, path: impl AsRef<Path>) -> Result<Vec<Book>> {
        let path = Self::sqlx_hates_paths(path)?;
        let _guard = self.lock.lock().await;
        let rows: Vec<BookRow> = sqlx::query_as(include_str!("../queries/list_by_path.sql"))
            .bind(path)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(Book::try_from).collect()
    }

    /// Search titles and author names.
    ///
    /// Every word of the term must prefix-match a word of the title or of an
    /// author name; results are ordered by relevance. A term without any
    /// words matches nothing.
    #[instrument(skip(self))]
    pub async fn search(&self, term: &str) -> Result<Vec<Book>> {
        let Some(expression) = match_expression(term) else {
            return Ok(Vec::new());
        };
        let _guard = self.lock.lock().await;
        let rows: Vec<BookRow> = sqlx::query_as(include_str!("../queries/search.sql"))
            .bind(expression)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(Book::try_from).collect()
    }

    /// Count rows in the store and its search index.
    #[instrument(skip(self))]
    pub async fn stats(&self) -> Result<Stats> {
        let _guard = self.lock.lock().await;
        sqlx::query_as(include_str!("../queries/stats.sql"))
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)
    }
}

/// Turn free text into an FTS5 query: quoted prefix tokens, implicitly ANDed.
fn match_expression(term: &str) -> Option<String> {
    let tokens: Vec<String> = term
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| format!("\"{token}\"*"))
        .collect();
    (!tokens.is_empty()).then(|| tokens.join(" "))
}
