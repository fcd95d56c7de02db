//! Turning one queued container path into stored books.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use libris_cache::{ContainerKind, NewBook, Repository, Source};
use libris_extract::{extract, is_document_name, models::Metadata};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tokio::task::JoinSet;
use tracing::instrument;
use zip::ZipArchive;

/// What processing a container path amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    /// Books already exist for this path.
    AlreadyProcessed,
    /// This many books were stored.
    Stored(usize),
    /// Nothing in the container could be extracted; it stays unprocessed.
    Empty,
}

/// Process one container path (relative to `root`).
#[instrument(skip(root, repo), fields(path = %path.display()))]
pub(crate) async fn process(root: &Path, repo: &Repository, path: &Path, kind: ContainerKind) -> Result<Outcome> {
    if repo.is_processed(path).await.or_raise(|| ErrorKind::Store)? {
        return Ok(Outcome::AlreadyProcessed);
    }
    let absolute = root.join(path);
    let books = match kind {
        ContainerKind::Document => {
            let metadata = blocking(move || extract_document(&absolute)).await?;
            vec![NewBook::new(Source::document(path), metadata)]
        },
        ContainerKind::Archive => extract_archive(absolute, path).await?,
    };
    if books.is_empty() {
        return Ok(Outcome::Empty);
    }
    let stored = repo.store(&books).await.or_raise(|| ErrorKind::Store)?;
    Ok(Outcome::Stored(stored.len()))
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.or_raise(|| ErrorKind::Task)?
}

fn extract_document(path: &Path) -> Result<Metadata> {
    let file = File::open(path).or_raise(|| ErrorKind::Io)?;
    extract(BufReader::new(file)).or_raise(|| ErrorKind::Extract)
}

/// Extract every document in an archive concurrently, then collect the
/// successes in archive order. A member failing only drops that member.
async fn extract_archive(absolute: PathBuf, path: &Path) -> Result<Vec<NewBook>> {
    let members = {
        let absolute = absolute.clone();
        blocking(move || list_members(&absolute)).await?
    };
    tracing::debug!(members = members.len(), "Extracting archive members");

    let mut tasks = JoinSet::new();
    for (index, name) in members {
        let absolute = absolute.clone();
        tasks.spawn_blocking(move || {
            let metadata = extract_member(&absolute, index);
            (index, name, metadata)
        });
    }
    let mut extracted = Vec::with_capacity(tasks.len());
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, name, Ok(metadata))) => extracted.push((index, name, metadata)),
            Ok((_, name, Err(e))) => tracing::warn!(member = %name, error = ?e, "Skipping archive member"),
            Err(e) => tracing::warn!(error = %e, "Archive member task failed"),
        }
    }
    extracted.sort_by_key(|(index, _, _)| *index);
    Ok(extracted
        .into_iter()
        .map(|(_, name, metadata)| NewBook::new(Source::archive(path, name), metadata))
        .collect())
}

/// Indices and names of the document members of an archive.
fn list_members(path: &Path) -> Result<Vec<(usize, String)>> {
    let file = File::open(path).or_raise(|| ErrorKind::Io)?;
    let mut archive = ZipArchive::new(file).or_raise(|| ErrorKind::Archive)?;
    let mut members = Vec::new();
    for index in 0..archive.len() {
        let entry = archive.by_index_raw(index).or_raise(|| ErrorKind::Archive)?;
        if !entry.is_dir() && is_document_name(entry.name()) {
            members.push((index, entry.name().to_string()));
        }
    }
    Ok(members)
}

/// Each member opens its own handle; `ZipArchive` reads through one cursor.
fn extract_member(path: &Path, index: usize) -> Result<Metadata> {
    let file = File::open(path).or_raise(|| ErrorKind::Io)?;
    let mut archive = ZipArchive::new(file).or_raise(|| ErrorKind::Archive)?;
    let member = archive.by_index(index).or_raise(|| ErrorKind::Archive)?;
    extract(BufReader::new(member)).or_raise(|| ErrorKind::Extract)
}
