use crate::{NATIVE_FORMAT, container_kind};
use crate::debounce::Debouncer;
use crate::error::{ErrorKind, Result};
use crate::ingest::{self, Outcome};
use crate::queue::Queue;
use crate::retrieve::{self, Release};
use crate::walk::walk;
use crate::watch::Watch;
use exn::{OptionExt, ResultExt};
use futures::StreamExt;
use libris_cache::{Book, BookId, Repository};
use libris_convert::{Converter, Format};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

const DEFAULT_WORKERS: usize = 5;
const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// An indexed directory of e-books.
///
/// Cheap to clone; every clone drives the same pipeline.
#[derive(Debug, Clone)]
pub struct Library {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    root: PathBuf,
    repo: Repository,
    workers: usize,
    debounce: Duration,
    converter: Option<Converter>,
    queue: Queue,
    running: AtomicBool,
    tasks: Mutex<JoinSet<()>>,
}

/// Configures a [`Library`] before it starts.
#[derive(Debug)]
pub struct Builder {
    root: PathBuf,
    repo: Repository,
    workers: usize,
    debounce: Duration,
    converter: Option<Converter>,
}

impl Builder {
    /// Number of workers processing queued files; at least one.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Quiet period after the last change to a file before it is processed.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Converter for formats other than the native one; without one, only
    /// native retrieval works.
    pub fn with_converter(mut self, converter: impl Into<Option<Converter>>) -> Self {
        self.converter = converter.into();
        self
    }

    /// Resolve the root directory and create the library.
    pub fn build(self) -> Result<Library> {
        let root = self.root.canonicalize().or_raise(|| ErrorKind::InvalidRoot(self.root.display().to_string()))?;
        if !root.is_dir() {
            exn::bail!(ErrorKind::InvalidRoot(root.display().to_string()));
        }
        let inner = Inner {
            root,
            repo: self.repo,
            workers: self.workers,
            debounce: self.debounce,
            converter: self.converter,
            queue: Queue::new(),
            running: AtomicBool::new(false),
            tasks: Mutex::new(JoinSet::new()),
        };
        Ok(Library { inner: Arc::new(inner) })
    }
}

impl Library {
    pub fn builder(root: impl Into<PathBuf>, repo: Repository) -> Builder {
        Builder {
            root: root.into(),
            repo,
            workers: DEFAULT_WORKERS,
            debounce: DEFAULT_DEBOUNCE,
            converter: None,
        }
    }

    /// The canonical root directory; stored container paths are relative to it.
    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    pub fn repository(&self) -> &Repository {
        &self.inner.repo
    }

    // =========================================================================
    // Ingestion
    // =========================================================================

    /// Start the watcher and the worker pool.
    ///
    /// Returns as soon as everything is started; the tasks run until `token`
    /// is cancelled (see [`stopped`](Self::stopped)). Failing to watch the
    /// root is fatal. A library can only be started once.
    #[instrument(skip_all, fields(root = %self.inner.root.display(), workers = self.inner.workers))]
    pub async fn run(&self, token: CancellationToken) -> Result<()> {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            exn::bail!(ErrorKind::AlreadyRunning);
        }
        let watch = match Watch::new(&self.inner.root) {
            Ok(watch) => watch,
            Err(e) => {
                self.inner.running.store(false, Ordering::SeqCst);
                return Err(e);
            },
        };
        let mut tasks = self.inner.tasks.lock().await;
        {
            let inner = self.inner.clone();
            let token = token.clone();
            let debouncer = Debouncer::new(inner.debounce);
            tasks.spawn(async move { watch.run(inner.root.clone(), debouncer, &inner.queue, token).await });
        }
        for worker in 0..self.inner.workers {
            tasks.spawn(work(self.inner.clone(), worker, token.clone()));
        }
        tracing::info!("Library started");
        Ok(())
    }

    /// Queue every eligible file below the root, returning how many were
    /// queued.
    ///
    /// Unreadable directories are logged and skipped. Files are processed by
    /// the workers started with [`run`](Self::run); use [`idle`](Self::idle)
    /// to wait for them.
    #[instrument(skip_all, fields(root = %self.inner.root.display()))]
    pub async fn scan(&self, token: &CancellationToken) -> Result<usize> {
        let root = &self.inner.root;
        let mut files = std::pin::pin!(walk(root));
        let mut queued = 0;
        while let Some(file) = files.next().await {
            if token.is_cancelled() {
                break;
            }
            let file = match file {
                Ok(file) => file,
                Err(e) => {
                    tracing::warn!(error = ?e, "Skipping unreadable directory");
                    continue;
                },
            };
            if container_kind(&file).is_none() {
                continue;
            }
            if let Ok(relative) = file.strip_prefix(root) {
                self.inner.queue.push(relative.to_path_buf());
                queued += 1;
            }
        }
        tracing::info!(queued, "Scan complete");
        Ok(queued)
    }

    /// Number of queued files not yet finished with.
    pub fn pending(&self) -> usize {
        self.inner.queue.pending()
    }

    /// Wait until every queued file has been processed.
    ///
    /// Only resolves while workers are running.
    pub async fn idle(&self) {
        self.inner.queue.idle().await
    }

    /// Hold a path as if a worker were processing it.
    #[cfg(test)]
    pub(crate) fn claim(&self, path: &Path) -> Option<crate::queue::Claim<'_>> {
        self.inner.queue.claim(path)
    }

    /// Wait for the watcher and workers to exit after cancellation.
    pub async fn stopped(&self) {
        let mut tasks = self.inner.tasks.lock().await;
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::warn!(error = %e, "Library task did not exit cleanly");
            }
        }
        self.inner.running.store(false, Ordering::SeqCst);
    }

    // =========================================================================
    // Retrieval
    // =========================================================================

    pub async fn search(&self, term: &str) -> Result<Vec<Book>> {
        self.inner.repo.search(term).await.or_raise(|| ErrorKind::Store)
    }

    pub async fn get(&self, id: BookId) -> Result<Book> {
        let book = self.inner.repo.get(id).await.or_raise(|| ErrorKind::Store)?;
        book.ok_or_raise(|| ErrorKind::BookNotFound(id))
    }

    /// Open a book in the requested format.
    ///
    /// The stream reads a temporary file when the book had to be extracted
    /// from an archive or converted; the returned [`Release`] removes any
    /// named temporary file, and must be kept until reading is done.
    #[instrument(skip(self))]
    pub async fn get_book(&self, id: BookId, format: Format) -> Result<(tokio::fs::File, Release)> {
        let book = self.get(id).await?;
        let root = self.inner.root.clone();
        let source = {
            let book = book.clone();
            tokio::task::spawn_blocking(move || retrieve::open(&root, &book)).await.or_raise(|| ErrorKind::Task)??
        };
        if format == NATIVE_FORMAT {
            return Ok((tokio::fs::File::from_std(source), Release::noop()));
        }
        let Some(converter) = &self.inner.converter else {
            exn::bail!(ErrorKind::ConverterUnavailable);
        };
        let converted =
            converter.convert(source, NATIVE_FORMAT, format).await.or_raise(|| ErrorKind::Conversion)?;
        tracing::debug!(id, %format, title = %book.metadata.title, "Book converted");
        Ok((converted.file, Release::new(converted.path)))
    }
}

/// A worker: process queued paths one at a time until cancelled.
async fn work(inner: Arc<Inner>, worker: usize, token: CancellationToken) {
    tracing::debug!(worker, "Worker started");
    loop {
        let ticket = tokio::select! {
            _ = token.cancelled() => break,
            ticket = inner.queue.pop() => ticket,
        };
        let Some(ticket) = ticket else { break };
        let path = ticket.path();
        let Some(kind) = container_kind(path) else { continue };
        let Some(_claim) = inner.queue.claim(path) else {
            tracing::debug!(worker, path = %path.display(), "Already being processed");
            continue;
        };
        match ingest::process(&inner.root, &inner.repo, path, kind).await {
            Ok(Outcome::AlreadyProcessed) => {
                tracing::debug!(worker, path = %path.display(), "Already processed; skipping");
            },
            Ok(Outcome::Stored(books)) => tracing::info!(worker, path = %path.display(), books, "Indexed"),
            Ok(Outcome::Empty) => {
                tracing::warn!(worker, path = %path.display(), "No readable documents; left unprocessed");
            },
            Err(e) => tracing::warn!(worker, path = %path.display(), error = ?e, "Failed to index"),
        }
    }
    tracing::debug!(worker, "Worker stopped");
}
