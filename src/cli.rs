//! Command-line interface.

use crate::error::{ErrorKind, Result};
use clap::{Parser, Subcommand};
use exn::ResultExt;
use libris_cache::{Book, Database, Repository};
use libris_config::Config;
use libris_library::{Converter, Format, Library};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

/// How long workers get to finish their current file on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "libris", about, version)]
pub struct Cli {
    /// Configuration file (defaults to config.toml in the platform config directory)
    #[arg(short, long, global = true, env = "LIBRIS_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Index the library, then keep watching it for changes until interrupted
    Serve,
    /// Index the library once and exit
    Scan,
    /// Search titles and author names
    Search {
        #[arg(required = true)]
        term: Vec<String>,
        /// Print matches as JSON
        #[arg(long)]
        json: bool,
    },
    /// Write a book to a file or standard output
    Get {
        id: i64,
        /// Output format (fb2 or epub)
        #[arg(short, long, default_value = "fb2", value_parser = parse_format)]
        format: Format,
        /// Write here instead of standard output
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show how many books are indexed
    Status {
        /// Print statistics as JSON
        #[arg(long)]
        json: bool,
    },
}

fn parse_format(name: &str) -> std::result::Result<Format, String> {
    name.parse().map_err(|e: libris_convert::error::Error| (*e).to_string())
}

impl Cli {
    pub async fn run(self, config: Config) -> Result<()> {
        let db = Database::connect(&config.database.path).await.or_raise(|| ErrorKind::Database)?;
        let library = library(&config, &db)?;
        let result = match self.command {
            Command::Serve => serve(&library).await,
            Command::Scan => scan(&library).await,
            Command::Search { term, json } => search(&library, &term.join(" "), json).await,
            Command::Get { id, format, output } => get(&library, id, format, output).await,
            Command::Status { json } => status(&library, json).await,
        };
        db.close().await;
        result
    }
}

fn library(config: &Config, db: &Database) -> Result<Library> {
    let converter = match &config.converter.program {
        Some(program) => Some(Converter::new(program)),
        None => Converter::discover().ok(),
    };
    let converter = converter.map(|c| c.with_args(&config.converter.args).with_timeout(config.converter.timeout()));
    if converter.is_none() {
        tracing::info!("No converter available; books can only be served as fb2");
    }
    Library::builder(&config.library.root, Repository::from(db))
        .with_workers(config.library.workers)
        .with_debounce(config.library.debounce())
        .with_converter(converter)
        .build()
        .or_raise(|| ErrorKind::Library)
}

async fn serve(library: &Library) -> Result<()> {
    let token = CancellationToken::new();
    library.run(token.clone()).await.or_raise(|| ErrorKind::Library)?;
    library.scan(&token).await.or_raise(|| ErrorKind::Library)?;
    shutdown_signal().await;
    tracing::info!("Shutting down");
    stop(library, token).await;
    Ok(())
}

async fn scan(library: &Library) -> Result<()> {
    let token = CancellationToken::new();
    library.run(token.clone()).await.or_raise(|| ErrorKind::Library)?;
    let queued = library.scan(&token).await.or_raise(|| ErrorKind::Library)?;
    tokio::select! {
        _ = library.idle() => {},
        _ = shutdown_signal() => tracing::warn!(pending = library.pending(), "Interrupted before the scan finished"),
    }
    stop(library, token).await;
    let stats = library.repository().stats().await.or_raise(|| ErrorKind::Library)?;
    println!("Scanned {queued} file(s); {} book(s) indexed from {} file(s)", stats.books, stats.containers);
    Ok(())
}

async fn stop(library: &Library, token: CancellationToken) {
    token.cancel();
    if tokio::time::timeout(SHUTDOWN_GRACE, library.stopped()).await.is_err() {
        tracing::warn!(grace = ?SHUTDOWN_GRACE, "Workers did not stop in time");
    }
}

async fn search(library: &Library, term: &str, json: bool) -> Result<()> {
    let books = library.search(term).await.or_raise(|| ErrorKind::Library)?;
    if json {
        let json = serde_json::to_string_pretty(&books).or_raise(|| ErrorKind::Output)?;
        println!("{json}");
        return Ok(());
    }
    for book in &books {
        println!("{}", summary(book));
    }
    if books.is_empty() {
        eprintln!("No books match \"{term}\"");
    }
    Ok(())
}

fn summary(book: &Book) -> String {
    let location = match book.source.member() {
        "" => book.source.path().display().to_string(),
        member => format!("{}:{member}", book.source.path().display()),
    };
    format!("{:>6}  {} - {}  ({location})", book.id, book.metadata.author, book.metadata.title)
}

async fn get(library: &Library, id: i64, format: Format, output: Option<PathBuf>) -> Result<()> {
    let (mut file, release) = library.get_book(id, format).await.or_raise(|| ErrorKind::Library)?;
    match output {
        Some(path) => {
            let mut out = tokio::fs::File::create(&path).await.or_raise(|| ErrorKind::Output)?;
            tokio::io::copy(&mut file, &mut out).await.or_raise(|| ErrorKind::Output)?;
            out.flush().await.or_raise(|| ErrorKind::Output)?;
            tracing::info!(path = %path.display(), %format, "Book written");
        },
        None => {
            let mut out = tokio::io::stdout();
            tokio::io::copy(&mut file, &mut out).await.or_raise(|| ErrorKind::Output)?;
            out.flush().await.or_raise(|| ErrorKind::Output)?;
        },
    }
    drop(file);
    release.release().or_raise(|| ErrorKind::Library)
}

async fn status(library: &Library, json: bool) -> Result<()> {
    let stats = library.repository().stats().await.or_raise(|| ErrorKind::Library)?;
    if json {
        let json = serde_json::to_string_pretty(&stats).or_raise(|| ErrorKind::Output)?;
        println!("{json}");
        return Ok(());
    }
    println!("root:        {}", library.root().display());
    println!("books:       {}", stats.books);
    println!("files:       {}", stats.containers);
    println!("index rows:  {}", stats.indexed);
    if !stats.is_consistent() {
        println!("warning: search index is out of step with the book table");
    }
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Could not listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::warn!(error = %e, "Could not listen for SIGTERM");
                std::future::pending::<()>().await;
            },
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();
    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_get() {
        let cli = Cli::try_parse_from(["libris", "get", "12", "--format", "epub", "-o", "iliad.epub"]).unwrap();
        match cli.command {
            Command::Get { id, format, output } => {
                assert_eq!(id, 12);
                assert_eq!(format, Format::Epub);
                assert_eq!(output, Some(PathBuf::from("iliad.epub")));
            },
            _ => panic!("expected the get command"),
        }
    }

    #[test]
    fn test_unknown_format() {
        assert!(Cli::try_parse_from(["libris", "get", "12", "--format", "pdf"]).is_err());
    }
}
