//! libris - indexes a directory of FictionBook e-books and serves them.

mod cli;
mod error;

use crate::cli::Cli;
use crate::error::ErrorKind;
use clap::Parser;
use exn::ResultExt;
use libris_config::Config;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match Config::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e:?}");
            return ExitCode::FAILURE;
        },
    };

    // RUST_LOG wins over the configured level.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    // Logs go to stderr so `libris get` can stream a book to stdout.
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    match cli.run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let kind: &ErrorKind = &e;
            tracing::error!(error = %kind, "Command failed");
            eprintln!("{e:?}");
            ExitCode::FAILURE
        },
    }
}
