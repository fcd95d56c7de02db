use crate::Format;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::ffi::OsString;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tempfile::{Builder, NamedTempFile, TempPath};
use tokio::process::Command;
use tracing::instrument;

const PROGRAM: &str = "ebook-convert";
const TEMP_PREFIX: &str = "libris-";

/// Runs `ebook-convert` (or a stand-in accepting the same arguments).
#[derive(Debug, Clone)]
pub struct Converter {
    program: PathBuf,
    /// Placed before the source and output paths.
    args: Vec<OsString>,
    timeout: Option<Duration>,
    temp_dir: Option<PathBuf>,
}

/// The output of a successful conversion.
///
/// The file is deleted once `path` is dropped (or explicitly closed).
#[derive(Debug)]
pub struct Converted {
    pub file: tokio::fs::File,
    pub path: TempPath,
}

impl Converter {
    /// Find `ebook-convert` on the `PATH`.
    pub fn discover() -> Result<Self> {
        match which::which(PROGRAM) {
            Ok(program) => Ok(Self::new(program)),
            Err(_) => {
                tracing::info!("{PROGRAM} executable not found in PATH");
                exn::bail!(ErrorKind::ConverterNotFound);
            },
        }
    }

    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into(), args: Vec::new(), timeout: None, temp_dir: None }
    }

    /// Extra leading arguments, for wrappers such as `flatpak run <app>`.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Kill the converter if it runs longer than this. `None` waits forever.
    pub fn with_timeout(mut self, timeout: impl Into<Option<Duration>>) -> Self {
        self.timeout = timeout.into();
        self
    }

    /// Create temporary files here instead of the system temporary directory.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Convert a document from one format to another.
    ///
    /// The source is spooled to a temporary file first, since the converter
    /// only works on paths. That file is gone by the time this returns,
    /// whatever the outcome. Dropping the returned future kills the
    /// converter.
    #[instrument(skip(self, source), fields(program = %self.program.display()))]
    pub async fn convert<R>(&self, source: R, from: Format, to: Format) -> Result<Converted>
    where
        R: Read + Send + 'static,
    {
        let spool = self.temp_file(from)?;
        let spool = tokio::task::spawn_blocking(move || write_spool(source, spool))
            .await
            .or_raise(|| ErrorKind::Io)??;
        let output = self.temp_file(to).map(NamedTempFile::into_temp_path)?;

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(spool.path())
            .arg(&*output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let child = command.spawn().or_raise(|| ErrorKind::Spawn)?;
        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(timeout = ?limit, "Conversion timed out; converter killed");
                    exn::bail!(ErrorKind::Timeout(limit));
                },
            },
            None => child.wait_with_output().await,
        };
        let result = result.or_raise(|| ErrorKind::Io)?;
        drop(spool);

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr).trim().to_string();
            exn::bail!(ErrorKind::Failed { code: result.status.code(), stderr });
        }
        let file = tokio::fs::File::open(&output).await.or_raise(|| ErrorKind::Io)?;
        let size = file.metadata().await.or_raise(|| ErrorKind::Io)?.len();
        if size == 0 {
            exn::bail!(ErrorKind::EmptyOutput);
        }
        tracing::debug!(size, "Conversion finished");
        Ok(Converted { file, path: output })
    }

    fn temp_file(&self, format: Format) -> Result<NamedTempFile> {
        let suffix = format!(".{}", format.extension());
        let mut builder = Builder::new();
        builder.prefix(TEMP_PREFIX).suffix(&suffix);
        let file = match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        };
        file.or_raise(|| ErrorKind::Io)
    }
}

fn write_spool<R: Read>(mut source: R, mut file: NamedTempFile) -> Result<NamedTempFile> {
    std::io::copy(&mut source, &mut file).or_raise(|| ErrorKind::Io)?;
    file.flush().or_raise(|| ErrorKind::Io)?;
    Ok(file)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio::io::AsyncReadExt;

    const DOCUMENT: &[u8] = b"<FictionBook><body><p>Sing, O goddess</p></body></FictionBook>";

    /// A converter that runs `script` with the source and output as `$1` and `$2`.
    fn script(script: &str, dir: &Path) -> Converter {
        Converter::new("sh").with_args(["-c", script, "sh"]).with_temp_dir(dir)
    }

    fn leftovers(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[tokio::test]
    async fn test_convert() {
        let dir = tempfile::tempdir().unwrap();
        let converter = script(r#"cp "$1" "$2""#, dir.path());
        let mut converted = converter.convert(Cursor::new(DOCUMENT), Format::Fb2, Format::Epub).await.unwrap();
        let mut content = Vec::new();
        converted.file.read_to_end(&mut content).await.unwrap();
        assert_eq!(content, DOCUMENT);
        assert_eq!(converted.path.extension().unwrap(), "epub");
        // Only the output remains; the spooled source is gone.
        assert_eq!(leftovers(dir.path()), 1);
        drop(converted);
        assert_eq!(leftovers(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_source_keeps_its_extension() {
        let dir = tempfile::tempdir().unwrap();
        let converter = script(r#"case "$1" in *.fb2) echo ok > "$2" ;; *) exit 9 ;; esac"#, dir.path());
        converter.convert(Cursor::new(DOCUMENT), Format::Fb2, Format::Epub).await.unwrap();
    }

    #[tokio::test]
    async fn test_failure_captures_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let converter = script("echo 'unsupported input' >&2; exit 3", dir.path());
        let err = converter.convert(Cursor::new(DOCUMENT), Format::Fb2, Format::Epub).await.unwrap_err();
        match &*err {
            ErrorKind::Failed { code, stderr } => {
                assert_eq!(*code, Some(3));
                assert_eq!(stderr, "unsupported input");
            },
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(leftovers(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_empty_output() {
        let dir = tempfile::tempdir().unwrap();
        let converter = script("exit 0", dir.path());
        let err = converter.convert(Cursor::new(DOCUMENT), Format::Fb2, Format::Epub).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::EmptyOutput));
        assert_eq!(leftovers(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_timeout_kills_converter() {
        let dir = tempfile::tempdir().unwrap();
        let converter = script("sleep 10", dir.path()).with_timeout(Duration::from_millis(100));
        let started = std::time::Instant::now();
        let err = converter.convert(Cursor::new(DOCUMENT), Format::Fb2, Format::Epub).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Timeout(_)));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(leftovers(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_missing_program() {
        let dir = tempfile::tempdir().unwrap();
        let converter = Converter::new(dir.path().join("ebook-convert")).with_temp_dir(dir.path());
        let err = converter.convert(Cursor::new(DOCUMENT), Format::Fb2, Format::Epub).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Spawn));
        assert_eq!(leftovers(dir.path()), 0);
    }
}
