//! Configuration loading and validation for libris.
//!
//! Sources, lowest to highest precedence:
//! 1. Built-in defaults.
//! 2. A TOML file: the path given on the command line, otherwise
//!    `config.toml` in the platform configuration directory (if present).
//! 3. Environment variables prefixed `LIBRIS_`, nested keys separated by a
//!    double underscore (`LIBRIS_LIBRARY__ROOT=/srv/books`).

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const APPLICATION: &str = "libris";
const CONFIG_FILE: &str = "config.toml";
const DATABASE_FILE: &str = "library.sqlite3";
const ENV_PREFIX: &str = "LIBRIS_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub library: LibraryConfig,
    pub database: DatabaseConfig,
    pub converter: ConverterConfig,
    /// Default `tracing` filter directive; `RUST_LOG` still wins.
    pub log_level: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// The directory tree to index.
    pub root: PathBuf,
    pub workers: usize,
    /// Quiet period after the last filesystem event before a file is queued.
    pub debounce_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    /// Looked up on the `PATH` as `ebook-convert` when unset.
    pub program: Option<PathBuf>,
    /// Arguments placed before the source and output paths.
    pub args: Vec<String>,
    /// Zero disables the timeout.
    pub timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            library: LibraryConfig::default(),
            database: DatabaseConfig::default(),
            converter: ConverterConfig { timeout_secs: 300, ..Default::default() },
            log_level: "info".to_string(),
        }
    }
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self { root: PathBuf::new(), workers: 5, debounce_ms: 500 }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        let path = match project_dirs() {
            Some(dirs) => dirs.data_dir().join(DATABASE_FILE),
            None => PathBuf::from(DATABASE_FILE),
        };
        Self { path }
    }
}

impl LibraryConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl ConverterConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", APPLICATION)
}

impl Config {
    /// Load and validate the configuration.
    ///
    /// An explicit `file` must exist; the default file is optional.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let file = match file {
            Some(path) if !path.is_file() => {
                exn::bail!(ErrorKind::FileNotFound(path.display().to_string()));
            },
            Some(path) => Some(path.to_path_buf()),
            None => project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE)),
        };
        if let Some(path) = &file {
            tracing::debug!(path = %path.display(), "Reading configuration file");
        }
        Self::from_figment(Self::figment(file.as_deref()))
    }

    /// The layered configuration sources, without validation.
    pub fn figment(file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = file {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.library.root.as_os_str().is_empty() {
            exn::bail!(ErrorKind::Invalid("library.root"));
        }
        if self.library.workers == 0 {
            exn::bail!(ErrorKind::Invalid("library.workers"));
        }
        if self.database.path.as_os_str().is_empty() {
            exn::bail!(ErrorKind::Invalid("database.path"));
        }
        if self.converter.program.as_ref().is_some_and(|p| p.as_os_str().is_empty()) {
            exn::bail!(ErrorKind::Invalid("converter.program"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use rstest::rstest;

    fn from_toml(toml: &str) -> Result<Config> {
        Config::from_figment(Figment::from(Serialized::defaults(Config::default())).merge(Toml::string(toml)))
    }

    #[test]
    fn test_defaults() {
        let config = from_toml("library.root = '/srv/books'").unwrap();
        assert_eq!(config.library.root, Path::new("/srv/books"));
        assert_eq!(config.library.workers, 5);
        assert_eq!(config.library.debounce(), Duration::from_millis(500));
        assert_eq!(config.converter.timeout(), Some(Duration::from_secs(300)));
        assert_eq!(config.converter.program, None);
        assert_eq!(config.log_level, "info");
        assert!(config.database.path.ends_with(DATABASE_FILE));
    }

    #[test]
    fn test_file_overrides_defaults() {
        let config = from_toml(
            r#"
                log_level = "debug"
                [library]
                root = "/srv/books"
                workers = 2
                debounce_ms = 50
                [database]
                path = "/var/lib/libris.sqlite3"
                [converter]
                program = "/opt/calibre/ebook-convert"
                args = ["--verbose"]
                timeout_secs = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.library.workers, 2);
        assert_eq!(config.library.debounce(), Duration::from_millis(50));
        assert_eq!(config.database.path, Path::new("/var/lib/libris.sqlite3"));
        assert_eq!(config.converter.program.as_deref(), Some(Path::new("/opt/calibre/ebook-convert")));
        assert_eq!(config.converter.args, ["--verbose"]);
        assert_eq!(config.converter.timeout(), None);
        assert_eq!(config.log_level, "debug");
    }

    #[rstest]
    #[case("library.workers = 1", "library.root")]
    #[case("library.root = '/srv/books'\nlibrary.workers = 0", "library.workers")]
    #[case("library.root = '/srv/books'\ndatabase.path = ''", "database.path")]
    #[case("library.root = '/srv/books'\nconverter.program = ''", "converter.program")]
    fn test_invalid(#[case] toml: &str, #[case] field: &str) {
        let err = from_toml(toml).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invalid(f) if *f == field));
    }

    #[test]
    fn test_wrong_type() {
        let err = from_toml("library.root = '/srv/books'\nlibrary.workers = 'many'").unwrap_err();
        assert!(matches!(&*err, ErrorKind::Load));
    }

    #[test]
    fn test_explicit_file_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(Some(&dir.path().join("missing.toml"))).unwrap_err();
        assert!(matches!(&*err, ErrorKind::FileNotFound(_)));
    }

    #[test]
    fn test_environment_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("libris.toml", "[library]\nroot = '/srv/books'\nworkers = 3")?;
            jail.set_env("LIBRIS_LIBRARY__WORKERS", "7");
            jail.set_env("LIBRIS_CONVERTER__TIMEOUT_SECS", "10");
            let config = Config::load(Some(Path::new("libris.toml"))).map_err(|e| format!("{e:?}"))?;
            assert_eq!(config.library.root, Path::new("/srv/books"));
            assert_eq!(config.library.workers, 7);
            assert_eq!(config.converter.timeout(), Some(Duration::from_secs(10)));
            Ok(())
        });
    }
}
