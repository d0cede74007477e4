//! Runtime configuration.
//!
//! Values are layered: built-in defaults, then `rdfsearch.toml` in the data
//! directory, then `RDFSEARCH_*` environment variables (a `.env` file is
//! honored through `dotenvy`). Command-line flags override all of these.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::search::tantivy::{DEFAULT_WRITER_HEAP, index_path};

pub const CONFIG_FILE_NAME: &str = "rdfsearch.toml";
pub const DB_FILE_NAME: &str = "statements.db";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no home directory available to derive a data directory")]
    NoDataDir,

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

/// Paths and tuning knobs shared by every backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchConfig {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub index_dir: PathBuf,
    /// Rows per FTS5 page.
    pub batch_size: usize,
    /// Hit cap for tantivy searches.
    pub max_results: usize,
    /// Tantivy writer heap in bytes.
    pub writer_heap: usize,
    /// SQLite busy timeout; also bounds connection release.
    pub busy_timeout: Duration,
}

/// Shape of `rdfsearch.toml`. Relative paths resolve against the data dir.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    db_path: Option<PathBuf>,
    index_dir: Option<PathBuf>,
    batch_size: Option<usize>,
    max_results: Option<usize>,
    writer_heap: Option<usize>,
    busy_timeout_ms: Option<u64>,
}

impl SearchConfig {
    /// Defaults rooted at `data_dir`.
    pub fn for_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            db_path: data_dir.join(DB_FILE_NAME),
            index_dir: index_path(&data_dir),
            data_dir,
            batch_size: 256,
            max_results: 1_000,
            writer_heap: DEFAULT_WRITER_HEAP,
            busy_timeout: Duration::from_secs(5),
        }
    }

    /// Load from environment and config file.
    ///
    /// The data directory comes from `data_dir_override`, then
    /// `RDFSEARCH_DATA_DIR`, then the platform default.
    pub fn load(data_dir_override: Option<PathBuf>) -> Result<Self, ConfigError> {
        let data_dir = match data_dir_override {
            Some(dir) => dir,
            None => match dotenvy::var("RDFSEARCH_DATA_DIR") {
                Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
                _ => default_data_dir()?,
            },
        };
        let mut cfg = Self::for_data_dir(data_dir);
        let file = cfg.data_dir.join(CONFIG_FILE_NAME);
        if file.exists() {
            cfg.apply_file(&file)?;
        }
        cfg.apply_env();
        cfg.validate()?;
        debug!(?cfg, "configuration loaded");
        Ok(cfg)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Overlay values from a TOML file.
    pub fn apply_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: FileConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        if let Some(db_path) = file.db_path {
            self.db_path = self.data_dir.join(db_path);
        }
        if let Some(index_dir) = file.index_dir {
            self.index_dir = self.data_dir.join(index_dir);
        }
        if let Some(v) = file.batch_size {
            self.batch_size = v;
        }
        if let Some(v) = file.max_results {
            self.max_results = v;
        }
        if let Some(v) = file.writer_heap {
            self.writer_heap = v;
        }
        if let Some(ms) = file.busy_timeout_ms {
            self.busy_timeout = Duration::from_millis(ms);
        }
        Ok(())
    }

    /// Overlay `RDFSEARCH_*` variables. Unparseable numbers are ignored.
    pub fn apply_env(&mut self) {
        if let Ok(path) = dotenvy::var("RDFSEARCH_DB") {
            self.db_path = PathBuf::from(path);
        }
        if let Ok(path) = dotenvy::var("RDFSEARCH_INDEX_DIR") {
            self.index_dir = PathBuf::from(path);
        }
        if let Some(v) = env_number("RDFSEARCH_BATCH_SIZE") {
            self.batch_size = v;
        }
        if let Some(v) = env_number("RDFSEARCH_MAX_RESULTS") {
            self.max_results = v;
        }
        if let Some(v) = env_number("RDFSEARCH_WRITER_HEAP") {
            self.writer_heap = v;
        }
        if let Some(ms) = env_number("RDFSEARCH_BUSY_TIMEOUT_MS") {
            self.busy_timeout = Duration::from_millis(ms);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "batch_size",
                reason: "must be at least 1".into(),
            });
        }
        if self.max_results == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_results",
                reason: "must be at least 1".into(),
            });
        }
        // Tantivy refuses writer heaps below 15MB per thread.
        if self.writer_heap < 15_000_000 {
            return Err(ConfigError::InvalidValue {
                key: "writer_heap",
                reason: format!("{} bytes is below the 15000000 byte minimum", self.writer_heap),
            });
        }
        Ok(())
    }
}

fn env_number<T: std::str::FromStr>(key: &str) -> Option<T> {
    let val = dotenvy::var(key).ok()?;
    match val.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = %val, "ignoring unparseable environment value");
            None
        }
    }
}

pub fn default_data_dir() -> Result<PathBuf, ConfigError> {
    directories::ProjectDirs::from("org", "rdf-search", "rdfsearch")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or(ConfigError::NoDataDir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    const VARS: &[&str] = &[
        "RDFSEARCH_DATA_DIR",
        "RDFSEARCH_DB",
        "RDFSEARCH_INDEX_DIR",
        "RDFSEARCH_BATCH_SIZE",
        "RDFSEARCH_MAX_RESULTS",
        "RDFSEARCH_WRITER_HEAP",
        "RDFSEARCH_BUSY_TIMEOUT_MS",
    ];

    fn clear_env() {
        for var in VARS {
            // SAFETY: env-mutating tests are serialized.
            unsafe { std::env::remove_var(var) };
        }
    }

    #[test]
    #[serial]
    fn defaults_derive_from_data_dir() {
        clear_env();
        let tmp = TempDir::new().unwrap();
        let cfg = SearchConfig::load(Some(tmp.path().to_path_buf())).unwrap();
        assert_eq!(cfg, SearchConfig::for_data_dir(tmp.path()));
        assert_eq!(cfg.db_path, tmp.path().join("statements.db"));
        assert!(cfg.index_dir.ends_with("index/v1"));
    }

    #[test]
    #[serial]
    fn env_overrides_file() {
        clear_env();
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join(CONFIG_FILE_NAME),
            "batch_size = 10\nmax_results = 20\ndb_path = \"custom.db\"\n",
        )
        .unwrap();
        unsafe { std::env::set_var("RDFSEARCH_MAX_RESULTS", "7") };
        unsafe { std::env::set_var("RDFSEARCH_BUSY_TIMEOUT_MS", "not-a-number") };

        let cfg = SearchConfig::load(Some(tmp.path().to_path_buf())).unwrap();
        clear_env();

        assert_eq!(cfg.batch_size, 10);
        assert_eq!(cfg.max_results, 7);
        assert_eq!(cfg.db_path, tmp.path().join("custom.db"));
        assert_eq!(cfg.busy_timeout, Duration::from_secs(5));
    }

    #[test]
    #[serial]
    fn data_dir_from_env() {
        clear_env();
        let tmp = TempDir::new().unwrap();
        unsafe { std::env::set_var("RDFSEARCH_DATA_DIR", tmp.path()) };
        let cfg = SearchConfig::from_env().unwrap();
        clear_env();
        assert_eq!(cfg.data_dir, tmp.path());
    }

    #[test]
    #[serial]
    fn bad_file_and_zero_values_are_errors() {
        clear_env();
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILE_NAME);

        std::fs::write(&path, "unknown_key = 1\n").unwrap();
        assert!(matches!(
            SearchConfig::load(Some(tmp.path().to_path_buf())),
            Err(ConfigError::Parse { .. })
        ));

        std::fs::write(&path, "batch_size = 0\n").unwrap();
        assert!(matches!(
            SearchConfig::load(Some(tmp.path().to_path_buf())),
            Err(ConfigError::InvalidValue { key: "batch_size", .. })
        ));
    }
}
