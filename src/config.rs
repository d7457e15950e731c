use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::model::CodingSystemVersion;

pub const DB_ENV: &str = "ICD10_IMPORT_DB";
pub const LOG_ENV: &str = "ICD10_IMPORT_LOG";
pub const LOG_RETENTION_ENV: &str = "ICD10_IMPORT_LOG_RETENTION";
pub const DEFAULT_LOG_FILTER: &str = "icd10_import=info,sqlx=warn";
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 100;

const APP_DIR: &str = "icd10-import";
const DB_FILE: &str = "diagnosis.sqlite3";

/// Connection settings for the diagnosis store, handed to [`crate::db::open_pool`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub db_path: PathBuf,
    pub busy_timeout: Duration,
    pub max_connections: u32,
    pub create_if_missing: bool,
}

impl StoreConfig {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            busy_timeout: Duration::from_millis(5000),
            max_connections: 4,
            create_if_missing: true,
        }
    }

    /// Explicit path first, then `ICD10_IMPORT_DB`, then the platform data dir.
    pub fn resolve(explicit: Option<PathBuf>) -> anyhow::Result<Self> {
        let path = match explicit {
            Some(path) => path,
            None => match env::var_os(DB_ENV) {
                Some(path) if !path.is_empty() => PathBuf::from(path),
                _ => default_db_path()?,
            },
        };
        Ok(Self::new(path))
    }
}

pub fn default_db_path() -> anyhow::Result<PathBuf> {
    let base = match dirs::data_dir() {
        Some(dir) => dir,
        None => env::current_dir()?,
    };
    Ok(base.join(APP_DIR).join(DB_FILE))
}

/// Per-run settings for the importer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportOptions {
    pub version: CodingSystemVersion,
    /// Emit a progress notice every this many create/update operations.
    pub progress_interval: u64,
    /// Walk and write as usual, then roll back instead of committing.
    pub dry_run: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            version: CodingSystemVersion::Icd10,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            dry_run: false,
        }
    }
}

pub fn log_retention() -> usize {
    env::var(LOG_RETENTION_ENV)
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|v| *v > 0)
        .unwrap_or(10)
}
