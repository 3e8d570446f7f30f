//! Runtime settings for the lobby server

use crate::error::NameStoreError;
use crate::names::{MemoryNameStore, NameStore, SqliteNameStore};
use shared::{DEFAULT_HOST, DEFAULT_PORT};
use env_logger::Target;
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_DB_PATH: &str = "db.sqlite3";
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(2);

/// Where display names are kept
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameBackend {
    Sqlite(PathBuf),
    Memory,
}

impl NameBackend {
    pub fn open(&self) -> Result<Box<dyn NameStore>, NameStoreError> {
        Ok(match self {
            NameBackend::Sqlite(path) => Box::new(SqliteNameStore::open(path)?),
            NameBackend::Memory => Box::new(MemoryNameStore::new()),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Upper bound on queueing one frame for one member
    pub send_timeout: Duration,
    pub names: NameBackend,
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            names: NameBackend::Sqlite(PathBuf::from(DEFAULT_DB_PATH)),
        }
    }
}

/// Log destination: appended to `path` when given, stderr otherwise.
pub fn log_target(path: Option<&Path>) -> io::Result<Target> {
    match path {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Ok(Target::Pipe(Box::new(file)))
        }
        None => Ok(Target::Stderr),
    }
}
