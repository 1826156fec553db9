//! Durable storage for review decisions.
//!
//! The decision map is small, so backends only ever load or replace a whole
//! snapshot. [`DecisionBackend`] picks the backend from configuration and
//! dispatches to it.

mod schema;
pub mod json;
pub mod migrate;
pub mod sqlite;

use std::path::{Path, PathBuf};
use thiserror::Error;

pub use schema::{MIGRATIONS, SCHEMA};

use crate::config::{StorageBackend, StorageConfig};
use crate::model::DecisionRecord;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access decision file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("decision file {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("decision file {path} has unsupported version {version}")]
    UnsupportedVersion { path: PathBuf, version: u32 },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl StoreError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Macro to dispatch a method call to the active backend variant.
macro_rules! dispatch {
    ($self:expr, $method:ident($($arg:expr),* $(,)?)) => {
        match &$self.inner {
            BackendInner::Json(store) => store.$method($($arg),*),
            BackendInner::Sqlite(store) => store.$method($($arg),*),
        }
    };
}

enum BackendInner {
    Json(json::JsonStore),
    Sqlite(sqlite::SqliteStore),
}

pub struct DecisionBackend {
    inner: BackendInner,
}

impl DecisionBackend {
    /// Open the backend selected in configuration.
    pub fn open(config: &StorageConfig) -> Result<Self, StoreError> {
        Self::open_kind(config.backend, config)
    }

    /// Open a specific backend at its configured location.
    pub fn open_kind(kind: StorageBackend, config: &StorageConfig) -> Result<Self, StoreError> {
        match kind {
            StorageBackend::Json => Ok(Self::json(&config.json_path)),
            StorageBackend::Sqlite => Self::sqlite(&config.sqlite_path),
        }
    }

    pub fn json(path: &Path) -> Self {
        Self {
            inner: BackendInner::Json(json::JsonStore::new(path)),
        }
    }

    pub fn sqlite(path: &Path) -> Result<Self, StoreError> {
        let store = sqlite::SqliteStore::open(path)?;
        store.initialize()?;
        Ok(Self {
            inner: BackendInner::Sqlite(store),
        })
    }

    pub fn kind(&self) -> StorageBackend {
        match &self.inner {
            BackendInner::Json(_) => StorageBackend::Json,
            BackendInner::Sqlite(_) => StorageBackend::Sqlite,
        }
    }

    pub fn location(&self) -> &Path {
        dispatch!(self, location())
    }

    /// Every persisted decision. A missing file loads as empty.
    pub fn load(&self) -> Result<Vec<DecisionRecord>, StoreError> {
        dispatch!(self, load())
    }

    /// Replace the persisted snapshot.
    pub fn save(&self, records: &[DecisionRecord]) -> Result<(), StoreError> {
        dispatch!(self, save(records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_follows_configured_backend() {
        let dir = tempdir().unwrap();
        let mut config = StorageConfig {
            backend: StorageBackend::Json,
            json_path: dir.path().join("decisions.json"),
            sqlite_path: dir.path().join("decisions.db"),
        };

        let backend = DecisionBackend::open(&config).unwrap();
        assert_eq!(backend.kind(), StorageBackend::Json);
        assert_eq!(backend.location(), config.json_path.as_path());

        config.backend = StorageBackend::Sqlite;
        let backend = DecisionBackend::open(&config).unwrap();
        assert_eq!(backend.kind(), StorageBackend::Sqlite);
        assert!(config.sqlite_path.exists());
    }
}
