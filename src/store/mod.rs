//! Persistence layer.
//!
//! - [`PersistentReplica`]: current value, persisted on every change, with
//!   change listeners
//! - [`MemoryStore`]: session-scoped backend
//! - [`FileStore`]: cross-session backend
//! - [`StorageScope`]: picks one of the two at construction time

mod file;
mod memory;
mod replica;

use std::path::PathBuf;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use replica::{Listener, PersistentReplica, Subscription, read_persisted};

use crate::core::{DocumentStore, StoreError};

/// Lifetime of the persisted document.
#[derive(Debug, Clone)]
pub enum StorageScope {
    /// Lives as long as the given store handle (and its clones).
    Session(MemoryStore),
    /// Survives restarts; records are kept under `dir`.
    Durable {
        /// Directory holding the records.
        dir: PathBuf,
    },
}

impl StorageScope {
    /// Session scope over a fresh in-memory store.
    pub fn session() -> Self {
        Self::Session(MemoryStore::new())
    }

    /// Durable scope rooted at `dir`.
    pub fn durable(dir: impl Into<PathBuf>) -> Self {
        Self::Durable { dir: dir.into() }
    }

    /// Open the backing store.
    pub fn open(&self) -> Result<Box<dyn DocumentStore>, StoreError> {
        match self {
            Self::Session(store) => Ok(Box::new(store.clone())),
            Self::Durable { dir } => Ok(Box::new(FileStore::open(dir.clone())?)),
        }
    }
}

impl Default for StorageScope {
    fn default() -> Self {
        Self::session()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_durable_scope_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let scope = StorageScope::durable(dir.path().join("profile"));

        scope.open().unwrap().save("css", "a{}").unwrap();
        let store = scope.open().unwrap();
        assert_eq!(store.load("css").unwrap().as_deref(), Some("a{}"));
    }

    #[test]
    fn test_durable_scope_unopenable() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();

        // A regular file where the directory should be
        let scope = StorageScope::durable(blocker.join("nested"));
        assert!(scope.open().is_err());

        let replica = PersistentReplica::open(&scope, "css");
        replica.set("in memory");
        assert_eq!(replica.get(), "in memory");
    }
}
