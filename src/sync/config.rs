//! Coordinator configuration.

use std::path::PathBuf;

use super::coordinator::SyncError;
use crate::core::{DEFAULT_CHANNEL, DEFAULT_PERSISTENCE_KEY};
use crate::store::{MemoryStore, StorageScope};

/// Configuration of one replicated document.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Broadcast channel shared by every replica of the document.
    pub channel: String,

    /// Store key the document is persisted under.
    pub persistence_key: String,

    /// Where the document is persisted.
    pub scope: StorageScope,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            channel: DEFAULT_CHANNEL.to_owned(),
            persistence_key: DEFAULT_PERSISTENCE_KEY.to_owned(),
            scope: StorageScope::default(),
        }
    }
}

/// Builder for creating a [`SyncConfig`].
#[derive(Debug, Default)]
pub struct SyncConfigBuilder {
    config: SyncConfig,
}

impl SyncConfigBuilder {
    /// Create a new config builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the broadcast channel name.
    pub fn channel(mut self, channel: impl Into<String>) -> Self {
        self.config.channel = channel.into();
        self
    }

    /// Set the persistence key.
    pub fn persistence_key(mut self, key: impl Into<String>) -> Self {
        self.config.persistence_key = key.into();
        self
    }

    /// Persist into a session-scoped store.
    ///
    /// Replicas configured with clones of the same store share it.
    pub fn session_scope(mut self, store: MemoryStore) -> Self {
        self.config.scope = StorageScope::Session(store);
        self
    }

    /// Persist into files under `dir`.
    pub fn durable_scope(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.scope = StorageScope::durable(dir);
        self
    }

    /// Validate and build the configuration.
    pub fn build(self) -> Result<SyncConfig, SyncError> {
        if self.config.channel.trim().is_empty() {
            return Err(SyncError::Config("channel name must not be empty".into()));
        }
        if self.config.persistence_key.trim().is_empty() {
            return Err(SyncError::Config("persistence key must not be empty".into()));
        }
        Ok(self.config)
    }
}
