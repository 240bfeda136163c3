//! Core traits.
//!
//! These are the two seams a replica depends on: a source of time for
//! stamping local edits, and a durable key-value store for the document.

use super::error::StoreError;

/// Source of timestamps for a replica's logical clock.
///
/// Readings are expected to be roughly monotonic but are not trusted to be:
/// the sync protocol forces strict monotonicity on top of whatever this
/// returns.
pub trait Clock: Send + Sync {
    /// Current reading, in milliseconds.
    fn now(&self) -> u64;
}

/// Durable key-value store holding documents.
///
/// Implementations decide the scope (session-lifetime or cross-session).
/// Values are whole documents; there is no partial update.
///
/// # Example
///
/// ```
/// use tabsync::core::DocumentStore;
/// use tabsync::store::MemoryStore;
///
/// let mut store = MemoryStore::new();
/// store.save("css", "body{}").unwrap();
/// assert_eq!(store.load("css").unwrap().as_deref(), Some("body{}"));
/// ```
pub trait DocumentStore: Send {
    /// Read the document stored under `key`.
    ///
    /// Returns `None` if nothing has been stored yet.
    fn load(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store `value` under `key`, replacing any previous document.
    fn save(&mut self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove the document stored under `key`. Missing keys are not an error.
    fn remove(&mut self, key: &str) -> Result<(), StoreError>;
}

impl<T: DocumentStore + ?Sized> DocumentStore for Box<T> {
    fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).load(key)
    }

    fn save(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).save(key, value)
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        (**self).remove(key)
    }
}
