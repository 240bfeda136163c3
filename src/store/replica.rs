//! Persistent replica: the authoritative local copy of the document.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};

use super::{MemoryStore, StorageScope};
use crate::core::{DocumentStore, StoreError};

/// Callback invoked with the new value after every [`PersistentReplica::set`].
pub type Listener = Box<dyn FnMut(&str) + Send>;

/// Handle returned by [`PersistentReplica::subscribe`].
///
/// Pass it back to [`PersistentReplica::unsubscribe`] to stop notifications.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Subscription {
    id: u64,
}

/// Holds the current document, persists every change, and notifies
/// subscribers.
///
/// Every `set` writes memory first, then the store, then notifies each
/// listener once. Notification is serialised across `set` calls, so all
/// listeners observe the same order of values.
///
/// A failing store never blocks an update: the error is logged and the
/// in-memory value stays authoritative.
///
/// Listeners run while the replica's notification lock is held and must not
/// call [`set`](Self::set), [`subscribe`](Self::subscribe) or
/// [`unsubscribe`](Self::unsubscribe) on the same replica.
/// [`get`](Self::get) is safe to call from a listener.
pub struct PersistentReplica {
    key: String,
    value: RwLock<String>,
    store: Mutex<Box<dyn DocumentStore>>,
    listeners: Mutex<Vec<(u64, Listener)>>,
    next_listener_id: AtomicU64,
}

impl PersistentReplica {
    /// Create a replica over `store`, reading back any value persisted
    /// under `key`.
    pub fn new(store: impl DocumentStore + 'static, key: impl Into<String>) -> Self {
        Self::from_boxed(Box::new(store), key.into())
    }

    /// Create a replica in the given storage scope.
    ///
    /// If the scope's store cannot be opened the replica falls back to an
    /// in-memory store for its lifetime.
    pub fn open(scope: &StorageScope, key: impl Into<String>) -> Self {
        let key = key.into();
        let store = match scope.open() {
            Ok(store) => store,
            Err(e) => {
                tracing::warn!(
                    key = %key,
                    error = %e,
                    "store unavailable, keeping document in memory only"
                );
                Box::new(MemoryStore::new())
            }
        };
        Self::from_boxed(store, key)
    }

    fn from_boxed(store: Box<dyn DocumentStore>, key: String) -> Self {
        let initial = match store.load(&key) {
            Ok(value) => value.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "failed to read persisted document");
                String::new()
            }
        };

        Self {
            key,
            value: RwLock::new(initial),
            store: Mutex::new(store),
            listeners: Mutex::new(Vec::new()),
            next_listener_id: AtomicU64::new(0),
        }
    }

    /// Key the document is persisted under.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current in-memory value. No I/O.
    pub fn get(&self) -> String {
        self.value.read().clone()
    }

    /// Replace the value, persist it, and notify every subscriber once.
    pub fn set(&self, value: impl Into<String>) {
        let mut listeners = self.listeners.lock();
        self.apply(&mut listeners, value.into());
    }

    /// Set `value` only while the document is still empty.
    ///
    /// Used to seed the editor from the backend copy without clobbering a
    /// draft restored from storage or received from a peer. Returns whether
    /// the value was set.
    pub fn set_if_empty(&self, value: impl Into<String>) -> bool {
        let value = value.into();
        self.update(|current| {
            if current.is_empty() {
                (Some(value), true)
            } else {
                (None, false)
            }
        })
    }

    /// Decide on a new value from the current one, with no other `set`
    /// interleaving.
    ///
    /// `f` returns the value to set (or `None` to leave it) and an output
    /// handed back to the caller. Setting goes through the usual persist and
    /// notify path.
    pub fn update<R>(&self, f: impl FnOnce(&str) -> (Option<String>, R)) -> R {
        let mut listeners = self.listeners.lock();
        let current = self.get();
        let (next, output) = f(&current);
        if let Some(next) = next {
            self.apply(&mut listeners, next);
        }
        output
    }

    fn apply(&self, listeners: &mut [(u64, Listener)], value: String) {
        *self.value.write() = value.clone();

        if let Err(e) = self.store.lock().save(&self.key, &value) {
            tracing::warn!(key = %self.key, error = %e, "failed to persist document");
        }

        for (_, listener) in listeners.iter_mut() {
            listener(&value);
        }
    }

    /// Register a listener invoked on every [`set`](Self::set), including
    /// sets made by the sync layer.
    pub fn subscribe(&self, listener: impl FnMut(&str) + Send + 'static) -> Subscription {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, Box::new(listener)));
        Subscription { id }
    }

    /// Remove a listener. Returns `false` if it was already removed.
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(id, _)| *id != subscription.id);
        listeners.len() != before
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

impl std::fmt::Debug for PersistentReplica {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentReplica")
            .field("key", &self.key)
            .field("len", &self.value.read().len())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// Read the persisted document without creating a replica.
///
/// This is the preview path: it never joins the replication group, so it
/// can lag behind an edit that is live in other replicas but not yet
/// persisted by any of them.
pub fn read_persisted(store: &dyn DocumentStore, key: &str) -> Result<String, StoreError> {
    Ok(store.load(key)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_reads_back_persisted_value() {
        let mut store = MemoryStore::new();
        store.save("css", "body{}").unwrap();

        let replica = PersistentReplica::new(store, "css");
        assert_eq!(replica.get(), "body{}");
    }

    #[test]
    fn test_set_persists_and_notifies() {
        let store = MemoryStore::new();
        let replica = PersistentReplica::new(store.clone(), "css");
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        replica.subscribe(move |v| sink.lock().push(v.to_owned()));

        replica.set("a{}");
        replica.set("b{}");

        assert_eq!(replica.get(), "b{}");
        assert_eq!(store.load("css").unwrap().as_deref(), Some("b{}"));
        assert_eq!(*seen.lock(), vec!["a{}", "b{}"]);
    }

    #[test]
    fn test_listeners_see_same_order() {
        let replica = Arc::new(PersistentReplica::new(MemoryStore::new(), "css"));
        let first = Arc::new(Mutex::new(Vec::new()));
        let second = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&first);
        replica.subscribe(move |v| sink.lock().push(v.to_owned()));
        let sink = Arc::clone(&second);
        replica.subscribe(move |v| sink.lock().push(v.to_owned()));

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let replica = Arc::clone(&replica);
                std::thread::spawn(move || {
                    for j in 0..25 {
                        replica.set(format!("{i}-{j}"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(first.lock().len(), 100);
        assert_eq!(*first.lock(), *second.lock());
    }

    #[test]
    fn test_unsubscribe() {
        let replica = PersistentReplica::new(MemoryStore::new(), "css");
        let count = Arc::new(AtomicU64::new(0));

        let counter = Arc::clone(&count);
        let sub = replica.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        replica.set("a");
        assert!(replica.unsubscribe(&sub));
        assert!(!replica.unsubscribe(&sub));
        replica.set("b");

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(replica.listener_count(), 0);
    }

    #[test]
    fn test_store_failure_is_not_fatal() {
        let replica = PersistentReplica::new(MemoryStore::disabled(), "css");
        let notified = Arc::new(AtomicU64::new(0));

        let counter = Arc::clone(&notified);
        replica.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        replica.set("still works");
        assert_eq!(replica.get(), "still works");
        assert_eq!(notified.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_quota_failure_keeps_memory_value() {
        let store = MemoryStore::with_quota(8);
        let replica = PersistentReplica::new(store.clone(), "css");

        replica.set("body{color:red}");
        assert_eq!(replica.get(), "body{color:red}");
        assert_eq!(store.load("css").unwrap(), None);
    }

    #[test]
    fn test_set_if_empty() {
        let replica = PersistentReplica::new(MemoryStore::new(), "css");
        assert!(replica.set_if_empty("from-backend"));
        assert!(!replica.set_if_empty("again"));
        assert_eq!(replica.get(), "from-backend");
    }

    #[test]
    fn test_update_returns_output() {
        let replica = PersistentReplica::new(MemoryStore::new(), "css");
        replica.set("a");

        let previous = replica.update(|current| (Some(format!("{current}b")), current.len()));
        assert_eq!(previous, 1);
        assert_eq!(replica.get(), "ab");

        let untouched = replica.update(|_| (None, "kept"));
        assert_eq!(untouched, "kept");
        assert_eq!(replica.get(), "ab");
    }

    #[test]
    fn test_get_from_listener() {
        let replica = Arc::new(PersistentReplica::new(MemoryStore::new(), "css"));
        let seen = Arc::new(Mutex::new(String::new()));

        let inner = Arc::clone(&replica);
        let sink = Arc::clone(&seen);
        replica.subscribe(move |_| *sink.lock() = inner.get());

        replica.set("x");
        assert_eq!(*seen.lock(), "x");
    }

    #[test]
    fn test_open_session_scope_shares_store() {
        let scope = StorageScope::session();
        PersistentReplica::open(&scope, "css").set("kept");

        let next = PersistentReplica::open(&scope, "css");
        assert_eq!(next.get(), "kept");
    }

    #[test]
    fn test_read_persisted() {
        let mut store = MemoryStore::new();
        assert_eq!(read_persisted(&store, "css").unwrap(), "");
        store.save("css", "p{}").unwrap();
        assert_eq!(read_persisted(&store, "css").unwrap(), "p{}");
    }
}
