//! Error types for the storage and transport layers.

use thiserror::Error;

/// Errors raised by a [`DocumentStore`](super::DocumentStore).
///
/// None of these are fatal: a replica keeps its in-memory value
/// authoritative when the store misbehaves.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O error from a file-backed store.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The persisted record could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Writing would exceed the store's quota.
    #[error("quota exceeded: {required} bytes needed, {quota} allowed")]
    QuotaExceeded {
        /// Bytes the store would hold after the write.
        required: usize,
        /// Configured quota in bytes.
        quota: usize,
    },

    /// Storage is disabled or otherwise unreachable.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised by the broadcast transport.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The host offers no broadcast primitive.
    #[error("transport unavailable: {0}")]
    Unavailable(String),

    /// The transport handle has been closed.
    #[error("transport closed")]
    Closed,
}
