//! Registry of named broadcast channels.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use super::channel::{BroadcastTransport, Envelope, ReplicaId};
use crate::core::{DEFAULT_CHANNEL_CAPACITY, TransportError};

/// Process-wide set of named broadcast channels.
///
/// Anything holding a clone of the hub can join a channel by name. Channels
/// are created on first use and live as long as the hub.
#[derive(Debug, Clone)]
pub struct BroadcastHub {
    channels: Arc<Mutex<HashMap<String, broadcast::Sender<Envelope>>>>,
    capacity: usize,
    supported: bool,
}

impl BroadcastHub {
    /// Create a hub with the default per-subscriber backlog.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a hub whose channels buffer `capacity` messages per
    /// subscriber. Zero is raised to one.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
            capacity: capacity.max(1),
            supported: true,
        }
    }

    /// Create a hub on a host without a broadcast primitive.
    ///
    /// Every [`open`](Self::open) fails with
    /// [`TransportError::Unavailable`].
    pub fn unsupported() -> Self {
        Self {
            supported: false,
            ..Self::new()
        }
    }

    /// Join `channel` with a fresh replica id.
    pub fn open(&self, channel: &str) -> Result<BroadcastTransport, TransportError> {
        self.open_as(channel, ReplicaId::generate())
    }

    /// Join `channel` with a caller-chosen replica id.
    pub fn open_as(
        &self,
        channel: &str,
        origin: ReplicaId,
    ) -> Result<BroadcastTransport, TransportError> {
        if !self.supported {
            return Err(TransportError::Unavailable(
                "broadcast channels are not supported by this host".into(),
            ));
        }

        let tx = self
            .channels
            .lock()
            .entry(channel.to_owned())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone();

        tracing::debug!(channel, %origin, "joined broadcast channel");
        Ok(BroadcastTransport::new(channel, origin, tx))
    }

    /// Number of open handles on `channel`.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .lock()
            .get(channel)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    /// Per-subscriber backlog of channels created by this hub.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}
