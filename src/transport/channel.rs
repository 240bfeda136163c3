//! Broadcast transport handle.
//!
//! One [`BroadcastTransport`] per replica. Posting fans a payload out to
//! every other live handle on the same channel; handles never see their own
//! posts.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

use crate::core::TransportError;

/// Callback invoked with each inbound payload.
///
/// An empty payload is a valid message (the sync request).
pub type MessageHandler = Box<dyn FnMut(&[u8]) + Send>;

/// Identifier of one transport handle, and so of one replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReplicaId(u64);

impl ReplicaId {
    /// Create an id from a raw value.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Generate a random id.
    pub fn generate() -> Self {
        Self(rand::random())
    }

    /// Raw value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl From<u64> for ReplicaId {
    fn from(raw: u64) -> Self {
        Self::new(raw)
    }
}

/// A payload tagged with the handle that posted it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Posting handle.
    pub origin: ReplicaId,
    /// Opaque payload.
    pub payload: Vec<u8>,
}

/// Send-only half of a [`BroadcastTransport`].
///
/// Cheap to clone. Shares the closed state of the transport it came from,
/// so posting through it fails once the transport is closed.
#[derive(Debug, Clone)]
pub struct Poster {
    origin: ReplicaId,
    tx: broadcast::Sender<Envelope>,
    closed: Arc<AtomicBool>,
}

impl Poster {
    /// Fire-and-forget broadcast.
    ///
    /// Having no other subscriber on the channel is not an error.
    pub fn post(&self, payload: Vec<u8>) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }

        let envelope = Envelope {
            origin: self.origin,
            payload,
        };
        if self.tx.send(envelope).is_err() {
            tracing::trace!(origin = %self.origin, "no subscribers on channel");
        }
        Ok(())
    }

    /// Origin stamped on posted envelopes.
    pub fn origin(&self) -> ReplicaId {
        self.origin
    }
}

/// Handle on a named broadcast channel.
///
/// No delivery or ordering guarantee is given across handles. Nothing is
/// retried, queued while detached, or persisted: a handle receives only what
/// is posted between its creation and its [`close`](Self::close), and a
/// handle that falls more than the channel capacity behind loses the oldest
/// messages.
pub struct BroadcastTransport {
    channel: String,
    poster: Poster,
    rx: Option<broadcast::Receiver<Envelope>>,
    handler: Option<MessageHandler>,
}

impl BroadcastTransport {
    pub(super) fn new(channel: &str, origin: ReplicaId, tx: broadcast::Sender<Envelope>) -> Self {
        let rx = tx.subscribe();
        Self {
            channel: channel.to_owned(),
            poster: Poster {
                origin,
                tx,
                closed: Arc::new(AtomicBool::new(false)),
            },
            rx: Some(rx),
            handler: None,
        }
    }

    /// Channel name.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Id stamped on everything this handle posts.
    pub fn origin(&self) -> ReplicaId {
        self.poster.origin
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.poster.closed.load(Ordering::Acquire)
    }

    /// Fire-and-forget broadcast to every other handle on the channel.
    pub fn post(&self, payload: Vec<u8>) -> Result<(), TransportError> {
        self.poster.post(payload)
    }

    /// Send-only handle sharing this transport's origin and closed state.
    pub fn poster(&self) -> Poster {
        self.poster.clone()
    }

    /// Install the inbound message handler, replacing any previous one.
    pub fn on_message(&mut self, handler: impl FnMut(&[u8]) + Send + 'static) {
        self.handler = Some(Box::new(handler));
    }

    /// Remove the inbound handler. Returns whether one was installed.
    ///
    /// Messages that arrive without a handler are consumed and dropped.
    pub fn remove_handler(&mut self) -> bool {
        self.handler.take().is_some()
    }

    /// Dispatch every queued inbound message without waiting.
    ///
    /// Returns the number of messages handed to the handler.
    pub fn dispatch_pending(&mut self) -> usize {
        let Some(rx) = self.rx.as_mut() else {
            return 0;
        };

        let mut dispatched = 0;
        loop {
            match rx.try_recv() {
                Ok(envelope) => {
                    if envelope.origin == self.poster.origin {
                        continue;
                    }
                    if let Some(handler) = self.handler.as_mut() {
                        handler(&envelope.payload);
                        dispatched += 1;
                    }
                }
                Err(TryRecvError::Lagged(missed)) => {
                    tracing::warn!(
                        channel = %self.channel,
                        missed,
                        "receiver lagged, messages lost"
                    );
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        dispatched
    }

    /// Wait for the next inbound message from another handle and dispatch it.
    ///
    /// Returns `false` once the handle is closed or the channel is gone.
    /// Cancel safe.
    pub async fn dispatch_next(&mut self) -> bool {
        let Some(rx) = self.rx.as_mut() else {
            return false;
        };

        loop {
            match rx.recv().await {
                Ok(envelope) => {
                    if envelope.origin == self.poster.origin {
                        continue;
                    }
                    if let Some(handler) = self.handler.as_mut() {
                        handler(&envelope.payload);
                    }
                    return true;
                }
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(
                        channel = %self.channel,
                        missed,
                        "receiver lagged, messages lost"
                    );
                }
                Err(RecvError::Closed) => return false,
            }
        }
    }

    /// Release the channel handle.
    ///
    /// Idempotent. Returns `true` only for the call that performed the close.
    pub fn close(&mut self) -> bool {
        if self.poster.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.rx = None;
        tracing::debug!(channel = %self.channel, origin = %self.poster.origin, "transport closed");
        true
    }
}

impl Drop for BroadcastTransport {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for BroadcastTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastTransport")
            .field("channel", &self.channel)
            .field("origin", &self.poster.origin)
            .field("closed", &self.is_closed())
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}
