//! Sync coordinator
//!
//! Bridges a [`PersistentReplica`] and a [`BroadcastTransport`]: local
//! changes are stamped and announced, inbound updates are filtered by
//! last-write-wins and applied without being announced again.

use std::future::Future;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use thiserror::Error;

use super::config::SyncConfig;
use super::message::{MessageError, SyncMessage};
use super::protocol::{Inbound, Phase, SyncProtocol};
use crate::core::{Clock, StoreError, SystemClock, TransportError};
use crate::store::{PersistentReplica, Subscription, read_persisted};
use crate::transport::{BroadcastHub, BroadcastTransport, Poster, ReplicaId};

/// Errors from the sync layer.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Inbound payload could not be decoded.
    #[error("message error: {0}")]
    Message(#[from] MessageError),

    /// Store could not be read or written.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Transport refused a post.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

/// State shared between the coordinator, its replica listener, and its
/// message handler.
struct Shared {
    replica: Arc<PersistentReplica>,
    protocol: Mutex<SyncProtocol>,
    clock: Arc<dyn Clock>,
    poster: Option<Poster>,
}

impl Shared {
    /// Local change notification from the replica.
    fn on_change(&self, value: &str) {
        let Some(timestamp) = self.protocol.lock().on_local_change(self.clock.now()) else {
            return;
        };

        if let Some(poster) = &self.poster {
            tracing::debug!(timestamp, len = value.len(), "announcing local change");
            if let Err(e) = announce(poster, &SyncMessage::update(timestamp, value)) {
                tracing::warn!(timestamp, error = %e, "failed to announce local change");
            }
        }
        self.protocol.lock().finish_broadcast();
    }

    /// Inbound payload from the transport.
    fn handle_payload(&self, payload: &[u8]) -> Result<Inbound, SyncError> {
        let msg = SyncMessage::decode(payload)?;

        // Decide and apply under the replica's update lock so no local edit
        // can consume the externally-applied flag in between.
        let (inbound, reply) = self.replica.update(|current| {
            let inbound = self.protocol.lock().handle_inbound(&msg);
            let (next, reply) = match &inbound {
                Inbound::Apply { value, .. } => (Some(value.clone()), None),
                Inbound::Reply { timestamp } => {
                    (None, Some(SyncMessage::update(*timestamp, current)))
                }
                Inbound::NothingToOffer | Inbound::Stale { .. } => (None, None),
            };
            (next, (inbound, reply))
        });

        match &inbound {
            Inbound::Apply { timestamp, value } => {
                tracing::debug!(timestamp, len = value.len(), "applied remote update");
            }
            Inbound::Stale { received, current } => {
                tracing::debug!(received, current, "discarded stale update");
            }
            Inbound::Reply { timestamp } => {
                tracing::debug!(timestamp, "answering sync request");
            }
            Inbound::NothingToOffer => {
                tracing::debug!("sync request ignored, no stamped value held");
            }
        }

        if let (Some(reply), Some(poster)) = (reply, &self.poster) {
            announce(poster, &reply)?;
        }
        Ok(inbound)
    }
}

fn announce(poster: &Poster, msg: &SyncMessage) -> Result<(), SyncError> {
    poster.post(msg.encode())?;
    Ok(())
}

/// Keeps one replica of a document in step with its peers.
///
/// Construction reads back the persisted value, starts the logical clock at
/// the current clock reading, joins the channel, and asks peers for a
/// fresher value. If the host has no broadcast transport the coordinator
/// runs local-only: edits are still stamped and persisted.
///
/// Inbound messages are processed by [`pump`](Self::pump) or
/// [`run`](Self::run). Local edits go through [`set`](Self::set) or any
/// handle from [`replica`](Self::replica); consumers never see the
/// replication.
///
/// # Example
///
/// ```
/// use tabsync::prelude::*;
///
/// let hub = BroadcastHub::new();
/// let clock = ManualClock::new(0);
/// let store = MemoryStore::new();
/// let config = SyncConfigBuilder::new().session_scope(store).build().unwrap();
///
/// let tab_a = SyncCoordinator::open_with_clock(&config, &hub, clock.clone());
/// let mut tab_b = SyncCoordinator::open_with_clock(&config, &hub, clock.clone());
///
/// clock.set(10);
/// tab_a.set("body{color:red}");
/// tab_b.pump();
/// assert_eq!(tab_b.get(), "body{color:red}");
/// ```
pub struct SyncCoordinator {
    shared: Arc<Shared>,
    transport: Option<BroadcastTransport>,
    subscription: Option<Subscription>,
    torn_down: bool,
}

impl SyncCoordinator {
    /// Open a replica stamped by the system clock.
    pub fn open(config: &SyncConfig, hub: &BroadcastHub) -> Self {
        Self::open_with_clock(config, hub, SystemClock)
    }

    /// Open a replica stamped by `clock`.
    pub fn open_with_clock(
        config: &SyncConfig,
        hub: &BroadcastHub,
        clock: impl Clock + 'static,
    ) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(clock);
        let replica = Arc::new(PersistentReplica::open(
            &config.scope,
            config.persistence_key.as_str(),
        ));

        let transport = match hub.open(&config.channel) {
            Ok(transport) => Some(transport),
            Err(e) => {
                tracing::warn!(
                    channel = %config.channel,
                    error = %e,
                    "running without cross-replica sync"
                );
                None
            }
        };

        let mut protocol = SyncProtocol::new(clock.now());
        if !replica.get().is_empty() {
            protocol.mark_restored();
        }

        let shared = Arc::new(Shared {
            replica,
            protocol: Mutex::new(protocol),
            clock,
            poster: transport.as_ref().map(BroadcastTransport::poster),
        });

        // Owned from here on, so Drop tears down whatever was set up.
        let mut coordinator = Self {
            shared,
            transport,
            subscription: None,
            torn_down: false,
        };
        coordinator.attach();
        coordinator.request_sync();
        coordinator
    }

    fn attach(&mut self) {
        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        let subscription = self.shared.replica.subscribe(move |value| {
            if let Some(shared) = weak.upgrade() {
                shared.on_change(value);
            }
        });
        self.subscription = Some(subscription);

        if let Some(transport) = self.transport.as_mut() {
            let shared = Arc::clone(&self.shared);
            transport.on_message(move |payload| {
                if let Err(e) = shared.handle_payload(payload) {
                    match e {
                        SyncError::Message(e) => {
                            tracing::debug!(
                                error = %e,
                                len = payload.len(),
                                "discarded malformed message"
                            );
                        }
                        e => tracing::warn!(error = %e, "failed to handle inbound message"),
                    }
                }
            });
        }
    }

    fn request_sync(&self) {
        let Some(poster) = &self.shared.poster else {
            return;
        };
        if let Err(e) = announce(poster, &SyncMessage::SyncRequest) {
            tracing::warn!(error = %e, "failed to request sync");
        }
    }

    /// Handle on the replica: current value, setter, and change listeners.
    pub fn replica(&self) -> Arc<PersistentReplica> {
        Arc::clone(&self.shared.replica)
    }

    /// Current value.
    pub fn get(&self) -> String {
        self.shared.replica.get()
    }

    /// Edit the document locally. The change is persisted and announced.
    pub fn set(&self, value: impl Into<String>) {
        self.shared.replica.set(value);
    }

    /// Seed the document (e.g. from the backend copy) only while it is
    /// still empty. Returns whether the value was set.
    pub fn seed(&self, value: impl Into<String>) -> bool {
        self.shared.replica.set_if_empty(value)
    }

    /// Value persisted for `config`'s document, as a non-replicating reader
    /// such as a preview page sees it. Opens no replica and joins no
    /// channel.
    pub fn persisted_value(config: &SyncConfig) -> Result<String, SyncError> {
        let store = config.scope.open()?;
        Ok(read_persisted(&*store, &config.persistence_key)?)
    }

    /// Logical clock of this replica.
    pub fn last_update_timestamp(&self) -> u64 {
        self.shared.protocol.lock().last_update_timestamp()
    }

    /// Timestamp of the value held (zero if unstamped).
    pub fn value_timestamp(&self) -> u64 {
        self.shared.protocol.lock().value_timestamp()
    }

    /// Whether a remote value is in the middle of being applied.
    pub fn is_externally_applied(&self) -> bool {
        self.shared.protocol.lock().is_externally_applied()
    }

    /// Protocol phase.
    pub fn phase(&self) -> Phase {
        self.shared.protocol.lock().phase()
    }

    /// Whether this replica is joined to its channel.
    pub fn is_replicating(&self) -> bool {
        self.transport.as_ref().is_some_and(|t| !t.is_closed())
    }

    /// Id this replica posts under, if it has a transport.
    pub fn replica_id(&self) -> Option<ReplicaId> {
        self.transport.as_ref().map(BroadcastTransport::origin)
    }

    /// Process every queued inbound message. Returns how many were handled.
    pub fn pump(&mut self) -> usize {
        self.transport
            .as_mut()
            .map(BroadcastTransport::dispatch_pending)
            .unwrap_or(0)
    }

    /// Process inbound messages until `shutdown` resolves or the channel
    /// goes away, then tear down.
    pub async fn run(&mut self, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);

        if let Some(transport) = self.transport.as_mut() {
            loop {
                tokio::select! {
                    _ = &mut shutdown => break,
                    more = transport.dispatch_next() => {
                        if !more {
                            break;
                        }
                    }
                }
            }
        } else {
            shutdown.await;
        }

        self.teardown();
    }

    /// Unsubscribe from the replica, drop the message handler, and close
    /// the transport.
    ///
    /// Each step runs whatever happened in the others. Idempotent: returns
    /// `true` only for the call that did the work.
    pub fn teardown(&mut self) -> bool {
        if self.torn_down {
            return false;
        }
        self.torn_down = true;

        if let Some(subscription) = self.subscription.take() {
            self.shared.replica.unsubscribe(&subscription);
        }
        if let Some(transport) = self.transport.as_mut() {
            transport.remove_handler();
            transport.close();
        }
        tracing::debug!(origin = ?self.replica_id(), "replica torn down");
        true
    }
}

impl Drop for SyncCoordinator {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for SyncCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCoordinator")
            .field("replica_id", &self.replica_id())
            .field("replicating", &self.is_replicating())
            .field("last_update_timestamp", &self.last_update_timestamp())
            .field("torn_down", &self.torn_down)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DocumentStore, ManualClock};
    use crate::store::MemoryStore;
    use crate::sync::{RESTORED_VALUE_TIMESTAMP, SyncConfigBuilder};

    fn config() -> SyncConfig {
        SyncConfigBuilder::new()
            .session_scope(MemoryStore::new())
            .build()
            .unwrap()
    }

    /// Raw handle on the channel for observing and injecting messages.
    fn observer(hub: &BroadcastHub) -> (BroadcastTransport, Arc<Mutex<Vec<SyncMessage>>>) {
        let mut transport = hub.open("xlog-custom-css").unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        transport.on_message(move |payload| {
            sink.lock().push(SyncMessage::decode(payload).unwrap());
        });
        (transport, seen)
    }

    #[test]
    fn test_open_requests_sync() {
        let hub = BroadcastHub::new();
        let (mut spy, seen) = observer(&hub);

        let _tab = SyncCoordinator::open_with_clock(&config(), &hub, ManualClock::new(3));
        spy.dispatch_pending();

        assert_eq!(*seen.lock(), vec![SyncMessage::SyncRequest]);
    }

    #[test]
    fn test_local_edit_is_announced_once() {
        let hub = BroadcastHub::new();
        let clock = ManualClock::new(0);
        let tab = SyncCoordinator::open_with_clock(&config(), &hub, clock.clone());
        let (mut spy, seen) = observer(&hub);

        clock.set(10);
        tab.set("body{color:red}");
        spy.dispatch_pending();

        assert_eq!(*seen.lock(), vec![SyncMessage::update(10, "body{color:red}")]);
        assert_eq!(tab.last_update_timestamp(), 10);
        assert_eq!(tab.phase(), Phase::Idle);
        assert!(!tab.is_externally_applied());
    }

    #[test]
    fn test_remote_update_applied_without_echo() {
        let hub = BroadcastHub::new();
        let mut tab = SyncCoordinator::open_with_clock(&config(), &hub, ManualClock::new(0));
        let (mut spy, seen) = observer(&hub);

        spy.post(SyncMessage::update(10, "remote").encode()).unwrap();
        assert_eq!(tab.pump(), 1);

        assert_eq!(tab.get(), "remote");
        assert_eq!(tab.last_update_timestamp(), 10);
        assert!(!tab.is_externally_applied());
        spy.dispatch_pending();
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_sync_request_answered_with_current_value() {
        let hub = BroadcastHub::new();
        let clock = ManualClock::new(0);
        let mut tab = SyncCoordinator::open_with_clock(&config(), &hub, clock.clone());
        clock.set(5);
        tab.set("red");

        let (mut spy, seen) = observer(&hub);
        spy.post(SyncMessage::SyncRequest.encode()).unwrap();
        tab.pump();
        spy.dispatch_pending();

        assert_eq!(*seen.lock(), vec![SyncMessage::update(5, "red")]);
    }

    #[test]
    fn test_restored_value_answers_sync_request() {
        let hub = BroadcastHub::new();
        let mut store = MemoryStore::new();
        store.save("xlog-custom-css", "restored").unwrap();
        let config = SyncConfigBuilder::new()
            .session_scope(store)
            .build()
            .unwrap();

        let mut tab = SyncCoordinator::open_with_clock(&config, &hub, ManualClock::new(40));
        assert_eq!(tab.value_timestamp(), 0);

        let (mut spy, seen) = observer(&hub);
        spy.post(SyncMessage::SyncRequest.encode()).unwrap();
        tab.pump();
        spy.dispatch_pending();

        assert_eq!(
            *seen.lock(),
            vec![SyncMessage::update(RESTORED_VALUE_TIMESTAMP, "restored")]
        );
    }

    #[test]
    fn test_empty_replica_stays_quiet() {
        let hub = BroadcastHub::new();
        let mut tab = SyncCoordinator::open_with_clock(&config(), &hub, ManualClock::new(40));
        let (mut spy, seen) = observer(&hub);

        spy.post(SyncMessage::SyncRequest.encode()).unwrap();
        tab.pump();
        spy.dispatch_pending();
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_malformed_message_is_ignored() {
        let hub = BroadcastHub::new();
        let mut tab = SyncCoordinator::open_with_clock(&config(), &hub, ManualClock::new(0));
        tab.set("kept");
        let (spy, _) = observer(&hub);

        spy.post(vec![1, 2, 3]).unwrap();
        spy.post(SyncMessage::update(99, "after").encode()).unwrap();
        assert_eq!(tab.pump(), 2);
        assert_eq!(tab.get(), "after");
    }

    #[test]
    fn test_teardown_is_idempotent() {
        let hub = BroadcastHub::new();
        let mut tab = SyncCoordinator::open_with_clock(&config(), &hub, ManualClock::new(0));
        let replica = tab.replica();
        assert_eq!(replica.listener_count(), 1);
        assert_eq!(hub.subscriber_count("xlog-custom-css"), 1);

        assert!(tab.teardown());
        assert!(!tab.teardown());

        assert_eq!(replica.listener_count(), 0);
        assert_eq!(hub.subscriber_count("xlog-custom-css"), 0);
        assert!(!tab.is_replicating());
        assert_eq!(tab.pump(), 0);
    }

    #[test]
    fn test_drop_releases_channel() {
        let hub = BroadcastHub::new();
        let replica = {
            let tab = SyncCoordinator::open_with_clock(&config(), &hub, ManualClock::new(0));
            tab.replica()
        };
        assert_eq!(hub.subscriber_count("xlog-custom-css"), 0);
        assert_eq!(replica.listener_count(), 0);
    }

    #[test]
    fn test_unsupported_transport_runs_local_only() {
        let hub = BroadcastHub::unsupported();
        let clock = ManualClock::new(0);
        let mut tab = SyncCoordinator::open_with_clock(&config(), &hub, clock.clone());

        assert!(!tab.is_replicating());
        assert_eq!(tab.replica_id(), None);

        clock.set(4);
        tab.set("local");
        assert_eq!(tab.get(), "local");
        assert_eq!(tab.last_update_timestamp(), 4);
        assert_eq!(tab.pump(), 0);
    }

    #[test]
    fn test_edit_through_replica_handle_is_announced() {
        let hub = BroadcastHub::new();
        let clock = ManualClock::new(0);
        let tab = SyncCoordinator::open_with_clock(&config(), &hub, clock.clone());
        let (mut spy, seen) = observer(&hub);

        clock.set(2);
        tab.replica().set("via handle");
        spy.dispatch_pending();
        assert_eq!(*seen.lock(), vec![SyncMessage::update(2, "via handle")]);
    }

    #[test]
    fn test_seed_only_when_empty() {
        let hub = BroadcastHub::new();
        let tab = SyncCoordinator::open_with_clock(&config(), &hub, ManualClock::new(0));

        assert!(tab.seed("from backend"));
        assert!(!tab.seed("again"));
        assert_eq!(tab.get(), "from backend");
    }

    #[test]
    fn test_persisted_value() {
        let hub = BroadcastHub::new();
        let config = config();
        let mut tab = SyncCoordinator::open_with_clock(&config, &hub, ManualClock::new(0));
        tab.set("saved");

        assert_eq!(SyncCoordinator::persisted_value(&config).unwrap(), "saved");

        let (spy, _) = observer(&hub);
        spy.post(SyncMessage::update(50, "remote").encode()).unwrap();
        tab.pump();
        assert_eq!(SyncCoordinator::persisted_value(&config).unwrap(), "remote");
    }

    #[test]
    fn test_persisted_value_without_replica() {
        let hub = BroadcastHub::new();
        let config = config();
        assert_eq!(SyncCoordinator::persisted_value(&config).unwrap(), "");

        drop(SyncCoordinator::open_with_clock(&config, &hub, ManualClock::new(0)));
        assert_eq!(hub.subscriber_count(&config.channel), 0);
        assert_eq!(SyncCoordinator::persisted_value(&config).unwrap(), "");
    }
}
