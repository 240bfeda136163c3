//! Last-write-wins protocol state
//!
//! Pure state machine deciding what a replica accepts and what it
//! announces. It never touches the document, the store, or the transport;
//! the coordinator wires its decisions to those.

use super::message::SyncMessage;

/// Protocol phase of a replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Freshly created; no local edit has been stamped yet.
    ///
    /// Replaces the usual acceptance rule (strictly newer than
    /// `last_update_timestamp`): updates are compared against the timestamp
    /// of the value actually held, so catch-up replies stamped before this
    /// replica was created still win over a value read back from storage.
    ///
    /// The replica stays here until its first local edit, including after
    /// it has adopted a peer's value.
    Bootstrapping,
    /// No local change pending.
    Idle,
    /// A local change has been stamped and is being announced.
    Broadcasting,
}

/// Decision for an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Answer a sync request with the current value at this timestamp.
    Reply {
        /// Timestamp of the value held.
        timestamp: u64,
    },
    /// Sync request received while holding nothing worth sending; stay
    /// quiet.
    NothingToOffer,
    /// Apply this value; it is newer than the value held.
    Apply {
        /// Timestamp of the applied value.
        timestamp: u64,
        /// Value to apply.
        value: String,
    },
    /// Update not newer than ours (stale, duplicate, or an echo).
    Stale {
        /// Timestamp carried by the update.
        received: u64,
        /// Timestamp it lost against.
        current: u64,
    },
}

/// Stamp offered for a value read back from storage that no edit or update
/// has stamped yet. Any edit on a running replica is stamped at least this.
pub const RESTORED_VALUE_TIMESTAMP: u64 = 1;

/// Per-replica protocol state.
///
/// - `last_update_timestamp`: logical clock, never decreases, starts at the
///   replica's creation time
/// - `value_timestamp`: timestamp of the value held, zero until the replica
///   holds a stamped value
/// - `externally_applied`: set while a remote value is being applied, so the
///   resulting change notification is not announced again
///
/// Once the replica has made a local edit the two timestamps move together
/// and an update is applied only if it is strictly newer than
/// `last_update_timestamp`.
///
/// Ties on timestamp keep the local value. With no global ordering oracle,
/// a write and a receive carrying the same timestamp resolve in favour of
/// whichever the replica processed first.
#[derive(Debug, Clone)]
pub struct SyncProtocol {
    last_update_timestamp: u64,
    value_timestamp: u64,
    externally_applied: bool,
    restored: bool,
    phase: Phase,
}

impl SyncProtocol {
    /// Create protocol state whose clock starts at `created_at`.
    pub fn new(created_at: u64) -> Self {
        Self {
            last_update_timestamp: created_at,
            value_timestamp: 0,
            externally_applied: false,
            restored: false,
            phase: Phase::Bootstrapping,
        }
    }

    /// Record that the replica opened holding a value read back from
    /// storage.
    ///
    /// Until something stamps a value, sync requests are answered with it
    /// at [`RESTORED_VALUE_TIMESTAMP`], so a peer with nothing adopts it and
    /// a peer holding any stamped value keeps its own.
    pub fn mark_restored(&mut self) {
        self.restored = true;
    }

    /// Logical clock: the highest timestamp this replica has created or
    /// adopted.
    pub fn last_update_timestamp(&self) -> u64 {
        self.last_update_timestamp
    }

    /// Timestamp of the value currently held (zero if unstamped).
    pub fn value_timestamp(&self) -> u64 {
        self.value_timestamp
    }

    /// Whether a remote value is being applied.
    pub fn is_externally_applied(&self) -> bool {
        self.externally_applied
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Timestamp an inbound update has to beat.
    fn acceptance_floor(&self) -> u64 {
        match self.phase {
            Phase::Bootstrapping => self.value_timestamp,
            Phase::Idle | Phase::Broadcasting => self.last_update_timestamp,
        }
    }

    /// Decide what to do with an inbound message.
    ///
    /// An accepted update adopts its timestamp and raises the
    /// externally-applied flag; the caller must then apply the value, which
    /// clears the flag through [`on_local_change`](Self::on_local_change).
    pub fn handle_inbound(&mut self, msg: &SyncMessage) -> Inbound {
        match msg {
            SyncMessage::SyncRequest if self.value_timestamp > 0 => Inbound::Reply {
                timestamp: self.value_timestamp,
            },
            SyncMessage::SyncRequest if self.restored => Inbound::Reply {
                timestamp: RESTORED_VALUE_TIMESTAMP,
            },
            SyncMessage::SyncRequest => Inbound::NothingToOffer,
            SyncMessage::Update { timestamp, .. } if *timestamp <= self.acceptance_floor() => {
                Inbound::Stale {
                    received: *timestamp,
                    current: self.acceptance_floor(),
                }
            }
            SyncMessage::Update { timestamp, value } => {
                self.externally_applied = true;
                self.value_timestamp = *timestamp;
                self.last_update_timestamp = self.last_update_timestamp.max(*timestamp);
                Inbound::Apply {
                    timestamp: *timestamp,
                    value: value.clone(),
                }
            }
        }
    }

    /// React to a change notification from the replica.
    ///
    /// Returns `None` when the change came from an applied remote update
    /// (and clears the flag). Otherwise stamps the local change with
    /// `max(now, last + 1)`, enters [`Phase::Broadcasting`], and returns the
    /// stamp to announce.
    pub fn on_local_change(&mut self, now: u64) -> Option<u64> {
        if self.externally_applied {
            self.externally_applied = false;
            return None;
        }

        let stamp = now.max(self.last_update_timestamp.saturating_add(1));
        self.last_update_timestamp = stamp;
        self.value_timestamp = stamp;
        self.phase = Phase::Broadcasting;
        Some(stamp)
    }

    /// Return to [`Phase::Idle`] once the announcement has been posted.
    pub fn finish_broadcast(&mut self) {
        if self.phase == Phase::Broadcasting {
            self.phase = Phase::Idle;
        }
    }
}
