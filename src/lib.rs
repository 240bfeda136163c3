//! # tabsync
//!
//! Keeps several replicas of one mutable document (for example the custom
//! CSS being edited in several open tabs) consistent and live:
//!
//! - **Durable**: every change is persisted; the next replica in the same
//!   storage scope reads it back
//! - **Convergent**: conflicting writes resolve by last-write-wins on a
//!   strictly monotonic per-replica clock
//! - **Quiet**: remotely applied values are never re-announced, so there
//!   are no echo loops
//! - **Degrading**: without a broadcast transport or working storage,
//!   local editing keeps working
//!
//! ## Modules
//!
//! - [`core`]: clock and store traits, constants, error types
//! - [`store`]: [`PersistentReplica`](store::PersistentReplica) and its
//!   backends
//! - [`transport`]: named broadcast channels
//! - [`sync`]: wire messages, protocol state, and the
//!   [`SyncCoordinator`](sync::SyncCoordinator)
//!
//! ```text
//! PersistentReplica ──change──► SyncCoordinator ──Update──► BroadcastTransport ──► peers
//!         ▲                            │   ▲                       │
//!         └────────── set ◄────────────┘   └──── Update / Sync ◄───┘
//! ```
//!
//! ## Example Usage
//!
//! ```rust
//! use tabsync::prelude::*;
//!
//! let hub = BroadcastHub::new();
//! let clock = ManualClock::new(0);
//! let config = SyncConfigBuilder::new()
//!     .session_scope(MemoryStore::new())
//!     .build()
//!     .unwrap();
//!
//! let mut tab_a = SyncCoordinator::open_with_clock(&config, &hub, clock.clone());
//! let mut tab_b = SyncCoordinator::open_with_clock(&config, &hub, clock.clone());
//!
//! clock.set(10);
//! tab_a.set("body{color:red}");
//! tab_b.pump();
//!
//! clock.set(11);
//! tab_b.set("body{color:blue}");
//! tab_a.pump();
//!
//! assert_eq!(tab_a.get(), "body{color:blue}");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod core;
pub mod store;
pub mod sync;
pub mod transport;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::core::*;
    pub use crate::store::{FileStore, MemoryStore, PersistentReplica, StorageScope, Subscription};
    pub use crate::sync::{
        Inbound, Phase, SyncConfig, SyncConfigBuilder, SyncCoordinator, SyncError, SyncMessage,
        SyncProtocol,
    };
    pub use crate::transport::{BroadcastHub, BroadcastTransport, Poster, ReplicaId};
}

// Re-export commonly used items at crate root
pub use crate::core::{Clock, DocumentStore, ManualClock, SystemClock};
pub use store::PersistentReplica;
pub use sync::{SyncConfig, SyncConfigBuilder, SyncCoordinator, SyncError};
pub use transport::BroadcastHub;
