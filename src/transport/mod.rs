//! Transport layer.
//!
//! A fan-out message bus between replicas of the same document:
//!
//! - **Channels**: [`BroadcastHub`] hands out handles on named channels
//! - **Handles**: [`BroadcastTransport`] posts, dispatches inbound payloads
//!   to a handler, and suppresses its own posts
//! - **Send-only clones**: [`Poster`]
//!
//! ```text
//! ┌───────────┐   post    ┌──────────────┐   dispatch   ┌───────────┐
//! │ replica A │ ────────► │ named channel│ ───────────► │ replica B │
//! └───────────┘           └──────────────┘ ───────────► │ replica C │
//!                                                       └───────────┘
//! ```
//!
//! Payloads are opaque bytes. Delivery is best effort: no retries, no
//! ordering across handles, no replay for late joiners.

mod channel;
mod hub;

pub use channel::*;
pub use hub::BroadcastHub;
