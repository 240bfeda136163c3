//! Sync layer
//!
//! Implements:
//! - Last-write-wins acceptance by logical timestamp
//! - Strictly monotonic stamping of local edits
//! - Echo suppression for remotely applied values
//! - Catch-up of late-joining replicas via sync requests

mod config;
mod coordinator;
mod message;
mod protocol;

pub use config::*;
pub use coordinator::*;
pub use message::*;
pub use protocol::*;
