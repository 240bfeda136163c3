//! Well-known names and sizes shared by every replica.

// =============================================================================
// NAMES
// =============================================================================

/// Broadcast channel joined by every replica of the custom CSS document.
pub const DEFAULT_CHANNEL: &str = "xlog-custom-css";

/// Store key under which the custom CSS document is persisted.
pub const DEFAULT_PERSISTENCE_KEY: &str = "xlog-custom-css";

// =============================================================================
// TRANSPORT
// =============================================================================

/// Per-subscriber backlog of a broadcast channel.
///
/// A subscriber that falls further behind than this loses the oldest
/// messages.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

// =============================================================================
// WIRE FORMAT
// =============================================================================

/// Update header size (u64 timestamp + u32 value length).
pub const UPDATE_HEADER_SIZE: usize = 12;

// =============================================================================
// PERSISTENCE
// =============================================================================

/// Version stamped into every persisted record.
pub const PERSISTED_RECORD_VERSION: u32 = 0;
