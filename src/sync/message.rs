//! Sync message types
//!
//! Two messages travel between replicas: an `Update` announcing a value and
//! its timestamp, and a `SyncRequest` asking peers for their current value.

use thiserror::Error;

use crate::core::UPDATE_HEADER_SIZE;

/// Sync message exchanged over the broadcast transport.
///
/// Wire format:
/// ```text
/// SyncRequest: empty payload
///
/// Update:
/// +0   Timestamp (8 bytes LE64)
/// +8   Value Length (4 bytes LE32)
/// +12  Value (UTF-8, variable)
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncMessage {
    /// Announcement of a value stamped with the sender's timestamp.
    Update {
        /// Sender's logical timestamp for this value.
        timestamp: u64,
        /// Document value.
        value: String,
    },
    /// Request for every peer's current value.
    SyncRequest,
}

impl SyncMessage {
    /// Create an update message
    pub fn update(timestamp: u64, value: impl Into<String>) -> Self {
        Self::Update {
            timestamp,
            value: value.into(),
        }
    }

    /// Check if this is a sync request
    pub fn is_sync_request(&self) -> bool {
        matches!(self, Self::SyncRequest)
    }

    /// Total wire size
    pub fn wire_size(&self) -> usize {
        match self {
            Self::Update { value, .. } => UPDATE_HEADER_SIZE + value.len(),
            Self::SyncRequest => 0,
        }
    }

    /// Encode to wire format
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Update { timestamp, value } => {
                let mut buf = Vec::with_capacity(self.wire_size());
                buf.extend_from_slice(&timestamp.to_le_bytes());
                buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
                buf.extend_from_slice(value.as_bytes());
                buf
            }
            Self::SyncRequest => Vec::new(),
        }
    }

    /// Decode from wire format
    pub fn decode(data: &[u8]) -> Result<Self, MessageError> {
        if data.is_empty() {
            return Ok(Self::SyncRequest);
        }

        let too_short = || MessageError::TooShort {
            expected: UPDATE_HEADER_SIZE,
            actual: data.len(),
        };
        let (timestamp_bytes, rest) = data.split_first_chunk::<8>().ok_or_else(too_short)?;
        let (len_bytes, body) = rest.split_first_chunk::<4>().ok_or_else(too_short)?;
        let timestamp = u64::from_le_bytes(*timestamp_bytes);
        let value_len = u32::from_le_bytes(*len_bytes) as usize;

        if body.len() < value_len {
            return Err(MessageError::TooShort {
                expected: UPDATE_HEADER_SIZE + value_len,
                actual: data.len(),
            });
        }
        if body.len() > value_len {
            return Err(MessageError::TrailingBytes {
                extra: body.len() - value_len,
            });
        }

        let value = std::str::from_utf8(body).map_err(|_| MessageError::InvalidUtf8)?;
        Ok(Self::Update {
            timestamp,
            value: value.to_owned(),
        })
    }
}

/// Sync message decoding errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MessageError {
    /// Input data is shorter than required.
    #[error("message too short: expected {expected} bytes, got {actual}")]
    TooShort {
        /// Minimum bytes required.
        expected: usize,
        /// Actual bytes received.
        actual: usize,
    },

    /// Input continues past the declared value length.
    #[error("{extra} trailing bytes after value")]
    TrailingBytes {
        /// Bytes past the end of the value.
        extra: usize,
    },

    /// Value is not valid UTF-8.
    #[error("value is not valid UTF-8")]
    InvalidUtf8,
}
