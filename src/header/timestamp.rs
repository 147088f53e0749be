//! Last-write timestamp header
//!
//! Stores when each slot was last written as a big-endian u64 counted from
//! the Unix epoch.

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;

use crate::key::Key;

use super::HeaderEntryProvider;

/// Resolution of stored timestamps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeUnit {
    Seconds,
    #[default]
    Millis,
}

/// Records the time of the last write to each slot
#[derive(Debug, Clone, Copy, Default)]
pub struct TimestampHeaderProvider {
    unit: TimeUnit,
}

impl TimestampHeaderProvider {
    pub const ENTRY_BYTES: usize = 8;

    pub fn new(unit: TimeUnit) -> Self {
        Self { unit }
    }

    pub fn unit(&self) -> TimeUnit {
        self.unit
    }

    /// Decode a stored record; `None` if the slot was never stamped
    pub fn decode(record: &[u8]) -> Option<u64> {
        let bytes: [u8; Self::ENTRY_BYTES] = record.try_into().ok()?;
        match u64::from_be_bytes(bytes) {
            0 => None,
            time => Some(time),
        }
    }

    fn now(&self) -> u64 {
        // A clock before 1970 stamps 0, which reads back as "never"
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        match self.unit {
            TimeUnit::Seconds => elapsed.as_secs(),
            TimeUnit::Millis => elapsed.as_millis() as u64,
        }
    }
}

impl<K: Key> HeaderEntryProvider<K> for TimestampHeaderProvider {
    fn entry_byte_count(&self) -> usize {
        Self::ENTRY_BYTES
    }

    fn apply(&self, _key: &K) -> Bytes {
        Bytes::copy_from_slice(&self.now().to_be_bytes())
    }
}
