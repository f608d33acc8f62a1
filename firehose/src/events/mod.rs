pub mod commit;
pub mod hydrated;

use std::{
    fmt,
    time::{
        Duration,
        SystemTime,
        SystemTimeError,
        UNIX_EPOCH,
    },
};

use chrono::Utc;
use serde::{
    Deserialize,
    Serialize,
};

pub use commit::{
    CommitEvent,
    CommitOp,
};
pub use hydrated::{
    HydratedMetadata,
    HydratedUser,
};

use crate::exports;

/// Opaque wrapper for a stream position.
///
/// Depending on the protocol this is either a relay sequence number (`seq`) or a
/// ~microsecond timestamp (`time_us`). Either way it only ever grows along a stream, so
/// cursors can be compared to tell older events from newer ones.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cursor(u64);

impl Cursor {
    /// Get a cursor that will consume all available replay
    ///
    /// This sets the cursor to zero.
    pub fn from_start() -> Self {
        Self(0)
    }
    /// Get a Cursor from a raw u64
    ///
    /// For example, from a jetstream event's `time_us` field, or a firehose `seq`.
    pub fn from_raw_u64(raw: u64) -> Self {
        Self(raw)
    }
    /// Get the raw u64 value from this cursor.
    pub fn to_raw_u64(&self) -> u64 {
        self.0
    }
    /// Compute the age of the cursor vs the local clock
    ///
    /// Warning: only meaningful for the `time_us` protocols, where cursors are
    /// ~microsecond timestamps. For firehose `seq` cursors this is nonsense.
    pub fn elapsed(&self) -> Result<Duration, SystemTimeError> {
        (UNIX_EPOCH + Duration::from_micros(self.0)).elapsed()
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<SystemTime> for Cursor {
    /// A `time_us`-style cursor for a wall-clock time. Times before the epoch saturate to
    /// [Cursor::from_start].
    fn from(t: SystemTime) -> Self {
        let micros = t
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0);
        Self(micros)
    }
}

/// One decoded event, in the same shape regardless of which protocol delivered it.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Commit(CommitEvent),
    Identity(IdentityEvent),
    Account(AccountEvent),
}

#[derive(Debug, Clone, PartialEq)]
pub struct IdentityEvent {
    pub did: exports::Did,
    pub cursor: Cursor,
    pub handle: Option<exports::Handle>,
    pub seq: Option<u64>,
    pub time: Option<chrono::DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccountEvent {
    pub did: exports::Did,
    pub cursor: Cursor,
    pub active: bool,
    pub status: Option<String>,
    pub seq: Option<u64>,
    pub time: Option<chrono::DateTime<Utc>>,
}

impl StreamEvent {
    pub fn cursor(&self) -> Cursor {
        match self {
            StreamEvent::Commit(e) => e.cursor,
            StreamEvent::Identity(e) => e.cursor,
            StreamEvent::Account(e) => e.cursor,
        }
    }

    pub fn as_commit(&self) -> Option<&CommitEvent> {
        match self {
            StreamEvent::Commit(c) => Some(c),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_order_and_format() {
        let a = Cursor::from_raw_u64(1743526687419798);
        let b = Cursor::from_raw_u64(1743526687419799);
        assert!(a < b);
        assert_eq!(a.to_string(), "1743526687419798");
        assert_eq!(Cursor::from_start().to_raw_u64(), 0);
    }

    #[test]
    fn test_cursor_from_system_time() {
        let t = UNIX_EPOCH + Duration::from_secs(2);
        assert_eq!(Cursor::from(t).to_raw_u64(), 2_000_000);
        assert!(Cursor::from(SystemTime::now()).elapsed().is_ok());
    }
}
