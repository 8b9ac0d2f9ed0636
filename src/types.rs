//! Type-safe wrappers for store primitives.
//!
//! These newtypes keep shard numbers and schedule instants from being mixed
//! up with the plain integers they are represented as.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A shard (partition) number in `[0, max_partitions)`.
///
/// Shard numbers are the unit of locking and drain granularity. They are
/// derived deterministically from bucket keys, so every process agrees on
/// which shard owns which key without communicating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ShardId(pub u64);

impl ShardId {
    /// Create a shard id from a raw value.
    #[inline]
    pub const fn new(value: u64) -> Self {
        ShardId(value)
    }

    /// Get the raw u64 value.
    #[inline]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl From<u64> for ShardId {
    fn from(value: u64) -> Self {
        ShardId(value)
    }
}

impl From<ShardId> for u64 {
    fn from(shard: ShardId) -> Self {
        shard.0
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A wall-clock instant in milliseconds since the Unix epoch.
///
/// Used both for bucket window starts and for the schedule reference passed
/// to `scan`. Millisecond resolution matches the identity encoding, so two
/// processes comparing window boundaries always agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Create a timestamp from raw epoch milliseconds.
    #[inline]
    pub const fn from_millis(millis: u64) -> Self {
        Timestamp(millis)
    }

    /// Get the raw epoch milliseconds.
    #[inline]
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// The current wall-clock time.
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Timestamp(millis)
    }

    /// This instant advanced by `d`, saturating on overflow.
    pub fn advanced_by(self, d: Duration) -> Self {
        Timestamp(self.0.saturating_add(d.as_millis() as u64))
    }

    /// This instant moved back by `d`, saturating at the epoch.
    pub fn rewound_by(self, d: Duration) -> Self {
        Timestamp(self.0.saturating_sub(d.as_millis() as u64))
    }
}

impl From<u64> for Timestamp {
    fn from(millis: u64) -> Self {
        Timestamp(millis)
    }
}

impl From<SystemTime> for Timestamp {
    fn from(t: SystemTime) -> Self {
        let millis = t
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Timestamp(millis)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shard_id_roundtrip() {
        let shard = ShardId::new(7);
        assert_eq!(shard.value(), 7);
        assert_eq!(u64::from(shard), 7);
        assert_eq!(ShardId::from(7u64), shard);
        assert_eq!(format!("{}", shard), "7");
    }

    #[test]
    fn test_timestamp_arithmetic() {
        let t = Timestamp::from_millis(10_000);
        assert_eq!(t.advanced_by(Duration::from_secs(5)).as_millis(), 15_000);
        assert_eq!(t.rewound_by(Duration::from_secs(5)).as_millis(), 5_000);
        // Saturates rather than wrapping.
        assert_eq!(t.rewound_by(Duration::from_secs(60)).as_millis(), 0);
    }

    #[test]
    fn test_timestamp_ordering() {
        assert!(Timestamp::from_millis(1) < Timestamp::from_millis(2));
        assert_eq!(Timestamp::from_millis(3), Timestamp::from(3u64));
    }

    #[test]
    fn test_timestamp_from_system_time() {
        let t = Timestamp::from(SystemTime::UNIX_EPOCH + Duration::from_millis(1234));
        assert_eq!(t.as_millis(), 1234);
    }

    #[test]
    fn test_timestamp_now_is_nonzero() {
        assert!(Timestamp::now().as_millis() > 0);
    }
}
