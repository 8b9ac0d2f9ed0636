//! Centralized configuration constants.
//!
//! All TTLs, lease durations, and key namespaces live here so the wire
//! contract between independent producer and consumer processes is visible
//! in one place. Every process hashing keys and sweeping locks must agree
//! on these values.

use std::time::Duration;

// =============================================================================
// Key Namespaces
// =============================================================================

/// Namespace prefix for shard lock keys: `lock.<shard>`.
pub const LOCK_PREFIX: &str = "lock";

/// Namespace prefix for shard ready-sets: `partition.outlet.lock.<shard>`.
pub const PARTITION_PREFIX: &str = "partition.outlet";

// =============================================================================
// Expiry / Lease Durations
// =============================================================================

/// TTL applied to bucket value lists and shard ready-sets on every write.
///
/// This is purely a garbage-collection safety net against abandoned state,
/// not an operational deadline: a `put` after expiry simply resurrects the
/// key and its shard membership.
pub const DATA_TTL: Duration = Duration::from_secs(300);

/// Lease granted to a shard lock holder.
///
/// A crashed holder self-heals after this long; other consumers may then
/// re-acquire the shard without manual intervention.
pub const LOCK_LEASE: Duration = Duration::from_secs(60);

/// Pause between full lock-sweep attempts when every shard is held.
pub const LOCK_SWEEP_BACKOFF: Duration = Duration::from_secs(1);

// =============================================================================
// Encoding
// =============================================================================

/// Version byte leading every encoded bucket identity.
///
/// Bump this if the identity layout changes; decoders reject versions they
/// do not understand instead of misreading the key.
pub const IDENTITY_ENCODING_VERSION: u8 = 1;

/// Fixed-width portion of an encoded identity: version byte, window start
/// (8 bytes big-endian), resolution (8 bytes big-endian).
pub const IDENTITY_HEADER_LEN: usize = 17;

// =============================================================================
// Scan Pipeline
// =============================================================================

/// Bound on the scan output channel. Backpressure from a slow consumer
/// stalls the drain task rather than buffering a whole shard in memory.
pub const SCAN_CHANNEL_CAPACITY: usize = 64;

/// Default shard count when none is configured.
pub const DEFAULT_MAX_PARTITIONS: u64 = 1;
