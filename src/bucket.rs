//! Bucket identities and their accumulated sample sequences.
//!
//! An [`Identity`] names one time window of one metric: `(name, window
//! start, resolution)`. Its canonical byte encoding serves double duty as
//! the storage key for the bucket's value list and as the member token in
//! its shard's ready-set. Two identities are equal iff their encodings are
//! equal.
//!
//! # Key Format Specification (v1)
//!
//! ```text
//! byte  0      version (currently 1)
//! bytes 1..9   window start, epoch milliseconds, big-endian u64
//! bytes 9..17  resolution, milliseconds, big-endian u64
//! bytes 17..   metric name, UTF-8
//! ```
//!
//! The fixed-width header keeps the encoding injective: the variable-length
//! name is the only trailing field, so no two identities share an encoding.
//!
//! # Value Payload Format
//!
//! Each `put` appends one payload entry to the bucket's stored list. An
//! entry is the snapshotted sample sequence serialized as consecutive
//! big-endian f64 words. Decoding is lenient: a trailing partial word is
//! skipped (and counted) rather than failing the whole read, since a value
//! list is best-effort staging data, not a ledger.

use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};

use crate::constants::{IDENTITY_ENCODING_VERSION, IDENTITY_HEADER_LEN};
use crate::error::{Error, Result};
use crate::types::Timestamp;

/// The `(name, window start, resolution)` triple identifying a bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    name: String,
    window_start: Timestamp,
    resolution: Duration,
}

impl Identity {
    /// Create an identity for one window of one metric.
    pub fn new(name: impl Into<String>, window_start: Timestamp, resolution: Duration) -> Self {
        Self {
            name: name.into(),
            window_start,
            resolution,
        }
    }

    /// The metric/source name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The instant the window opened.
    pub fn window_start(&self) -> Timestamp {
        self.window_start
    }

    /// The window duration.
    pub fn resolution(&self) -> Duration {
        self.resolution
    }

    /// The instant the window closes.
    pub fn closes_at(&self) -> Timestamp {
        self.window_start.advanced_by(self.resolution)
    }

    /// Whether the window has fully elapsed as of `schedule`.
    pub fn is_ready(&self, schedule: Timestamp) -> bool {
        self.closes_at() <= schedule
    }

    /// Canonical byte encoding, used as storage key and shard-set member.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(IDENTITY_HEADER_LEN + self.name.len());
        buf.put_u8(IDENTITY_ENCODING_VERSION);
        buf.put_u64(self.window_start.as_millis());
        buf.put_u64(self.resolution.as_millis() as u64);
        buf.put_slice(self.name.as_bytes());
        buf.freeze()
    }

    /// Decode an identity from its canonical encoding.
    pub fn decode(src: &[u8]) -> Result<Self> {
        if src.len() < IDENTITY_HEADER_LEN {
            return Err(Error::Encoding(format!(
                "identity too short: {} bytes",
                src.len()
            )));
        }
        if src[0] != IDENTITY_ENCODING_VERSION {
            return Err(Error::Encoding(format!(
                "unknown identity version: {}",
                src[0]
            )));
        }
        let window_start = u64::from_be_bytes(src[1..9].try_into().unwrap_or_default());
        let resolution = u64::from_be_bytes(src[9..17].try_into().unwrap_or_default());
        let name = std::str::from_utf8(&src[IDENTITY_HEADER_LEN..])
            .map_err(|e| Error::Encoding(format!("identity name not utf-8: {}", e)))?;
        Ok(Self {
            name: name.to_string(),
            window_start: Timestamp::from_millis(window_start),
            resolution: Duration::from_millis(resolution),
        })
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}/{}ms",
            self.name,
            self.window_start,
            self.resolution.as_millis()
        )
    }
}

/// A bucket: an [`Identity`] plus the ordered samples accumulated for its
/// window.
///
/// Concurrent producers within one process may append to the same bucket;
/// the value sequence is guarded by the bucket's own lock. The lock is only
/// held for in-memory work (appends and the key/value snapshot taken by
/// `put`), never across I/O. Cross-process safety for the same logical key
/// comes from the backing store's atomic batches, not from this lock.
#[derive(Debug)]
pub struct Bucket {
    id: Identity,
    vals: Mutex<Vec<f64>>,
}

impl Bucket {
    /// Create an empty bucket for `id`.
    pub fn new(id: Identity) -> Self {
        Self {
            id,
            vals: Mutex::new(Vec::new()),
        }
    }

    /// Create a bucket pre-filled with `vals`.
    pub fn with_values(id: Identity, vals: Vec<f64>) -> Self {
        Self {
            id,
            vals: Mutex::new(vals),
        }
    }

    /// The bucket's identity.
    pub fn id(&self) -> &Identity {
        &self.id
    }

    /// Append one sample.
    pub fn push(&self, sample: f64) {
        self.vals.lock().expect("bucket lock poisoned").push(sample);
    }

    /// Append a run of samples, preserving order.
    pub fn append(&self, samples: &[f64]) {
        self.vals
            .lock()
            .expect("bucket lock poisoned")
            .extend_from_slice(samples);
    }

    /// A copy of the current value sequence.
    pub fn values(&self) -> Vec<f64> {
        self.vals.lock().expect("bucket lock poisoned").clone()
    }

    /// Snapshot the storage key and serialized value payload under the
    /// bucket's lock, so the key is never computed while a producer is
    /// mid-append. The lock is released before the caller does any I/O.
    pub(crate) fn snapshot_encoded(&self) -> (Bytes, Bytes) {
        let guard = self.vals.lock().expect("bucket lock poisoned");
        (self.id.encode(), encode_values(&guard))
    }

    /// Replace the value sequence (used by `get` to fill in fetched data).
    pub(crate) fn set_values(&self, vals: Vec<f64>) {
        *self.vals.lock().expect("bucket lock poisoned") = vals;
    }
}

/// Serialize a sample sequence as consecutive big-endian f64 words.
pub(crate) fn encode_values(vals: &[f64]) -> Bytes {
    let mut buf = BytesMut::with_capacity(vals.len() * 8);
    for v in vals {
        buf.put_f64(*v);
    }
    buf.freeze()
}

/// Decode a value payload leniently.
///
/// Returns the decoded samples and the number of trailing bytes that did
/// not form a whole word and were skipped.
pub(crate) fn decode_values(src: &[u8]) -> (Vec<f64>, usize) {
    let mut vals = Vec::with_capacity(src.len() / 8);
    let mut chunks = src.chunks_exact(8);
    for chunk in &mut chunks {
        let word: [u8; 8] = chunk.try_into().unwrap_or_default();
        vals.push(f64::from_be_bytes(word));
    }
    (vals, chunks.remainder().len())
}
