//! The partitioned bucket store.
//!
//! # Architecture
//!
//! ```text
//!   producers                         consumers
//!      │ put                             │ scan(schedule)
//!      ▼                                 ▼
//!   ┌──────────────┐            ┌─────────────────┐
//!   │ BucketStore  │            │ ShardLockManager │ ← leased lock per shard
//!   └──────┬───────┘            └────────┬────────┘
//!          │  atomic batches             │ exactly one drainer per shard
//!          ▼                             ▼
//!   ┌─────────────────────────────────────────────┐
//!   │ backing store (Redis or in-memory)          │
//!   │  key → value list (TTL)                     │
//!   │  shard set → ready/pending keys (TTL)       │
//!   └─────────────────────────────────────────────┘
//! ```
//!
//! `put` hashes the bucket key into one of `max_partitions` shards and, in a
//! single atomic batch, appends the snapshotted samples and registers the
//! key in the shard's ready-set. `scan` wins one shard's lock, atomically
//! reads-and-clears that shard's ready-set on a background task, streams the
//! buckets whose window has closed, and puts the rest back for a later scan.
//! Closing the stream is the sole termination signal.
//!
//! Coordination across processes happens entirely through the backing
//! store's atomic batches and the leased locks; the only in-process lock is
//! the one each [`Bucket`] holds over its own value sequence.

mod backend;
mod config;
mod lock;
mod memory;
mod partition;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::bucket::{Bucket, Identity, decode_values};
use crate::constants::SCAN_CHANNEL_CAPACITY;
use crate::error::{Error, Result};
use crate::types::{ShardId, Timestamp};

pub use backend::{RedisBackend, StoreBackend};
pub use config::StoreConfig;
pub use lock::{ShardLock, ShardLockManager};
pub use memory::MemoryBackend;
pub use partition::{partition_for, shard_lock_key, shard_set_key};

/// Durable staging store for time-bucketed metric samples.
///
/// Cheap to clone; all clones share one backend connection.
pub struct BucketStore<B: StoreBackend = RedisBackend> {
    backend: Arc<B>,
    locks: Arc<ShardLockManager<B>>,
    config: StoreConfig,
}

impl<B: StoreBackend> Clone for BucketStore<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            locks: self.locks.clone(),
            config: self.config.clone(),
        }
    }
}

impl BucketStore<RedisBackend> {
    /// Connect to the Redis instance named in `config`.
    pub async fn connect(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let backend = RedisBackend::connect(&config.address, config.password.as_deref()).await?;
        Self::with_backend(backend, config)
    }
}

impl<B: StoreBackend> BucketStore<B> {
    /// Build a store over an explicit backend.
    ///
    /// This is how tests run against [`MemoryBackend`] instead of Redis.
    pub fn with_backend(backend: B, config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let backend = Arc::new(backend);
        let locks = Arc::new(
            ShardLockManager::new(backend.clone(), config.max_partitions)
                .with_timing(config.lock_lease, config.lock_backoff),
        );
        Ok(Self {
            backend,
            locks,
            config,
        })
    }

    /// The fixed shard count this store hashes and sweeps over.
    pub fn max_partitions(&self) -> u64 {
        self.config.max_partitions
    }

    /// Liveness probe against the backing store.
    pub async fn health(&self) -> bool {
        self.backend.ping().await.is_ok()
    }

    /// Append the bucket's current samples and register its key in the
    /// owning shard's ready-set, as one atomic batch.
    ///
    /// The key/value snapshot happens under the bucket's own lock, released
    /// before any I/O. No retry here; retry policy is the caller's.
    pub async fn put(&self, bucket: &Bucket) -> Result<()> {
        let (key, payload) = bucket.snapshot_encoded();
        let shard = partition_for(&key, self.config.max_partitions);
        let set = shard_set_key(shard);
        self.backend
            .append_values(&key, payload, self.config.data_ttl, &set, self.config.data_ttl)
            .await
    }

    /// Fetch and clear the accumulated values for `bucket`'s identity,
    /// filling its value sequence in place.
    ///
    /// Values are drain-once: a successful `get` removes them, so a second
    /// `get` reports [`Error::EmptyBucket`] unless a new `put` intervenes.
    /// That distinct condition means "no data", never "zero samples".
    pub async fn get(&self, bucket: &Bucket) -> Result<()> {
        let key = bucket.id().encode();
        let entries = self.backend.take_values(&key).await?;
        if entries.is_empty() {
            return Err(Error::EmptyBucket(bucket.id().to_string()));
        }
        let mut vals = Vec::new();
        for entry in entries {
            let (mut decoded, skipped) = decode_values(&entry);
            if skipped > 0 {
                // Dropped samples silently change aggregation results, so
                // make the skip visible even though the call succeeds.
                warn!(
                    at = "bucket-store-get",
                    id = %bucket.id(),
                    skipped_bytes = skipped,
                    "value entry held unparseable bytes"
                );
            }
            vals.append(&mut decoded);
        }
        bucket.set_values(vals);
        Ok(())
    }

    /// Drain one shard of buckets whose window has closed as of `schedule`.
    ///
    /// Blocks until a shard lock is won (indefinitely under full
    /// contention), then hands back a [`ScanStream`]; the drain itself runs
    /// on a background task. Use [`scan_with_cancel`](Self::scan_with_cancel)
    /// to bound the wait.
    pub async fn scan(&self, schedule: Timestamp) -> Result<ScanStream> {
        self.scan_with_cancel(schedule, CancellationToken::new())
            .await
    }

    /// [`scan`](Self::scan) with a caller-supplied cancellation token
    /// bounding the lock-acquisition wait.
    pub async fn scan_with_cancel(
        &self,
        schedule: Timestamp,
        cancel: CancellationToken,
    ) -> Result<ScanStream> {
        let shard_lock = self.locks.acquire_any(&cancel).await?;
        let (tx, rx) = mpsc::channel(SCAN_CHANNEL_CAPACITY);
        let (report_tx, report_rx) = oneshot::channel();
        tokio::spawn(run_scan(
            self.backend.clone(),
            self.locks.clone(),
            shard_lock,
            schedule,
            self.config.data_ttl,
            self.config.max_partitions,
            tx,
            report_tx,
        ));
        Ok(ScanStream {
            rx,
            report: report_rx,
        })
    }
}

/// The background drain of one locked shard.
///
/// Holds the shard lock for the duration; releases it on every exit path
/// (the lease would expire it anyway, but releasing early frees the shard
/// for other consumers). Dropping `tx` at the end closes the stream, which
/// is the consumer's sole termination signal.
#[allow(clippy::too_many_arguments)]
async fn run_scan<B: StoreBackend>(
    backend: Arc<B>,
    locks: Arc<ShardLockManager<B>>,
    shard_lock: ShardLock,
    schedule: Timestamp,
    data_ttl: Duration,
    max_partitions: u64,
    tx: mpsc::Sender<Bucket>,
    report_tx: oneshot::Sender<ScanReport>,
) {
    let set_key = shard_set_key(shard_lock.shard());
    let mut report = ScanReport::new(shard_lock.shard());

    match backend.drain_set(&set_key).await {
        Err(e) => {
            // Aborts the scan with no items; the set was not cleared.
            warn!(at = "bucket-store-scan", error = %e, shard = %shard_lock.shard(), "shard drain failed");
            report.error = Some(e);
        }
        Ok((members, _deleted)) => {
            let mut receiver_gone = false;
            for member in members {
                let id = match Identity::decode(&member) {
                    Ok(id) => id,
                    Err(e) => {
                        // Corrupt members are discovery hints, not data;
                        // drop them rather than failing the shard.
                        warn!(at = "bucket-store-parse-key", error = %e, "skipping corrupt shard member");
                        report.skipped += 1;
                        continue;
                    }
                };
                if id.is_ready(schedule) && !receiver_gone {
                    match tx.send(Bucket::new(id)).await {
                        Ok(()) => report.emitted += 1,
                        Err(mpsc::error::SendError(bucket)) => {
                            // Consumer dropped the stream: keep the rest of
                            // the shard re-findable instead of losing it.
                            receiver_gone = true;
                            putback(&*backend, bucket.id(), data_ttl, max_partitions, &mut report)
                                .await;
                        }
                    }
                } else {
                    putback(&*backend, &id, data_ttl, max_partitions, &mut report).await;
                }
            }
        }
    }

    if let Err(e) = locks.release(&shard_lock).await {
        warn!(
            at = "bucket-store-unlock",
            error = %e,
            shard = %shard_lock.shard(),
            "failed to release shard lock; lease expiry will free it"
        );
    }
    let _ = report_tx.send(report);
}

/// Reinsert a not-yet-ready key into its owning shard's set with a fresh
/// TTL so a later scan reconsiders it.
async fn putback<B: StoreBackend>(
    backend: &B,
    id: &Identity,
    data_ttl: Duration,
    max_partitions: u64,
    report: &mut ScanReport,
) {
    let key = id.encode();
    let shard = partition_for(&key, max_partitions);
    let set = shard_set_key(shard);
    match backend.restore_member(&set, &key, data_ttl).await {
        Ok(()) => report.deferred += 1,
        Err(e) => {
            // Unless a producer puts this bucket again, its pending
            // membership is gone; the failure is reported, not just logged.
            warn!(at = "bucket-putback", error = %e, id = %id, "putback failed");
            report.putback_failures.push(id.clone());
        }
    }
}

/// Lazy stream of ready buckets produced by one scan.
///
/// Buckets carry identity only; call [`BucketStore::get`] on each to fetch
/// its values. `recv` returning `None` means the shard is fully processed.
#[derive(Debug)]
pub struct ScanStream {
    rx: mpsc::Receiver<Bucket>,
    report: oneshot::Receiver<ScanReport>,
}

impl ScanStream {
    /// Next ready bucket, or `None` once the scan has finished.
    pub async fn recv(&mut self) -> Option<Bucket> {
        self.rx.recv().await
    }

    /// Wait for the drain task to finish and collect its report.
    ///
    /// Calling this before `recv` has returned `None` abandons any
    /// undelivered buckets; their values stay in the store until TTL
    /// expiry or a fresh `put` re-registers them.
    pub async fn finish(mut self) -> Result<ScanReport> {
        self.rx.close();
        self.report
            .await
            .map_err(|_| Error::Backend("scan task terminated without reporting".to_string()))
    }
}

/// Outcome summary of one shard drain.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanReport {
    /// The shard this scan drained.
    pub shard: ShardId,
    /// Ready buckets delivered on the stream.
    pub emitted: usize,
    /// Not-yet-ready buckets put back for a later scan.
    pub deferred: usize,
    /// Corrupt shard members dropped during decoding.
    pub skipped: usize,
    /// Identities whose putback failed. Their pending membership is lost
    /// unless a producer writes them again.
    pub putback_failures: Vec<Identity>,
    /// Set when the drain batch itself failed and the scan aborted early.
    pub error: Option<Error>,
}

impl ScanReport {
    fn new(shard: ShardId) -> Self {
        Self {
            shard,
            emitted: 0,
            deferred: 0,
            skipped: 0,
            putback_failures: Vec::new(),
            error: None,
        }
    }

    /// True when the scan completed with no loss and no abort.
    pub fn is_clean(&self) -> bool {
        self.putback_failures.is_empty() && self.error.is_none()
    }
}

impl fmt::Display for ScanReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "shard={} emitted={} deferred={} skipped={} putback_failures={}",
            self.shard,
            self.emitted,
            self.deferred,
            self.skipped,
            self.putback_failures.len()
        )
    }
}
