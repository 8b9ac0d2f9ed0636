//! Leased mutual exclusion over shards.
//!
//! A consumer wanting to drain must first win exactly one shard. The
//! manager probes shard numbers round-robin: round-robin rather than random
//! selection gives low, bounded latency when only one shard is free. If a
//! full sweep finds every shard held it sleeps for a fixed backoff and
//! sweeps again, until a shard is won or the caller's cancellation token
//! fires.
//!
//! Locks carry a fixed lease; a holder that crashes mid-drain self-heals
//! when the lease runs out. Releasing early is still worthwhile because it
//! frees the shard for other consumers before the lease would.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::backend::StoreBackend;
use super::partition::shard_lock_key;
use crate::constants::{LOCK_LEASE, LOCK_SWEEP_BACKOFF};
use crate::error::{Error, Result};
use crate::types::ShardId;

/// A held lease over one shard.
///
/// The holder has exclusive drain rights over the shard until it calls
/// [`ShardLockManager::release`] or the lease expires.
#[derive(Debug)]
pub struct ShardLock {
    shard: ShardId,
    key: String,
}

impl ShardLock {
    /// The locked shard number.
    pub fn shard(&self) -> ShardId {
        self.shard
    }
}

/// Acquires and releases leased shard locks through the backend.
pub struct ShardLockManager<B> {
    backend: Arc<B>,
    max_partitions: u64,
    lease: Duration,
    backoff: Duration,
}

impl<B: StoreBackend> ShardLockManager<B> {
    pub fn new(backend: Arc<B>, max_partitions: u64) -> Self {
        Self {
            backend,
            max_partitions,
            lease: LOCK_LEASE,
            backoff: LOCK_SWEEP_BACKOFF,
        }
    }

    /// Override the lease and backoff durations (used by tests to keep
    /// contention scenarios fast).
    pub fn with_timing(mut self, lease: Duration, backoff: Duration) -> Self {
        self.lease = lease;
        self.backoff = backoff;
        self
    }

    /// Block until any shard's lock is won, sweeping shard numbers in
    /// order and backing off between sweeps.
    ///
    /// Contention is not an error: the loop runs until a shard frees up.
    /// Backend I/O errors do propagate, and cancelling `cancel` ends the
    /// wait with [`Error::Cancelled`].
    pub async fn acquire_any(&self, cancel: &CancellationToken) -> Result<ShardLock> {
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            for p in 0..self.max_partitions {
                let shard = ShardId::new(p);
                let key = shard_lock_key(shard);
                if self.backend.try_lock(&key, self.lease).await? {
                    debug!(shard = %shard, "shard lock acquired");
                    return Ok(ShardLock { shard, key });
                }
            }
            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(self.backoff) => {}
            }
        }
    }

    /// Release a held lock. Call once per acquisition, on every exit path.
    pub async fn release(&self, lock: &ShardLock) -> Result<()> {
        self.backend.unlock(&lock.key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryBackend;

    fn manager(backend: &MemoryBackend, shards: u64) -> ShardLockManager<MemoryBackend> {
        ShardLockManager::new(Arc::new(backend.clone()), shards)
            .with_timing(Duration::from_secs(60), Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_acquire_first_free_shard() {
        let backend = MemoryBackend::new();
        let manager = manager(&backend, 3);
        let cancel = CancellationToken::new();

        let first = manager.acquire_any(&cancel).await.unwrap();
        assert_eq!(first.shard(), ShardId::new(0));

        // Shard 0 is held, so the next caller sweeps forward to shard 1.
        let second = manager.acquire_any(&cancel).await.unwrap();
        assert_eq!(second.shard(), ShardId::new(1));

        manager.release(&first).await.unwrap();
        let third = manager.acquire_any(&cancel).await.unwrap();
        assert_eq!(third.shard(), ShardId::new(0));
    }

    #[tokio::test]
    async fn test_acquire_waits_for_release() {
        let backend = MemoryBackend::new();
        let manager = Arc::new(manager(&backend, 1));
        let cancel = CancellationToken::new();

        let held = manager.acquire_any(&cancel).await.unwrap();

        let waiter = {
            let manager = manager.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { manager.acquire_any(&cancel).await })
        };

        // The waiter must still be sweeping while the lock is held.
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!waiter.is_finished());

        manager.release(&held).await.unwrap();
        let reacquired = waiter.await.unwrap().unwrap();
        assert_eq!(reacquired.shard(), ShardId::new(0));
    }

    #[tokio::test]
    async fn test_acquire_cancellation() {
        let backend = MemoryBackend::new();
        let manager = manager(&backend, 1);
        let cancel = CancellationToken::new();

        // Occupy the only shard so acquisition must wait.
        let _held = manager.acquire_any(&cancel).await.unwrap();

        let waiter_cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            waiter_cancel.cancel();
        });

        let err = manager.acquire_any(&cancel).await.unwrap_err();
        assert_eq!(err, Error::Cancelled);
    }

    #[tokio::test]
    async fn test_backend_error_propagates() {
        let backend = MemoryBackend::new();
        let manager = manager(&backend, 2);
        backend.set_failing(true);
        let err = manager
            .acquire_any(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Backend(_)));
    }
}
