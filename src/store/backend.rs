//! Backend seam for the backing key-value store.
//!
//! The store treats Redis as an ordered command-execution service: it needs
//! atomic multi-command batches, list append/read, set membership, key
//! expiry, a leased try-lock, and a liveness probe, nothing else. That
//! contract is captured by [`StoreBackend`] so the store logic can run
//! against either the production [`RedisBackend`] or the in-memory
//! [`MemoryBackend`](super::MemoryBackend) in tests.
//!
//! # Atomicity contract
//!
//! Each trait method that touches more than one key or command MUST execute
//! as a single all-or-nothing batch (`MULTI`/`EXEC` in the Redis backend).
//! Callers rely on this: a concurrent scanner never observes a key added to
//! a shard set without its values also being retrievable, and the
//! read-then-clear of a ready-set can never interleave with another
//! process's write to the same set while the shard lock is held.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use redis::aio::ConnectionManager;

use crate::error::{Error, Result};

/// Operations the store requires of its backing key-value service.
///
/// Implementations must be cheap to share (`&self` methods, internal
/// connection handling) because every store operation borrows the backend
/// for its duration, including the background scan task.
#[async_trait]
pub trait StoreBackend: Send + Sync + 'static {
    /// Atomically append `payload` to the list at `key`, refresh the key's
    /// TTL, add `key` to `shard_set`, and refresh the set's TTL.
    ///
    /// This is the whole write path of `put`: one batch, so shard
    /// membership and retrievable values always appear together.
    async fn append_values(
        &self,
        key: &[u8],
        payload: Bytes,
        key_ttl: Duration,
        shard_set: &str,
        set_ttl: Duration,
    ) -> Result<()>;

    /// Atomically read the full list at `key` and delete it.
    ///
    /// Returns the raw entries in store order. An absent key yields an
    /// empty vec; the "empty bucket" condition is the caller's to raise.
    async fn take_values(&self, key: &[u8]) -> Result<Vec<Bytes>>;

    /// Atomically read all members of `set` and delete it (clear-on-read).
    ///
    /// Returns the members and the delete count from the batch reply.
    async fn drain_set(&self, set: &str) -> Result<(Vec<Bytes>, u64)>;

    /// Atomically re-add `member` to `set` and refresh the set's TTL.
    ///
    /// Used for putback of not-yet-ready buckets during a scan.
    async fn restore_member(&self, set: &str, member: &[u8], ttl: Duration) -> Result<()>;

    /// Try to take the leased lock named `name`.
    ///
    /// Returns `true` if this caller now holds the lock. The lease expires
    /// on its own after `lease`; a crashed holder self-heals without
    /// intervention.
    async fn try_lock(&self, name: &str, lease: Duration) -> Result<bool>;

    /// Release the lock named `name`. Safe to call once per acquisition.
    async fn unlock(&self, name: &str) -> Result<()>;

    /// Liveness probe against the backing service.
    async fn ping(&self) -> Result<()>;
}

/// Production backend over a Redis instance.
///
/// Holds a multiplexed [`ConnectionManager`]: cloneable, auto-reconnecting,
/// and shared by all operations in the process, which is the modern
/// replacement for a borrow/return connection pool. Each operation clones
/// the manager for its duration and issues exactly one command or one
/// `MULTI`/`EXEC` batch.
#[derive(Clone)]
pub struct RedisBackend {
    manager: ConnectionManager,
}

impl RedisBackend {
    /// Connect to Redis at `address`, authenticating when `password` is
    /// given. Fails fast if the initial connection cannot be established.
    pub async fn connect(address: &str, password: Option<&str>) -> Result<Self> {
        let url = match password {
            Some(pass) => format!("redis://:{}@{}", pass, address),
            None => format!("redis://{}", address),
        };
        let client = redis::Client::open(url).map_err(Error::from)?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self { manager })
    }
}

#[async_trait]
impl StoreBackend for RedisBackend {
    async fn append_values(
        &self,
        key: &[u8],
        payload: Bytes,
        key_ttl: Duration,
        shard_set: &str,
        set_ttl: Duration,
    ) -> Result<()> {
        let mut conn = self.manager.clone();
        let mut pipe = redis::pipe();
        pipe.atomic()
            .rpush(key, payload.as_ref())
            .ignore()
            .expire(key, key_ttl.as_secs() as i64)
            .ignore()
            .sadd(shard_set, key)
            .ignore()
            .expire(shard_set, set_ttl.as_secs() as i64)
            .ignore();
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn take_values(&self, key: &[u8]) -> Result<Vec<Bytes>> {
        let mut conn = self.manager.clone();
        let (entries, _deleted): (Vec<Vec<u8>>, u64) = redis::pipe()
            .atomic()
            .lrange(key, 0, -1)
            .del(key)
            .query_async(&mut conn)
            .await?;
        Ok(entries.into_iter().map(Bytes::from).collect())
    }

    async fn drain_set(&self, set: &str) -> Result<(Vec<Bytes>, u64)> {
        let mut conn = self.manager.clone();
        let (members, deleted): (Vec<Vec<u8>>, u64) = redis::pipe()
            .atomic()
            .smembers(set)
            .del(set)
            .query_async(&mut conn)
            .await?;
        Ok((members.into_iter().map(Bytes::from).collect(), deleted))
    }

    async fn restore_member(&self, set: &str, member: &[u8], ttl: Duration) -> Result<()> {
        let mut conn = self.manager.clone();
        let mut pipe = redis::pipe();
        pipe.atomic()
            .sadd(set, member)
            .ignore()
            .expire(set, ttl.as_secs() as i64)
            .ignore();
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn try_lock(&self, name: &str, lease: Duration) -> Result<bool> {
        let mut conn = self.manager.clone();
        // SET NX PX: the lock exists exactly when some holder's lease is
        // still running.
        let reply: Option<String> = redis::cmd("SET")
            .arg(name)
            .arg("held")
            .arg("NX")
            .arg("PX")
            .arg(lease.as_millis() as u64)
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn unlock(&self, name: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        let _: u64 = redis::cmd("DEL").arg(name).query_async(&mut conn).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.manager.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}
