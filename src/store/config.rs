//! Store construction parameters.
//!
//! Everything a process needs to take part in the staging pipeline:
//! backing-store address, optional auth credential, and the shard count.
//! Shard count is fixed for the store's lifetime: every cooperating
//! process must be configured with the same value, since both key hashing
//! and the lock sweep depend on it.

use std::time::Duration;

use crate::constants::{
    DATA_TTL, DEFAULT_MAX_PARTITIONS, LOCK_LEASE, LOCK_SWEEP_BACKOFF,
};
use crate::error::{Error, Result};

/// Configuration for a [`BucketStore`](super::BucketStore).
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Backing-store address, `host:port`.
    pub address: String,

    /// Authentication credential, if the backing store requires one.
    pub password: Option<String>,

    /// Number of shards. Fixed for the store's lifetime; changing it while
    /// old data exists orphans entries hashed under the old count.
    pub max_partitions: u64,

    /// TTL for bucket value lists and shard ready-sets.
    pub data_ttl: Duration,

    /// Lease granted to each shard lock.
    pub lock_lease: Duration,

    /// Pause between lock-sweep attempts when every shard is held.
    pub lock_backoff: Duration,
}

impl StoreConfig {
    /// Configuration with default TTLs and timing.
    pub fn new(address: impl Into<String>, max_partitions: u64) -> Self {
        Self {
            address: address.into(),
            password: None,
            max_partitions,
            data_ttl: DATA_TTL,
            lock_lease: LOCK_LEASE,
            lock_backoff: LOCK_SWEEP_BACKOFF,
        }
    }

    /// Set the auth credential.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Override TTL and lock timing. Mainly for tests; production
    /// deployments should keep the defaults so all processes agree.
    pub fn with_timing(
        mut self,
        data_ttl: Duration,
        lock_lease: Duration,
        lock_backoff: Duration,
    ) -> Self {
        self.data_ttl = data_ttl;
        self.lock_lease = lock_lease;
        self.lock_backoff = lock_backoff;
        self
    }

    /// Read configuration from the environment.
    ///
    /// - `GRANARY_ADDR`: backing-store address (required)
    /// - `GRANARY_PASSWORD`: auth credential (optional)
    /// - `GRANARY_MAX_PARTITIONS`: shard count (default 1)
    pub fn from_env() -> Result<Self> {
        let address = std::env::var("GRANARY_ADDR")
            .map_err(|_| Error::Config("GRANARY_ADDR not set".to_string()))?;
        let max_partitions = match std::env::var("GRANARY_MAX_PARTITIONS") {
            Ok(raw) => raw.parse::<u64>().map_err(|e| {
                Error::Config(format!("invalid GRANARY_MAX_PARTITIONS: {}", e))
            })?,
            Err(_) => DEFAULT_MAX_PARTITIONS,
        };
        let mut config = Self::new(address, max_partitions);
        if let Ok(password) = std::env::var("GRANARY_PASSWORD") {
            config = config.with_password(password);
        }
        config.validate()?;
        Ok(config)
    }

    /// Check invariants the rest of the store assumes.
    pub fn validate(&self) -> Result<()> {
        if self.address.is_empty() {
            return Err(Error::Config("address must not be empty".to_string()));
        }
        if self.max_partitions == 0 {
            return Err(Error::Config(
                "max_partitions must be at least 1".to_string(),
            ));
        }
        if self.lock_lease.is_zero() {
            return Err(Error::Config("lock_lease must be nonzero".to_string()));
        }
        Ok(())
    }
}
