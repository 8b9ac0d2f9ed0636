//! In-memory backend for testing.
//!
//! A full implementation of [`StoreBackend`] over process-local hash maps,
//! so the store's put/get/scan/lock machinery can be exercised without a
//! running Redis. Lists, sets, TTLs, leased locks, and clear-on-read drains
//! all behave as the production backend does, with expiry evaluated lazily
//! on access.
//!
//! The backend also carries a failure-injection switch for exercising
//! connectivity error paths.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;

use super::backend::StoreBackend;
use crate::error::{Error, Result};

/// A stored value with an optional expiry.
#[derive(Debug, Clone)]
struct Entry<T> {
    value: T,
    expires_at: Option<Instant>,
}

impl<T> Entry<T> {
    fn expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug, Default)]
struct State {
    lists: HashMap<Vec<u8>, Entry<Vec<Bytes>>>,
    sets: HashMap<String, Entry<HashSet<Vec<u8>>>>,
    locks: HashMap<String, Instant>,
    failing: bool,
}

impl State {
    fn prune(&mut self, now: Instant) {
        self.lists.retain(|_, e| !e.expired(now));
        self.sets.retain(|_, e| !e.expired(now));
        self.locks.retain(|_, lease_end| *lease_end > now);
    }

    fn check_available(&self) -> Result<()> {
        if self.failing {
            return Err(Error::Backend("injected failure".to_string()));
        }
        Ok(())
    }
}

/// In-memory [`StoreBackend`] with lazy TTL expiry.
///
/// Cloning shares the underlying state, mirroring how multiple store
/// handles would share one Redis instance.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Mutex<State>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail with a backend error, or
    /// restore normal service. Simulates an unreachable store.
    pub fn set_failing(&self, failing: bool) {
        self.lock_state().failing = failing;
    }

    /// Members currently in `set` (test inspection helper).
    pub fn set_members(&self, set: &str) -> Vec<Bytes> {
        let mut state = self.lock_state();
        state.prune(Instant::now());
        state
            .sets
            .get(set)
            .map(|e| e.value.iter().cloned().map(Bytes::from).collect())
            .unwrap_or_default()
    }

    /// Whether a value list exists for `key` (test inspection helper).
    pub fn has_list(&self, key: &[u8]) -> bool {
        let mut state = self.lock_state();
        state.prune(Instant::now());
        state.lists.contains_key(key)
    }

    /// Whether the lock named `name` is currently held.
    pub fn lock_held(&self, name: &str) -> bool {
        let mut state = self.lock_state();
        state.prune(Instant::now());
        state.locks.contains_key(name)
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, State> {
        self.inner.lock().expect("memory backend lock poisoned")
    }
}

#[async_trait]
impl StoreBackend for MemoryBackend {
    async fn append_values(
        &self,
        key: &[u8],
        payload: Bytes,
        key_ttl: Duration,
        shard_set: &str,
        set_ttl: Duration,
    ) -> Result<()> {
        let now = Instant::now();
        let mut state = self.lock_state();
        state.check_available()?;
        state.prune(now);

        let list = state.lists.entry(key.to_vec()).or_insert_with(|| Entry {
            value: Vec::new(),
            expires_at: None,
        });
        list.value.push(payload);
        list.expires_at = Some(now + key_ttl);

        let set = state
            .sets
            .entry(shard_set.to_string())
            .or_insert_with(|| Entry {
                value: HashSet::new(),
                expires_at: None,
            });
        set.value.insert(key.to_vec());
        set.expires_at = Some(now + set_ttl);
        Ok(())
    }

    async fn take_values(&self, key: &[u8]) -> Result<Vec<Bytes>> {
        let mut state = self.lock_state();
        state.check_available()?;
        state.prune(Instant::now());
        Ok(state
            .lists
            .remove(key)
            .map(|e| e.value)
            .unwrap_or_default())
    }

    async fn drain_set(&self, set: &str) -> Result<(Vec<Bytes>, u64)> {
        let mut state = self.lock_state();
        state.check_available()?;
        state.prune(Instant::now());
        match state.sets.remove(set) {
            Some(entry) => {
                let members = entry.value.into_iter().map(Bytes::from).collect();
                Ok((members, 1))
            }
            None => Ok((Vec::new(), 0)),
        }
    }

    async fn restore_member(&self, set: &str, member: &[u8], ttl: Duration) -> Result<()> {
        let now = Instant::now();
        let mut state = self.lock_state();
        state.check_available()?;
        state.prune(now);
        let entry = state
            .sets
            .entry(set.to_string())
            .or_insert_with(|| Entry {
                value: HashSet::new(),
                expires_at: None,
            });
        entry.value.insert(member.to_vec());
        entry.expires_at = Some(now + ttl);
        Ok(())
    }

    async fn try_lock(&self, name: &str, lease: Duration) -> Result<bool> {
        let now = Instant::now();
        let mut state = self.lock_state();
        state.check_available()?;
        state.prune(now);
        if state.locks.contains_key(name) {
            return Ok(false);
        }
        state.locks.insert(name.to_string(), now + lease);
        Ok(true)
    }

    async fn unlock(&self, name: &str) -> Result<()> {
        let mut state = self.lock_state();
        state.check_available()?;
        state.locks.remove(name);
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.lock_state().check_available()
    }
}
