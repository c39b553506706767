//! In-process store backed by concurrent hash maps.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

use crate::error::{FloodgateError, Result};

use super::{Store, Transaction};

/// A store that keeps rate state in process memory.
///
/// Transactions are per-identity async mutexes, so callers for distinct
/// identities never wait on each other. State is lost when the store is
/// dropped.
#[derive(Debug)]
pub struct MemoryStore {
    /// Serialized state indexed by identity
    entries: DashMap<String, Vec<u8>>,
    /// Per-identity critical sections; `None` disables transactions
    locks: Option<Arc<LockMap>>,
}

type LockMap = DashMap<String, Arc<Mutex<()>>>;

/// Holds one identity's lock and drops its map entry once nobody else
/// holds or waits on it.
struct IdentityLock {
    identity: String,
    locks: Arc<LockMap>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for IdentityLock {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Every holder and waiter owns a clone; only the map's handle remains when idle.
        self.locks
            .remove_if(&self.identity, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl MemoryStore {
    /// Create an empty store with per-identity transactions.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            locks: Some(Arc::new(DashMap::new())),
        }
    }

    /// Create an empty store without transactional isolation.
    ///
    /// Concurrent decisions for the same identity may both read the same
    /// prior state; only strategies that tolerate this can use it.
    pub fn without_transactions() -> Self {
        Self {
            entries: DashMap::new(),
            locks: None,
        }
    }

    /// Remove all stored state.
    pub fn clear(&self) {
        self.entries.clear();
        if let Some(locks) = &self.locks {
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
    }

    /// Get the number of identities with stored state.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no identity has stored state.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn has(&self, identity: &str) -> Result<bool> {
        Ok(self.entries.contains_key(identity))
    }

    async fn get(&self, identity: &str) -> Result<Vec<u8>> {
        self.entries
            .get(identity)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| FloodgateError::MissingState(identity.to_string()))
    }

    async fn set(&self, identity: &str, value: Vec<u8>) -> Result<()> {
        trace!(identity = %identity, bytes = value.len(), "Storing rate state");
        self.entries.insert(identity.to_string(), value);
        Ok(())
    }

    fn supports_transactions(&self) -> bool {
        self.locks.is_some()
    }

    async fn begin(&self, identity: &str) -> Result<Option<Transaction>> {
        let Some(locks) = &self.locks else {
            return Ok(None);
        };

        // Clone the lock out so no map shard stays borrowed across the await.
        let lock = locks.entry(identity.to_string()).or_default().clone();
        let guard = lock.lock_owned().await;

        trace!(identity = %identity, "Entered transaction");
        let held = IdentityLock {
            identity: identity.to_string(),
            locks: Arc::clone(locks),
            guard: Some(guard),
        };
        Ok(Some(Transaction::new(identity, held)))
    }
}
