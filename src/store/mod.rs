//! Persistence backends for per-identity rate state.
//!
//! The limiter only ever talks to a [`Store`]: keyed `has`/`get`/`set` over
//! opaque bytes, plus an optional per-identity critical section. Strategies
//! own the byte format; a store must hand back exactly what it was given.

mod memory;

pub use memory::MemoryStore;

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

/// Exclusive access to one identity's state, held until dropped.
///
/// While a transaction is alive, no other `begin()` on the same store and
/// identity can complete. Transactions on different identities never
/// contend with each other.
pub struct Transaction {
    identity: String,
    _guard: Box<dyn Any + Send + Sync>,
}

impl Transaction {
    /// Wrap a backend-specific guard. The critical section ends when the
    /// guard is dropped.
    pub fn new<G>(identity: impl Into<String>, guard: G) -> Self
    where
        G: Send + Sync + 'static,
    {
        Self {
            identity: identity.into(),
            _guard: Box::new(guard),
        }
    }

    /// The identity this transaction protects.
    pub fn identity(&self) -> &str {
        &self.identity
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("identity", &self.identity)
            .finish()
    }
}

/// Trait for rate state backends.
///
/// Backend failures are reported as `FloodgateError::StoreUnavailable` and
/// are passed to the caller of `decide` unchanged.
#[async_trait]
pub trait Store: Send + Sync {
    /// Whether any state is stored for `identity`.
    async fn has(&self, identity: &str) -> Result<bool>;

    /// Stored bytes for `identity`. Fails with `MissingState` when `has`
    /// would return false.
    async fn get(&self, identity: &str) -> Result<Vec<u8>>;

    /// Replace the stored bytes for `identity`.
    async fn set(&self, identity: &str, value: Vec<u8>) -> Result<()>;

    /// Whether `begin` returns real transactions.
    fn supports_transactions(&self) -> bool {
        false
    }

    /// Enter the critical section for `identity`, waiting for any other
    /// holder to leave it. Backends without transactional isolation return
    /// `Ok(None)`.
    async fn begin(&self, _identity: &str) -> Result<Option<Transaction>> {
        Ok(None)
    }
}

#[async_trait]
impl<S: Store + ?Sized> Store for Arc<S> {
    async fn has(&self, identity: &str) -> Result<bool> {
        (**self).has(identity).await
    }

    async fn get(&self, identity: &str) -> Result<Vec<u8>> {
        (**self).get(identity).await
    }

    async fn set(&self, identity: &str, value: Vec<u8>) -> Result<()> {
        (**self).set(identity, value).await
    }

    fn supports_transactions(&self) -> bool {
        (**self).supports_transactions()
    }

    async fn begin(&self, identity: &str) -> Result<Option<Transaction>> {
        (**self).begin(identity).await
    }
}
