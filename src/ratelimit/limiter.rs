//! Core rate limiter implementation.

use tracing::{debug, trace, warn};

use crate::error::{FloodgateError, Result};
use crate::store::Store;

use super::decision::{Decision, RetryAfter};
use super::quota::{Quota, Timestamp};
use super::strategy::Strategy;

/// The decision engine: one store, one strategy, one fixed quota.
///
/// The limiter itself keeps no per-identity state; everything flows through
/// the store. When the store supports transactions each decision runs in
/// that identity's critical section, otherwise two concurrent decisions for
/// one identity can both read the same prior state and both be admitted.
pub struct RateLimiter<S, T> {
    /// Where per-identity state lives
    store: S,
    /// How state evolves and admission is decided
    strategy: T,
    /// The limit and window enforced for every identity
    quota: Quota,
}

impl<S: Store, T: Strategy> RateLimiter<S, T> {
    /// Create a new rate limiter.
    ///
    /// Fails with `InvalidConfig` when the strategy is only safe under
    /// transactions and the store cannot provide them.
    pub fn new(store: S, strategy: T, quota: Quota) -> Result<Self> {
        if !store.supports_transactions() {
            if strategy.requires_transactions() {
                return Err(FloodgateError::InvalidConfig(format!(
                    "the {} strategy requires a store with transaction support",
                    strategy.name()
                )));
            }
            warn!(
                strategy = strategy.name(),
                "Store has no transactions; concurrent calls for one identity may all be admitted"
            );
        }

        debug!(
            strategy = strategy.name(),
            limit = quota.limit(),
            window_ms = quota.window_millis(),
            "Rate limiter initialized"
        );

        Ok(Self {
            store,
            strategy,
            quota,
        })
    }

    /// Decide whether `identity` may proceed now.
    pub async fn decide(&self, identity: &str) -> Result<Decision> {
        self.decide_at(identity, Timestamp::now()).await
    }

    /// Decide whether `identity` may proceed at `now`.
    ///
    /// Store failures and undecodable state are returned as-is; nothing is
    /// retried and no default decision is substituted.
    pub async fn decide_at(&self, identity: &str, now: Timestamp) -> Result<Decision> {
        // Held until the decision is written back, if the store has one.
        let _txn = self.store.begin(identity).await?;

        let decision = if self.store.has(identity).await? {
            self.decide_existing(identity, now).await?
        } else {
            self.decide_first_seen(identity, now).await?
        };

        trace!(
            identity = %identity,
            strategy = self.strategy.name(),
            limited = decision.limited,
            retry_after = ?decision.retry_after,
            "Rate limit decision"
        );

        Ok(decision)
    }

    /// First call for an identity: create its state, unless nothing can
    /// ever be admitted.
    async fn decide_first_seen(&self, identity: &str, now: Timestamp) -> Result<Decision> {
        let fresh = self.strategy.fresh_value(now, &self.quota);

        if self.quota.limit() == 0 {
            let retry_after = self
                .strategy
                .time_until_not_limited(now, &fresh, &self.quota);
            return Ok(Decision::limited(retry_after));
        }

        debug!(identity = %identity, "Creating rate state for new identity");
        let bytes = self.strategy.serialize(&fresh)?;
        self.store.set(identity, bytes).await?;

        Ok(Decision::admitted(RetryAfter::Unknown))
    }

    /// Later calls: refresh the stored state, decide, and write back what
    /// the strategy asks for.
    async fn decide_existing(&self, identity: &str, now: Timestamp) -> Result<Decision> {
        let bytes = self.store.get(identity).await?;
        let value = self.strategy.deserialize(&bytes)?;

        let up_to_date = self.strategy.get_up_to_date_value(now, &self.quota, value);
        // State written under a larger quota must not admit anything at zero.
        let has_capacity = self.quota.limit() > 0
            && self.strategy.has_spare_capacity(&up_to_date, &self.quota);
        let retry_after = self
            .strategy
            .time_until_not_limited(now, &up_to_date, &self.quota);

        if has_capacity {
            let next = self.strategy.next_value_on_success(now, up_to_date);
            self.store.set(identity, self.strategy.serialize(&next)?).await?;
        } else {
            debug!(
                identity = %identity,
                limit = self.quota.limit(),
                "Rate limit exceeded"
            );
            if self.strategy.should_persist_on_limit() {
                let next = self
                    .strategy
                    .next_value_on_limit(now, up_to_date, &self.quota)?;
                self.store.set(identity, self.strategy.serialize(&next)?).await?;
            }
        }

        if has_capacity {
            Ok(Decision::admitted(retry_after))
        } else {
            Ok(Decision::limited(retry_after))
        }
    }

    /// Get the quota this limiter enforces.
    pub fn quota(&self) -> &Quota {
        &self.quota
    }

    /// Get the strategy.
    pub fn strategy(&self) -> &T {
        &self.strategy
    }

    /// Get the store.
    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S, T> std::fmt::Debug for RateLimiter<S, T>
where
    S: std::fmt::Debug,
    T: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("store", &self.store)
            .field("strategy", &self.strategy)
            .field("quota", &self.quota)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::{SlidingLog, TokenBucket, TokenBucketState};
    use std::sync::Arc;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::time::Duration;

    fn ts(millis: i64) -> Timestamp {
        Timestamp::from_millis(millis)
    }

    fn quota(limit: u64, window_ms: u64) -> Quota {
        Quota::new(limit, Duration::from_millis(window_ms)).unwrap()
    }

    /// A store whose backend is always down.
    struct UnreachableStore;

    #[async_trait]
    impl Store for UnreachableStore {
        async fn has(&self, _identity: &str) -> Result<bool> {
            Err(FloodgateError::StoreUnavailable("connection refused".to_string()))
        }

        async fn get(&self, _identity: &str) -> Result<Vec<u8>> {
            Err(FloodgateError::StoreUnavailable("connection refused".to_string()))
        }

        async fn set(&self, _identity: &str, _value: Vec<u8>) -> Result<()> {
            Err(FloodgateError::StoreUnavailable("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_first_call_is_admitted() {
        let limiter = RateLimiter::new(MemoryStore::new(), SlidingLog::new(), quota(10, 60_000)).unwrap();

        let decision = limiter.decide_at("new", ts(0)).await.unwrap();
        assert!(!decision.limited);
        assert_eq!(decision.retry_after, RetryAfter::Unknown);
        assert_eq!(limiter.store().get("new").await.unwrap(), b"[0]".to_vec());
    }

    #[tokio::test]
    async fn test_first_call_at_limit_one_has_no_retry_hint() {
        let sliding = RateLimiter::new(MemoryStore::new(), SlidingLog::new(), quota(1, 1_000)).unwrap();
        let bucket = RateLimiter::new(MemoryStore::new(), TokenBucket::new(), quota(1, 1_000)).unwrap();

        for decision in [
            sliding.decide_at("X", ts(0)).await.unwrap(),
            bucket.decide_at("X", ts(0)).await.unwrap(),
        ] {
            assert_eq!(decision, Decision::admitted(RetryAfter::Unknown));
        }

        // The next call is the one that learns how long to wait
        let rejected = bucket.decide_at("X", ts(400)).await.unwrap();
        assert_eq!(rejected, Decision::limited(RetryAfter::After(Duration::from_millis(600))));
    }

    #[tokio::test]
    async fn test_zero_limit_rejects_state_written_under_larger_quota() {
        let store = Arc::new(MemoryStore::new());
        store
            .set("X", br#"{"timestamp":0,"tokens":3}"#.to_vec())
            .await
            .unwrap();
        store.set("Y", b"[0]".to_vec()).await.unwrap();

        let bucket = RateLimiter::new(Arc::clone(&store), TokenBucket::new(), quota(0, 1_000)).unwrap();
        let sliding = RateLimiter::new(Arc::clone(&store), SlidingLog::new(), quota(0, 1_000)).unwrap();

        for i in 0..4 {
            let decision = bucket.decide_at("X", ts(i * 10)).await.unwrap();
            assert_eq!(decision, Decision::limited(RetryAfter::Never));
            let decision = sliding.decide_at("Y", ts(i * 10)).await.unwrap();
            assert_eq!(decision, Decision::limited(RetryAfter::Never));
        }
        assert_eq!(
            store.get("X").await.unwrap(),
            br#"{"timestamp":0,"tokens":3}"#.to_vec()
        );
    }

    #[tokio::test]
    async fn test_zero_limit_rejects_without_state() {
        let limiter = RateLimiter::new(MemoryStore::new(), TokenBucket::new(), quota(0, 60_000)).unwrap();

        for i in 0..3 {
            let decision = limiter.decide_at("anyone", ts(i * 1_000)).await.unwrap();
            assert!(decision.limited);
            assert_eq!(decision.retry_after, RetryAfter::Never);
        }
        assert!(limiter.store().is_empty());
    }

    #[tokio::test]
    async fn test_sliding_log_limits_after_quota() {
        let limiter = RateLimiter::new(MemoryStore::new(), SlidingLog::new(), quota(3, 1_000)).unwrap();

        let mut limited = Vec::new();
        for i in 0..4 {
            limited.push(limiter.decide_at("X", ts(100 + i)).await.unwrap().limited);
        }
        assert_eq!(limited, vec![false, false, false, true]);

        // Oldest entry (100) frees a slot at 1100
        let rejected = limiter.decide_at("X", ts(103)).await.unwrap();
        assert_eq!(rejected.retry_after, RetryAfter::After(Duration::from_millis(997)));

        let admitted = limiter.decide_at("X", ts(1_100)).await.unwrap();
        assert!(!admitted.limited);
    }

    #[tokio::test]
    async fn test_sliding_log_persists_pruned_log_on_rejection() {
        let store = MemoryStore::new();
        store.set("X", b"[0,500,900,950]".to_vec()).await.unwrap();
        let limiter = RateLimiter::new(store, SlidingLog::new(), quota(2, 1_000)).unwrap();

        let decision = limiter.decide_at("X", ts(1_500)).await.unwrap();
        assert!(decision.limited);
        assert_eq!(limiter.store().get("X").await.unwrap(), b"[900,950]".to_vec());
    }

    #[tokio::test]
    async fn test_token_bucket_rejection_leaves_state_untouched() {
        let limiter = RateLimiter::new(MemoryStore::new(), TokenBucket::new(), quota(2, 1_000)).unwrap();

        assert!(!limiter.decide_at("X", ts(0)).await.unwrap().limited);
        assert!(!limiter.decide_at("X", ts(10)).await.unwrap().limited);

        let before = limiter.store().get("X").await.unwrap();
        let rejected = limiter.decide_at("X", ts(20)).await.unwrap();
        assert!(rejected.limited);
        assert_eq!(rejected.retry_after, RetryAfter::After(Duration::from_millis(490)));
        assert_eq!(limiter.store().get("X").await.unwrap(), before);

        let state = limiter.strategy().deserialize(&before).unwrap();
        assert_eq!(
            state,
            TokenBucketState {
                timestamp: ts(10),
                tokens: 0
            }
        );
    }

    #[tokio::test]
    async fn test_token_bucket_replenishes() {
        let limiter = RateLimiter::new(MemoryStore::new(), TokenBucket::new(), quota(2, 1_000)).unwrap();

        assert!(!limiter.decide_at("X", ts(0)).await.unwrap().limited);
        assert!(!limiter.decide_at("X", ts(0)).await.unwrap().limited);
        assert!(limiter.decide_at("X", ts(499)).await.unwrap().limited);
        assert!(!limiter.decide_at("X", ts(500)).await.unwrap().limited);
        assert!(limiter.decide_at("X", ts(501)).await.unwrap().limited);
    }

    #[tokio::test]
    async fn test_identities_are_independent() {
        let limiter = RateLimiter::new(MemoryStore::new(), SlidingLog::new(), quota(1, 1_000)).unwrap();

        assert!(!limiter.decide_at("a", ts(0)).await.unwrap().limited);
        assert!(limiter.decide_at("a", ts(1)).await.unwrap().limited);
        assert!(!limiter.decide_at("b", ts(1)).await.unwrap().limited);
        assert_eq!(limiter.store().len(), 2);
    }

    #[test]
    fn test_token_bucket_requires_transactions() {
        let result = RateLimiter::new(
            MemoryStore::without_transactions(),
            TokenBucket::new(),
            quota(5, 1_000),
        );
        assert!(matches!(result, Err(FloodgateError::InvalidConfig(_))));

        let result = RateLimiter::new(
            MemoryStore::without_transactions(),
            SlidingLog::new(),
            quota(5, 1_000),
        );
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let limiter = RateLimiter::new(UnreachableStore, SlidingLog::new(), quota(5, 1_000)).unwrap();

        let err = limiter.decide_at("X", ts(0)).await.unwrap_err();
        assert!(matches!(err, FloodgateError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn test_corrupt_state_propagates() {
        let store = MemoryStore::new();
        store.set("X", b"{\"timestamp\":".to_vec()).await.unwrap();
        let limiter = RateLimiter::new(store, TokenBucket::new(), quota(5, 1_000)).unwrap();

        let err = limiter.decide_at("X", ts(0)).await.unwrap_err();
        assert!(matches!(err, FloodgateError::Serialization(_)));
        // Nothing was overwritten with a guessed default
        assert_eq!(limiter.store().get("X").await.unwrap(), b"{\"timestamp\":".to_vec());
    }

    #[tokio::test]
    async fn test_decide_uses_wall_clock() {
        let limiter = RateLimiter::new(MemoryStore::new(), TokenBucket::new(), quota(1, 60_000)).unwrap();

        let before = Timestamp::now();
        assert!(!limiter.decide("X").await.unwrap().limited);
        let state = limiter
            .strategy()
            .deserialize(&limiter.store().get("X").await.unwrap())
            .unwrap();
        assert!(state.timestamp >= before);
        assert!(limiter.decide("X").await.unwrap().limited);
    }
}
