//! Token bucket strategy with lazy replenishment.
//!
//! Each identity holds a bucket of up to `limit` tokens. One token is worth
//! `window / limit` of time; tokens are only recomputed when the identity is
//! seen again, from the time of the last recalculation. A rejected call
//! leaves the stored bucket untouched, so the next successful recalculation
//! accounts for the whole elapsed interval.

use serde::{Deserialize, Serialize};

use crate::error::{FloodgateError, Result};

use super::decision::RetryAfter;
use super::quota::{Quota, Timestamp};
use super::strategy::Strategy;

/// Bucket state for one identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenBucketState {
    /// When tokens were last recalculated
    pub timestamp: Timestamp,
    /// Tokens remaining as of `timestamp`
    pub tokens: u64,
}

/// The token bucket strategy.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenBucket;

impl TokenBucket {
    /// Create the strategy.
    pub fn new() -> Self {
        Self
    }
}

/// Number of whole token slices in `elapsed_ms`, i.e.
/// `floor(elapsed_ms / (window_ms / limit))`, computed without floats.
fn elapsed_slices(elapsed_ms: i64, quota: &Quota) -> u128 {
    if elapsed_ms <= 0 {
        return 0;
    }
    (elapsed_ms as u128 * quota.limit() as u128) / quota.window_millis() as u128
}

/// Milliseconds one token takes to replenish, rounded up.
fn slice_millis(quota: &Quota) -> i64 {
    let window = quota.window_millis() as u128;
    let limit = quota.limit() as u128;
    let slice = window.div_ceil(limit);
    i64::try_from(slice).unwrap_or(i64::MAX)
}

impl Strategy for TokenBucket {
    type State = TokenBucketState;

    fn name(&self) -> &'static str {
        "token_bucket"
    }

    fn requires_transactions(&self) -> bool {
        true
    }

    fn fresh_value(&self, now: Timestamp, quota: &Quota) -> Self::State {
        // The call that creates the bucket consumes the first token.
        TokenBucketState {
            timestamp: now,
            tokens: quota.limit().saturating_sub(1),
        }
    }

    fn get_up_to_date_value(&self, now: Timestamp, quota: &Quota, state: Self::State) -> Self::State {
        // Stored tokens can exceed a limit that has since been lowered.
        let limit = quota.limit();
        let slices = elapsed_slices(now.millis_since(state.timestamp), quota);
        let tokens = if slices >= limit as u128 {
            limit
        } else {
            state.tokens.saturating_add(slices as u64).min(limit)
        };

        TokenBucketState {
            timestamp: state.timestamp,
            tokens,
        }
    }

    fn has_spare_capacity(&self, state: &Self::State, quota: &Quota) -> bool {
        quota.limit() > 0 && state.tokens > 0
    }

    fn next_value_on_success(&self, now: Timestamp, state: Self::State) -> Self::State {
        TokenBucketState {
            timestamp: now.max(state.timestamp),
            tokens: state.tokens.saturating_sub(1),
        }
    }

    fn should_persist_on_limit(&self) -> bool {
        false
    }

    fn next_value_on_limit(
        &self,
        _now: Timestamp,
        _state: Self::State,
        _quota: &Quota,
    ) -> Result<Self::State> {
        Err(FloodgateError::ContractViolation(
            "token bucket state must not be written on a rejected call".to_string(),
        ))
    }

    fn time_until_not_limited(
        &self,
        now: Timestamp,
        state: &Self::State,
        quota: &Quota,
    ) -> RetryAfter {
        if quota.limit() == 0 {
            return RetryAfter::Never;
        }
        if state.tokens > 0 {
            return RetryAfter::Unknown;
        }
        let next_token_at = state.timestamp.plus_millis(slice_millis(quota));
        RetryAfter::from_millis(next_token_at.millis_since(now))
    }

    fn serialize(&self, state: &Self::State) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(state)?)
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Self::State> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
