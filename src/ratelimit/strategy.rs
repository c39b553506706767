//! The pluggable limiting algorithm.

use std::fmt::Debug;

use crate::error::Result;

use super::decision::RetryAfter;
use super::quota::{Quota, Timestamp};

/// A limiting algorithm, expressed as pure functions over a per-identity state.
///
/// The engine owns the control flow (read, refresh, decide, write); a strategy
/// only says how its state evolves and how it is encoded for the store.
/// Implementations hold no per-identity data of their own.
pub trait Strategy: Send + Sync {
    /// The value persisted per identity.
    type State: Clone + Debug + PartialEq + Send;

    /// Short name used in logs and configuration.
    fn name(&self) -> &'static str;

    /// Whether concurrent callers for one identity are only safe when the
    /// store wraps each decision in a transaction.
    fn requires_transactions(&self) -> bool {
        false
    }

    /// State for an identity seen for the first time, already accounting
    /// for the call that created it.
    fn fresh_value(&self, now: Timestamp, quota: &Quota) -> Self::State;

    /// Bring a stored state forward to `now` (expire entries, accrue tokens)
    /// without deciding anything.
    fn get_up_to_date_value(&self, now: Timestamp, quota: &Quota, state: Self::State) -> Self::State;

    /// Whether an up-to-date state can admit one more call.
    fn has_spare_capacity(&self, state: &Self::State, quota: &Quota) -> bool;

    /// State after admitting a call at `now`.
    fn next_value_on_success(&self, now: Timestamp, state: Self::State) -> Self::State;

    /// Whether a rejected call still writes `next_value_on_limit` back.
    fn should_persist_on_limit(&self) -> bool;

    /// State written after a rejected call. Strategies that return `false`
    /// from `should_persist_on_limit` fail with `ContractViolation`.
    fn next_value_on_limit(
        &self,
        now: Timestamp,
        state: Self::State,
        quota: &Quota,
    ) -> Result<Self::State>;

    /// Retry hint for an up-to-date state.
    fn time_until_not_limited(&self, now: Timestamp, state: &Self::State, quota: &Quota)
        -> RetryAfter;

    /// Encode a state for the store.
    fn serialize(&self, state: &Self::State) -> Result<Vec<u8>>;

    /// Decode a state previously produced by `serialize`.
    fn deserialize(&self, bytes: &[u8]) -> Result<Self::State>;
}
