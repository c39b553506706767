//! Sliding log strategy.
//!
//! Keeps the timestamp of every admitted call within the window, oldest
//! first. A call is admitted while fewer than `limit` entries remain after
//! expired ones are dropped. Rejected calls are never logged, but the pruned
//! log is still written back so stale entries cannot pile up.

use std::collections::VecDeque;

use crate::error::{FloodgateError, Result};

use super::decision::RetryAfter;
use super::quota::{Quota, Timestamp};
use super::strategy::Strategy;

/// Admission timestamps for one identity, oldest first, non-decreasing.
pub type SlidingLogState = VecDeque<Timestamp>;

/// The sliding log strategy.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlidingLog;

impl SlidingLog {
    /// Create the strategy.
    pub fn new() -> Self {
        Self
    }
}

/// Whether `entry` still counts against the window as of `now`.
fn within_window(now: Timestamp, window_ms: i64, entry: Timestamp) -> bool {
    now.millis_since(entry) < window_ms
}

impl Strategy for SlidingLog {
    type State = SlidingLogState;

    fn name(&self) -> &'static str {
        "sliding_log"
    }

    fn fresh_value(&self, now: Timestamp, _quota: &Quota) -> Self::State {
        VecDeque::from([now])
    }

    fn get_up_to_date_value(
        &self,
        now: Timestamp,
        quota: &Quota,
        mut state: Self::State,
    ) -> Self::State {
        while let Some(&oldest) = state.front() {
            if within_window(now, quota.window_millis(), oldest) {
                break;
            }
            state.pop_front();
        }
        state
    }

    fn has_spare_capacity(&self, state: &Self::State, quota: &Quota) -> bool {
        (state.len() as u64) < quota.limit()
    }

    fn next_value_on_success(&self, now: Timestamp, mut state: Self::State) -> Self::State {
        // A clock that steps backwards must not break the ordering.
        let entry = match state.back() {
            Some(&newest) if newest > now => newest,
            _ => now,
        };
        state.push_back(entry);
        state
    }

    fn should_persist_on_limit(&self) -> bool {
        true
    }

    fn next_value_on_limit(
        &self,
        _now: Timestamp,
        state: Self::State,
        _quota: &Quota,
    ) -> Result<Self::State> {
        Ok(state)
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
        if self.has_spare_capacity(state, quota) {
            return RetryAfter::Unknown;
        }
        match state.front() {
            Some(&oldest) => {
                let frees_at = oldest.plus_millis(quota.window_millis());
                RetryAfter::from_millis(frees_at.millis_since(now))
            }
            None => RetryAfter::Unknown,
        }
    }

    fn serialize(&self, state: &Self::State) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(state)?)
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Self::State> {
        let state: SlidingLogState = serde_json::from_slice(bytes)?;
        let ordered = state
            .iter()
            .zip(state.iter().skip(1))
            .all(|(a, b)| a <= b);
        if !ordered {
            return Err(FloodgateError::Serialization(
                "sliding log entries are not in chronological order".to_string(),
            ));
        }
        Ok(state)
    }
}
