//! Per-call admission outcome.

use std::time::Duration;

use serde::{Serialize, Serializer};

/// How long a caller should wait before the identity can be admitted again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAfter {
    /// The strategy cannot tell (typically because the call was admitted).
    Unknown,
    /// Capacity frees up after this long.
    After(Duration),
    /// Capacity never frees up under the current quota (limit of zero).
    Never,
}

impl RetryAfter {
    /// Get the wait as a duration, if one is known and finite.
    pub fn duration(&self) -> Option<Duration> {
        match self {
            RetryAfter::After(d) => Some(*d),
            RetryAfter::Unknown | RetryAfter::Never => None,
        }
    }

    /// Build a hint from a signed millisecond wait, clamping negatives to zero.
    pub(crate) fn from_millis(millis: i64) -> Self {
        RetryAfter::After(Duration::from_millis(millis.max(0) as u64))
    }
}

/// The result of a single `decide` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Decision {
    /// Whether the call was rejected
    pub limited: bool,
    /// Retry hint, serialized as whole milliseconds or null
    #[serde(rename = "retry_after_ms", serialize_with = "serialize_retry_after")]
    pub retry_after: RetryAfter,
}

impl Decision {
    /// An admitted decision.
    pub fn admitted(retry_after: RetryAfter) -> Self {
        Self {
            limited: false,
            retry_after,
        }
    }

    /// A rejected decision.
    pub fn limited(retry_after: RetryAfter) -> Self {
        Self {
            limited: true,
            retry_after,
        }
    }

    /// Whether the call was admitted.
    pub fn is_admitted(&self) -> bool {
        !self.limited
    }
}

fn serialize_retry_after<S: Serializer>(
    retry_after: &RetryAfter,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match retry_after.duration() {
        Some(d) => serializer.serialize_u64(d.as_millis() as u64),
        None => serializer.serialize_none(),
    }
}
