//! Callback-style dispatch over [`RateLimiter::decide`].

use crate::error::Result;
use crate::store::Store;

use super::decision::{Decision, RetryAfter};
use super::limiter::RateLimiter;
use super::quota::Timestamp;
use super::strategy::Strategy;

type OnLimited<'a> = Box<dyn FnOnce(RetryAfter) + Send + 'a>;
type OnAdmitted<'a> = Box<dyn FnOnce() + Send + 'a>;

/// Handlers run after a decision. Either may be left out, in which case
/// that outcome is silently ignored.
#[derive(Default)]
pub struct Callbacks<'a> {
    on_limited: Option<OnLimited<'a>>,
    on_admitted: Option<OnAdmitted<'a>>,
}

impl<'a> Callbacks<'a> {
    /// Callbacks that do nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` with the retry hint when the call is rejected.
    pub fn on_limited<F>(mut self, f: F) -> Self
    where
        F: FnOnce(RetryAfter) + Send + 'a,
    {
        self.on_limited = Some(Box::new(f));
        self
    }

    /// Run `f` when the call is admitted.
    pub fn on_admitted<F>(mut self, f: F) -> Self
    where
        F: FnOnce() + Send + 'a,
    {
        self.on_admitted = Some(Box::new(f));
        self
    }

    fn dispatch(self, decision: &Decision) {
        if decision.limited {
            if let Some(f) = self.on_limited {
                f(decision.retry_after);
            }
        } else if let Some(f) = self.on_admitted {
            f();
        }
    }
}

impl std::fmt::Debug for Callbacks<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_limited", &self.on_limited.is_some())
            .field("on_admitted", &self.on_admitted.is_some())
            .finish()
    }
}

impl<S: Store, T: Strategy> RateLimiter<S, T> {
    /// Decide for `identity` now and run the matching callback.
    ///
    /// The decision is still returned. If deciding fails, no callback runs.
    pub async fn decide_with(&self, identity: &str, callbacks: Callbacks<'_>) -> Result<Decision> {
        self.decide_with_at(identity, Timestamp::now(), callbacks).await
    }

    /// Decide for `identity` at `now` and run the matching callback.
    pub async fn decide_with_at(
        &self,
        identity: &str,
        now: Timestamp,
        callbacks: Callbacks<'_>,
    ) -> Result<Decision> {
        let decision = self.decide_at(identity, now).await?;
        callbacks.dispatch(&decision);
        Ok(decision)
    }
}
