//! Floodgate - per-identity rate limiting
//!
//! This crate decides, for each identity, whether an operation is admitted
//! or rejected within a time window. The decision engine is generic over a
//! limiting [`Strategy`](ratelimit::Strategy) (sliding log or token bucket)
//! and a persistence [`Store`](store::Store) that owns all per-identity state.

pub mod config;
pub mod error;
pub mod ratelimit;
pub mod store;

pub use error::{FloodgateError, Result};
pub use ratelimit::{Callbacks, Decision, Quota, RateLimiter, RetryAfter, SlidingLog, TokenBucket};
pub use store::{MemoryStore, Store};
