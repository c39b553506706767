//! Rate limiting engine and strategies.

mod callbacks;
mod decision;
mod limiter;
mod quota;
mod sliding_log;
mod strategy;
mod token_bucket;

pub use callbacks::Callbacks;
pub use decision::{Decision, RetryAfter};
pub use limiter::RateLimiter;
pub use quota::{Quota, TimeUnit, Timestamp};
pub use sliding_log::{SlidingLog, SlidingLogState};
pub use strategy::Strategy;
pub use token_bucket::{TokenBucket, TokenBucketState};
