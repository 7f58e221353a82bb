//! Timegate - Sliding Window Concurrency Limiter
//!
//! This crate implements a limiter that allows at most N slots to be held at
//! once and keeps each slot out of circulation until a fixed window has
//! elapsed since its last release. Wrapping outbound calls in
//! [`SlidingWindowLimiter::run`] keeps a caller within a downstream service's
//! "at most N requests per T" policy.

pub mod batch;
pub mod cancel;
pub mod config;
pub mod error;
pub mod limiter;

pub use cancel::{CancelSignal, CancelSource};
pub use error::{Result, TimegateError};
pub use limiter::{ConcurrencyLimiter, SlidingWindowLimiter, SlotGuard, SlotLimiter};
