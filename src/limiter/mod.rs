//! Slot limiters and their bookkeeping.

mod backend;
mod concurrency;
mod permit;
mod stamps;
mod window;

pub use backend::SlotLimiter;
pub use concurrency::ConcurrencyLimiter;
pub use permit::{run_guarded, run_guarded_async, SlotGuard};
pub use window::{SlidingWindowLimiter, MAX_WINDOW, MIN_COOLDOWN_WAIT};
