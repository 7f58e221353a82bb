//! Slot limiter trait for abstracting the windowed and plain limiters.

use async_trait::async_trait;

use crate::cancel::CancelSignal;
use crate::error::Result;

/// Trait for slot limiter implementations.
///
/// This trait abstracts over the `SlidingWindowLimiter` and the plain
/// `ConcurrencyLimiter` so guards and the batch driver work with either.
///
/// Every successful `acquire` must be paired with exactly one `release`.
/// Prefer [`run_guarded`](super::run_guarded) or a [`SlotGuard`](super::SlotGuard)
/// over calling the pair by hand.
#[async_trait]
pub trait SlotLimiter: Send + Sync {
    /// Wait for a slot, observing `cancel` for the whole wait.
    async fn acquire(&self, cancel: CancelSignal) -> Result<()>;

    /// Give back a slot obtained from `acquire`.
    fn release(&self);

    /// Maximum number of slots held at once.
    fn capacity(&self) -> usize;

    /// Slots that could be acquired without waiting for a permit.
    fn available_permits(&self) -> usize;

    /// Stop handing out slots. Pending and future acquires fail.
    fn close(&self);
}
