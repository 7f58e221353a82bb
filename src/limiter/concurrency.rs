//! Plain counting-semaphore limiter with no cooldown window.

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tracing::trace;

use super::backend::SlotLimiter;
use crate::cancel::CancelSignal;
use crate::error::{Result, TimegateError};

/// Caps the number of concurrently held slots without any rate window.
///
/// Behaves like `SlidingWindowLimiter` with a zero window, minus the
/// release-timestamp bookkeeping.
pub struct ConcurrencyLimiter {
    capacity: usize,
    permits: Semaphore,
}

impl ConcurrencyLimiter {
    /// Create a limiter with `capacity` slots.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 || capacity > Semaphore::MAX_PERMITS {
            return Err(TimegateError::InvalidCapacity(capacity));
        }
        Ok(Self {
            capacity,
            permits: Semaphore::new(capacity),
        })
    }

    /// Wait for a free slot, observing `cancel`.
    pub async fn acquire(&self, mut cancel: CancelSignal) -> Result<()> {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TimegateError::Cancelled),
            permit = self.permits.acquire() => permit.map_err(|_| TimegateError::Closed)?,
        };
        permit.forget();
        trace!(available = self.permits.available_permits(), "Slot acquired");
        Ok(())
    }

    /// Give back a slot.
    pub fn release(&self) {
        self.permits.add_permits(1);
        trace!(available = self.permits.available_permits(), "Slot released");
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Stop handing out slots.
    pub fn close(&self) {
        self.permits.close();
    }

    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }
}

#[async_trait]
impl SlotLimiter for ConcurrencyLimiter {
    async fn acquire(&self, cancel: CancelSignal) -> Result<()> {
        ConcurrencyLimiter::acquire(self, cancel).await
    }

    fn release(&self) {
        ConcurrencyLimiter::release(self)
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn available_permits(&self) -> usize {
        ConcurrencyLimiter::available_permits(self)
    }

    fn close(&self) {
        ConcurrencyLimiter::close(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelSource;
    use std::time::Duration;
    use tokio::time::Instant;

    #[test]
    fn test_zero_capacity_is_rejected() {
        assert!(matches!(
            ConcurrencyLimiter::new(0),
            Err(TimegateError::InvalidCapacity(0))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_delay_between_reacquires() {
        let limiter = ConcurrencyLimiter::new(1).unwrap();
        let start = Instant::now();

        for _ in 0..3 {
            limiter.acquire(CancelSignal::never()).await.unwrap();
            limiter.release();
        }

        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_cancel_while_full() {
        let limiter = ConcurrencyLimiter::new(1).unwrap();
        limiter.acquire(CancelSignal::never()).await.unwrap();

        let source = CancelSource::new();
        source.cancel();
        let result = limiter.acquire(source.signal()).await;

        assert!(matches!(result, Err(TimegateError::Cancelled)));
        assert_eq!(limiter.available_permits(), 0);

        limiter.release();
        assert_eq!(limiter.available_permits(), 1);
    }

    #[tokio::test]
    async fn test_acquire_after_close_fails() {
        let limiter = ConcurrencyLimiter::new(2).unwrap();
        limiter.close();

        assert!(limiter.is_closed());
        assert!(matches!(
            limiter.acquire(CancelSignal::never()).await,
            Err(TimegateError::Closed)
        ));
    }
}
