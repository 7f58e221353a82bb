//! Sliding-window concurrency limiter.
//!
//! At most `capacity` slots are held at once, and a slot is not handed out
//! again until `window` has elapsed since it was last released. Slots are
//! recycled through a FIFO of release stamps: the k-th acquire waits for the
//! oldest outstanding release, which bounds the number of acquisitions that
//! start within any `window`-long span to `capacity`.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use super::backend::SlotLimiter;
use super::permit::{run_guarded, run_guarded_async};
use super::stamps::{ReleaseQueue, ReleaseStamp};
use crate::cancel::CancelSignal;
use crate::error::{Result, TimegateError};

/// Shortest cooldown wait, so a woken caller never lands just before the
/// window has actually reset.
pub const MIN_COOLDOWN_WAIT: Duration = Duration::from_millis(1);

/// Longest supported window. Longer windows are clamped.
pub const MAX_WINDOW: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);

/// Allows a limited number of acquisitions during a time window.
///
/// This struct is thread-safe and can be shared across multiple tasks.
pub struct SlidingWindowLimiter {
    capacity: usize,
    window: Duration,
    /// Slots not currently held
    permits: Semaphore,
    /// Release times of the slots not currently held, oldest first
    release_times: ReleaseQueue,
}

impl SlidingWindowLimiter {
    /// Create a limiter allowing `capacity` acquisitions per `window`.
    pub fn new(capacity: usize, window: Duration) -> Result<Self> {
        if capacity == 0 || capacity > Semaphore::MAX_PERMITS {
            return Err(TimegateError::InvalidCapacity(capacity));
        }

        let window = if window > MAX_WINDOW {
            warn!(
                requested_ms = window.as_millis() as u64,
                max_ms = MAX_WINDOW.as_millis() as u64,
                "Window too long, clamping"
            );
            MAX_WINDOW
        } else {
            window
        };

        info!(
            capacity = capacity,
            window_ms = window.as_millis() as u64,
            "Sliding window limiter created"
        );

        Ok(Self {
            capacity,
            window,
            permits: Semaphore::new(capacity),
            release_times: ReleaseQueue::new(capacity),
        })
    }

    /// Wait until a slot is free and its window has reset, observing `cancel`.
    ///
    /// On success the caller holds one slot and must call [`release`](Self::release)
    /// exactly once. On failure nothing is held and the limiter state is
    /// unchanged. Dropping the returned future before it completes is
    /// equivalent to cancelling it.
    pub async fn acquire(&self, mut cancel: CancelSignal) -> Result<()> {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                trace!("Acquire cancelled while waiting for a slot");
                return Err(TimegateError::Cancelled);
            }
            permit = self.permits.acquire() => permit.map_err(|_| TimegateError::Closed)?,
        };

        let pending = PendingSlot {
            release_times: &self.release_times,
            oldest: self.release_times.pop_oldest(),
            permit: Some(permit),
        };

        if let Some(deadline) = self.cooldown_deadline(pending.oldest, Instant::now()) {
            debug!(
                wait_ms = deadline.saturating_duration_since(Instant::now()).as_millis() as u64,
                "Waiting for sliding window to reset"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Acquire cancelled while waiting for window reset");
                    return Err(TimegateError::Cancelled);
                }
                _ = tokio::time::sleep_until(deadline) => {}
            }
        }

        pending.commit();
        trace!(available = self.permits.available_permits(), "Slot acquired");
        Ok(())
    }

    /// Give back a slot obtained from [`acquire`](Self::acquire).
    ///
    /// Calling this without a matching acquire breaks the limiter; debug
    /// builds panic.
    pub fn release(&self) {
        self.release_times.record(Instant::now());
        self.permits.add_permits(1);
        trace!(available = self.permits.available_permits(), "Slot released");
    }

    /// Run `action` while holding a slot.
    ///
    /// The slot is released after `action` returns or panics. If the acquire
    /// fails, `action` is not run.
    pub async fn run<F, T>(&self, action: F, cancel: CancelSignal) -> Result<T>
    where
        F: FnOnce() -> T,
    {
        run_guarded(self, action, cancel).await
    }

    /// Await `work` while holding a slot.
    pub async fn run_async<Fut>(&self, work: Fut, cancel: CancelSignal) -> Result<Fut::Output>
    where
        Fut: Future,
    {
        run_guarded_async(self, work, cancel).await
    }

    /// Stop handing out slots.
    ///
    /// Acquires that are waiting for a slot, and any later acquire, fail
    /// with [`TimegateError::Closed`]. Must not be called while slots are
    /// still held by callers that expect to keep using the limiter.
    pub fn close(&self) {
        if !self.permits.is_closed() {
            info!(
                available = self.permits.available_permits(),
                "Closing sliding window limiter"
            );
        }
        self.permits.close();
    }

    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }

    /// Maximum number of slots held at once.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Minimum time between a slot's release and its next acquisition.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Slots that are free to be taken (their window may not have reset yet).
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Number of release stamps waiting to be consumed.
    ///
    /// Equals `capacity` whenever no slot is held or being acquired.
    pub fn queued_releases(&self) -> usize {
        self.release_times.len()
    }

    /// When a caller that took `oldest` may proceed, if it has to wait at all.
    fn cooldown_deadline(&self, oldest: ReleaseStamp, now: Instant) -> Option<Instant> {
        let reset = oldest.reset_at(self.window)?;
        if reset > now {
            Some(reset.max(now + MIN_COOLDOWN_WAIT))
        } else {
            None
        }
    }
}

#[async_trait]
impl SlotLimiter for SlidingWindowLimiter {
    async fn acquire(&self, cancel: CancelSignal) -> Result<()> {
        SlidingWindowLimiter::acquire(self, cancel).await
    }

    fn release(&self) {
        SlidingWindowLimiter::release(self)
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn available_permits(&self) -> usize {
        SlidingWindowLimiter::available_permits(self)
    }

    fn close(&self) {
        SlidingWindowLimiter::close(self)
    }
}

/// A permit and release stamp taken by an acquire that has not finished.
///
/// Dropping it undoes the acquire: the stamp goes back into the queue at its
/// release-order position, then the permit goes back to the semaphore.
struct PendingSlot<'a> {
    release_times: &'a ReleaseQueue,
    oldest: ReleaseStamp,
    permit: Option<SemaphorePermit<'a>>,
}

impl PendingSlot<'_> {
    /// Hand the slot to the caller.
    fn commit(mut self) {
        if let Some(permit) = self.permit.take() {
            permit.forget();
        }
    }
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        // Restore before the permit field is dropped so the queue never
        // has fewer stamps than free permits.
        if self.permit.is_some() {
            self.release_times.restore(self.oldest);
        }
    }
}
