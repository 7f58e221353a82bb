//! Scoped slot ownership.

use std::future::Future;

use tracing::trace;

use super::backend::SlotLimiter;
use crate::cancel::CancelSignal;
use crate::error::Result;

/// A held slot that is released when dropped.
///
/// Dropping the guard (normal exit, early return, panic unwind, or the
/// owning future being dropped) releases the slot exactly once.
#[must_use = "the slot is released as soon as the guard is dropped"]
pub struct SlotGuard<'a, L: SlotLimiter + ?Sized> {
    limiter: &'a L,
}

impl<'a, L: SlotLimiter + ?Sized> SlotGuard<'a, L> {
    /// Acquire a slot from `limiter` and wrap it in a guard.
    pub async fn acquire(limiter: &'a L, cancel: CancelSignal) -> Result<Self> {
        limiter.acquire(cancel).await?;
        Ok(Self { limiter })
    }
}

impl<L: SlotLimiter + ?Sized> Drop for SlotGuard<'_, L> {
    fn drop(&mut self) {
        trace!("Releasing guarded slot");
        self.limiter.release();
    }
}

/// Run `action` while holding a slot of `limiter`.
///
/// The action is not run if the acquire fails. Once it has been acquired the
/// slot is released after the action returns or panics.
pub async fn run_guarded<L, F, T>(limiter: &L, action: F, cancel: CancelSignal) -> Result<T>
where
    L: SlotLimiter + ?Sized,
    F: FnOnce() -> T,
{
    let _slot = SlotGuard::acquire(limiter, cancel).await?;
    Ok(action())
}

/// Await `work` while holding a slot of `limiter`.
///
/// `work` is not polled until the slot is held. The slot is also released
/// if the returned future is dropped before `work` completes.
pub async fn run_guarded_async<L, Fut>(
    limiter: &L,
    work: Fut,
    cancel: CancelSignal,
) -> Result<Fut::Output>
where
    L: SlotLimiter + ?Sized,
    Fut: Future,
{
    let _slot = SlotGuard::acquire(limiter, cancel).await?;
    Ok(work.await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelSource;
    use crate::error::TimegateError;
    use crate::limiter::ConcurrencyLimiter;
    use futures::FutureExt;
    use std::panic::AssertUnwindSafe;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn test_guard_releases_on_drop() {
        let limiter = ConcurrencyLimiter::new(2).unwrap();

        let guard = SlotGuard::acquire(&limiter, CancelSignal::never()).await.unwrap();
        assert_eq!(limiter.available_permits(), 1);

        drop(guard);
        assert_eq!(limiter.available_permits(), 2);
    }

    #[tokio::test]
    async fn test_run_guarded_returns_action_value() {
        let limiter = ConcurrencyLimiter::new(1).unwrap();

        let value = run_guarded(&limiter, || 42, CancelSignal::never()).await.unwrap();
        assert_eq!(value, 42);
        assert_eq!(limiter.available_permits(), 1);
    }

    #[tokio::test]
    async fn test_run_guarded_releases_when_action_fails() {
        let limiter = ConcurrencyLimiter::new(1).unwrap();

        let outcome = run_guarded(
            &limiter,
            || -> std::result::Result<(), String> { Err("downstream failed".to_string()) },
            CancelSignal::never(),
        )
        .await
        .unwrap();

        assert_eq!(outcome, Err("downstream failed".to_string()));
        assert_eq!(limiter.available_permits(), 1);
    }

    #[tokio::test]
    async fn test_run_guarded_releases_when_action_panics() {
        let limiter = ConcurrencyLimiter::new(1).unwrap();

        let result = AssertUnwindSafe(run_guarded(
            &limiter,
            || panic!("action blew up"),
            CancelSignal::never(),
        ))
        .catch_unwind()
        .await;

        assert!(result.is_err());
        assert_eq!(limiter.available_permits(), 1);
    }

    #[tokio::test]
    async fn test_run_guarded_skips_action_when_cancelled() {
        let limiter = ConcurrencyLimiter::new(1).unwrap();
        let _held = SlotGuard::acquire(&limiter, CancelSignal::never()).await.unwrap();

        let source = CancelSource::new();
        source.cancel();

        let ran = AtomicBool::new(false);
        let result =
            run_guarded(&limiter, || ran.store(true, Ordering::SeqCst), source.signal()).await;

        assert!(matches!(result, Err(TimegateError::Cancelled)));
        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(limiter.available_permits(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_guarded_async_releases_when_dropped() {
        let limiter = ConcurrencyLimiter::new(1).unwrap();

        let work = tokio::time::sleep(std::time::Duration::from_secs(10));
        let timed_out = tokio::time::timeout(
            std::time::Duration::from_millis(100),
            run_guarded_async(&limiter, work, CancelSignal::never()),
        )
        .await;

        assert!(timed_out.is_err());
        assert_eq!(limiter.available_permits(), 1);
    }
}
