//! Release-timestamp bookkeeping for the sliding window limiter.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// When a slot was last released.
///
/// Orders by release time, with `Never` ahead of every real release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum ReleaseStamp {
    /// The slot has never been released, so it has no cooldown.
    Never,
    /// The slot was released at this instant.
    At(Instant),
}

impl ReleaseStamp {
    /// The earliest instant at which the slot may be handed out again.
    ///
    /// Returns `None` when the slot is usable right away.
    pub(crate) fn reset_at(&self, window: Duration) -> Option<Instant> {
        match self {
            ReleaseStamp::Never => None,
            ReleaseStamp::At(released) => Some(*released + window),
        }
    }
}

/// Release stamps of the slots not currently handed out, oldest first.
///
/// Seeded with `capacity` [`ReleaseStamp::Never`] entries. Every acquire pops
/// the oldest stamp and every release or cancelled acquire puts one back, so
/// at quiescence the queue always holds exactly `capacity` stamps.
#[derive(Debug)]
pub(crate) struct ReleaseQueue {
    capacity: usize,
    stamps: Mutex<VecDeque<ReleaseStamp>>,
}

impl ReleaseQueue {
    /// Create a queue seeded with `capacity` never-released stamps.
    pub(crate) fn new(capacity: usize) -> Self {
        let stamps = std::iter::repeat(ReleaseStamp::Never)
            .take(capacity)
            .collect::<VecDeque<_>>();
        Self {
            capacity,
            stamps: Mutex::new(stamps),
        }
    }

    /// Remove and return the oldest release stamp.
    ///
    /// Callers must hold a permit, which guarantees the queue is non-empty.
    pub(crate) fn pop_oldest(&self) -> ReleaseStamp {
        let popped = self.stamps.lock().pop_front();
        debug_assert!(popped.is_some(), "release queue drained below its permit count");
        popped.unwrap_or(ReleaseStamp::Never)
    }

    /// Put back a stamp taken by `pop_oldest`, in release order.
    pub(crate) fn restore(&self, stamp: ReleaseStamp) {
        let mut stamps = self.stamps.lock();
        debug_assert!(stamps.len() < self.capacity, "restored a stamp into a full release queue");
        insert_ordered(&mut stamps, stamp);
    }

    /// Add a release that happened at `at`.
    pub(crate) fn record(&self, at: Instant) {
        let mut stamps = self.stamps.lock();
        debug_assert!(stamps.len() < self.capacity, "release without a matching acquire");
        insert_ordered(&mut stamps, ReleaseStamp::At(at));
    }

    /// Number of stamps currently queued.
    pub(crate) fn len(&self) -> usize {
        self.stamps.lock().len()
    }
}

/// Insert after every stamp that is not newer than `stamp`.
///
/// Releases usually arrive in order, so this is normally a push to the back.
fn insert_ordered(stamps: &mut VecDeque<ReleaseStamp>, stamp: ReleaseStamp) {
    let at = stamps.partition_point(|queued| *queued <= stamp);
    stamps.insert(at, stamp);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_queue_is_seeded_with_sentinels() {
        let queue = ReleaseQueue::new(3);
        assert_eq!(queue.len(), 3);

        for _ in 0..3 {
            assert_eq!(queue.pop_oldest(), ReleaseStamp::Never);
        }
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn test_never_has_no_reset() {
        assert_eq!(ReleaseStamp::Never.reset_at(Duration::from_secs(60)), None);
    }

    #[test]
    fn test_reset_is_release_plus_window() {
        let released = Instant::now();
        let stamp = ReleaseStamp::At(released);
        assert_eq!(
            stamp.reset_at(Duration::from_millis(500)),
            Some(released + Duration::from_millis(500))
        );
        assert_eq!(stamp.reset_at(Duration::ZERO), Some(released));
    }

    #[test]
    fn test_records_are_fifo() {
        let queue = ReleaseQueue::new(2);
        queue.pop_oldest();
        queue.pop_oldest();

        let first = Instant::now();
        let second = first + Duration::from_millis(10);
        queue.record(first);
        queue.record(second);

        assert_eq!(queue.pop_oldest(), ReleaseStamp::At(first));
        assert_eq!(queue.pop_oldest(), ReleaseStamp::At(second));
    }

    #[test]
    fn test_restored_sentinel_stays_ahead() {
        let queue = ReleaseQueue::new(2);
        let taken = queue.pop_oldest();

        queue.restore(taken);
        assert_eq!(queue.len(), 2);

        queue.pop_oldest();
        let released = Instant::now();
        queue.record(released);

        // The restored sentinel is still ahead of the fresh release.
        assert_eq!(queue.pop_oldest(), ReleaseStamp::Never);
        assert_eq!(queue.pop_oldest(), ReleaseStamp::At(released));
    }

    #[test]
    fn test_never_sorts_before_releases() {
        let released = Instant::now();
        let later = released + Duration::from_millis(1);
        assert!(ReleaseStamp::Never < ReleaseStamp::At(released));
        assert!(ReleaseStamp::At(released) < ReleaseStamp::At(later));
    }

    #[test]
    fn test_restores_keep_release_order() {
        let queue = ReleaseQueue::new(3);
        for _ in 0..3 {
            queue.pop_oldest();
        }

        let first = Instant::now();
        let second = first + Duration::from_millis(500);
        let third = first + Duration::from_millis(900);
        queue.record(third);

        // Put back in the reverse of the order they were taken.
        queue.restore(ReleaseStamp::At(second));
        queue.restore(ReleaseStamp::At(first));

        assert_eq!(queue.pop_oldest(), ReleaseStamp::At(first));
        assert_eq!(queue.pop_oldest(), ReleaseStamp::At(second));
        assert_eq!(queue.pop_oldest(), ReleaseStamp::At(third));
    }

    #[test]
    fn test_late_record_is_ordered() {
        let queue = ReleaseQueue::new(2);
        queue.pop_oldest();
        queue.pop_oldest();

        let earlier = Instant::now();
        let later = earlier + Duration::from_millis(3);
        queue.record(later);
        queue.record(earlier);

        assert_eq!(queue.pop_oldest(), ReleaseStamp::At(earlier));
        assert_eq!(queue.pop_oldest(), ReleaseStamp::At(later));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "release without a matching acquire")]
    fn test_unmatched_release_panics_in_debug() {
        let queue = ReleaseQueue::new(1);
        queue.record(Instant::now());
    }
}
