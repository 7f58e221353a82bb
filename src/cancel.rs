//! Cancellation signals observed by limiter acquires.
//!
//! A [`CancelSource`] owns the cancelled flag; every [`CancelSignal`] handed
//! out by it observes the same flag. Signals are cheap to clone and can be
//! moved into spawned tasks.

use std::time::Duration;
use tokio::sync::watch;
use tracing::trace;

/// The owning side of a cancellation flag.
#[derive(Debug)]
pub struct CancelSource {
    tx: watch::Sender<bool>,
}

impl CancelSource {
    /// Create a new, not yet cancelled, source.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Get a signal that observes this source.
    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            rx: Some(self.tx.subscribe()),
        }
    }

    /// Request cancellation. Every signal from this source fires.
    pub fn cancel(&self) {
        trace!("Cancellation requested");
        self.tx.send_replace(true);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Request cancellation once `delay` has elapsed.
    ///
    /// Must be called from within a tokio runtime.
    pub fn cancel_after(&self, delay: Duration) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            trace!(delay_ms = delay.as_millis() as u64, "Deadline reached, cancelling");
            tx.send_replace(true);
        });
    }
}

impl Default for CancelSource {
    fn default() -> Self {
        Self::new()
    }
}

/// The observing side of a cancellation flag.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: Option<watch::Receiver<bool>>,
}

impl CancelSignal {
    /// A signal that is never cancelled.
    pub fn never() -> Self {
        Self { rx: None }
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    /// Resolve once cancellation has been requested.
    ///
    /// Resolves immediately if the source was already cancelled. If the
    /// source is dropped without cancelling, this never resolves.
    pub async fn cancelled(&mut self) {
        match self.rx.as_mut() {
            Some(rx) => {
                let closed = rx.wait_for(|cancelled| *cancelled).await.is_err();
                if closed {
                    std::future::pending::<()>().await;
                }
            }
            None => std::future::pending::<()>().await,
        }
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::never()
    }
}
