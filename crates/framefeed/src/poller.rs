//! Fixed-cadence tick driver.
//!
//! The poller only decides *when* to call the tick handler. Admission (the
//! single-flight check) belongs to the handler, which must return quickly:
//! long work is spawned, never awaited inside a tick.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, trace};

/// Smallest period the poller will run at.
const MIN_PERIOD: Duration = Duration::from_millis(1);

#[derive(Debug)]
struct Signal {
    cancelled: AtomicBool,
    wake: Notify,
}

impl Signal {
    fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            // notify_one stores a permit, so a loop that is mid-tick still sees it.
            self.wake.notify_one();
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

// Owned by handles only; the tick task holds the Signal directly.
#[derive(Debug)]
struct HandleGuard {
    signal: Arc<Signal>,
}

impl Drop for HandleGuard {
    fn drop(&mut self) {
        self.signal.cancel();
    }
}

/// Cancellation capability for a running poller.
///
/// Clones share the same poller. The poller is cancelled when [`cancel`] is
/// called on any clone, or when the last clone is dropped.
///
/// [`cancel`]: PollerHandle::cancel
#[derive(Debug, Clone)]
pub struct PollerHandle {
    guard: Arc<HandleGuard>,
}

impl PollerHandle {
    /// Stop future ticks.
    ///
    /// Idempotent, and safe to call from inside the tick handler: the tick in
    /// progress finishes and no further tick fires.
    pub fn cancel(&self) {
        self.guard.signal.cancel();
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.guard.signal.is_cancelled()
    }
}

/// Drives a tick handler at a fixed period.
#[derive(Debug, Clone, Copy)]
pub struct FramePoller;

impl FramePoller {
    /// Call `on_tick` immediately, then every `period`, until cancelled.
    ///
    /// Must be called from within a Tokio runtime. Ticks missed because the
    /// runtime was busy are skipped rather than fired in a burst.
    pub fn start<F>(period: Duration, mut on_tick: F) -> PollerHandle
    where
        F: FnMut() + Send + 'static,
    {
        let period = period.max(MIN_PERIOD);
        let signal = Arc::new(Signal {
            cancelled: AtomicBool::new(false),
            wake: Notify::new(),
        });
        let handle = PollerHandle {
            guard: Arc::new(HandleGuard {
                signal: Arc::clone(&signal),
            }),
        };
        debug!(period_ms = period.as_millis(), "Starting poller");

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    () = signal.wake.notified() => break,
                    _ = ticker.tick() => {}
                }
                if signal.is_cancelled() {
                    break;
                }
                trace!("Tick");
                on_tick();
            }

            debug!("Poller stopped");
        });

        handle
    }
}
