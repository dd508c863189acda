//! Feed sessions.
//!
//! A [`FeedSession`] binds the poller, a [`FrameSource`] and a
//! [`DisplayResourceManager`] to one mount-to-unmount period:
//!
//! ```text
//! Idle --mount--> Active --unmount--> Terminated
//! ```
//!
//! Each tick is admitted only if the session is active and no fetch is in
//! flight; otherwise it is dropped. An admitted fetch runs on its own task
//! and routes its result through the display manager. Once `unmount` has
//! returned, a fetch that was still outstanding completes and discards its
//! result without touching the display.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use crate::config::Config;
use crate::display::{DisplayResourceManager, FeedView, Frame, FrameRegistry, HandleId};
use crate::error::{Error, Result};
use crate::fetcher::FrameSource;
use crate::frame::{FetchFailure, FrameResult};
use crate::poller::{FramePoller, PollerHandle};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Created, not yet mounted.
    Idle,
    /// Mounted and polling.
    Active,
    /// Unmounted. Terminal.
    Terminated,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Active => write!(f, "active"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

/// Timing options for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedOptions {
    /// Period between fetch attempts.
    pub interval: Duration,
    /// Optional bound on each fetch; expiry counts as a failed fetch.
    pub fetch_timeout: Option<Duration>,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(16),
            fetch_timeout: None,
        }
    }
}

impl FeedOptions {
    /// Options taken from the `[poll]` section of the configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: config.poll_interval(),
            fetch_timeout: config.request_timeout(),
        }
    }
}

/// Point-in-time counters for a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FeedStats {
    /// Timer ticks observed.
    pub ticks: u64,
    /// Ticks dropped because a fetch was already in flight.
    pub ticks_dropped: u64,
    /// Fetches started.
    pub fetches: u64,
    /// Frames published to the display.
    pub frames_published: u64,
    /// Fetches that produced no frame (including decode failures and timeouts).
    pub failures: u64,
    /// Results discarded because the session ended first.
    pub late_discards: u64,
}

#[derive(Debug, Default)]
struct Counters {
    ticks: AtomicU64,
    ticks_dropped: AtomicU64,
    fetches: AtomicU64,
    frames_published: AtomicU64,
    failures: AtomicU64,
    late_discards: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) -> u64 {
        counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn snapshot(&self) -> FeedStats {
        FeedStats {
            ticks: self.ticks.load(Ordering::Relaxed),
            ticks_dropped: self.ticks_dropped.load(Ordering::Relaxed),
            fetches: self.fetches.load(Ordering::Relaxed),
            frames_published: self.frames_published.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            late_discards: self.late_discards.load(Ordering::Relaxed),
        }
    }
}

/// State shared between the session, its tick handler and its fetch tasks.
#[derive(Debug)]
struct Shared {
    active: AtomicBool,
    in_flight: AtomicBool,
    display: Mutex<DisplayResourceManager>,
    counters: Counters,
    failing: AtomicBool,
}

/// Clears the single-flight flag once a fetch's result has been routed, or
/// if its task is torn down first.
struct FlightGuard<'a>(&'a AtomicBool);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Shared {
    fn display(&self) -> MutexGuard<'_, DisplayResourceManager> {
        self.display.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Admission check. Returns true if the caller now owns the flight.
    fn admit(&self) -> bool {
        Counters::bump(&self.counters.ticks);
        if !self.is_active() {
            return false;
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            Counters::bump(&self.counters.ticks_dropped);
            trace!("Fetch in flight, dropping tick");
            return false;
        }
        Counters::bump(&self.counters.fetches);
        true
    }

    // Holding the display lock across the `active` check is what makes
    // unmount's "set inactive, then release" sequence final.
    fn route(&self, result: FrameResult) {
        let mut display = self.display();
        if !self.is_active() {
            Counters::bump(&self.counters.late_discards);
            debug!("Session ended while fetch was in flight, discarding result");
            return;
        }

        let outcome = match result {
            FrameResult::Bytes(data) => display.publish(data),
            FrameResult::Failed(failure) => Err(failure),
        };

        match outcome {
            Ok(id) => {
                let n = Counters::bump(&self.counters.frames_published);
                if self.failing.swap(false, Ordering::Relaxed) {
                    info!(handle = %id, "Feed recovered");
                }
                trace!(handle = %id, frames = n, "Published frame");
            }
            Err(failure) => self.record_failure(&failure, display.current()),
        }
    }

    fn record_failure(&self, failure: &FetchFailure, current: Option<HandleId>) {
        Counters::bump(&self.counters.failures);
        let first = !self.failing.swap(true, Ordering::Relaxed);
        match current {
            // Last good frame stays up; say so once per outage.
            Some(id) if first => {
                warn!(kind = failure.kind(), error = %failure, holding = %id, "Frame fetch failed");
            }
            None if first && failure.is_unauthorized() => {
                warn!(error = %failure, "Snapshot endpoint rejected the token");
            }
            _ => debug!(kind = failure.kind(), error = %failure, "Frame fetch failed"),
        }
    }
}

/// One mount-to-unmount period of a live feed.
///
/// Dropping an active session unmounts it.
pub struct FeedSession {
    source: Arc<dyn FrameSource>,
    options: FeedOptions,
    registry: FrameRegistry,
    shared: Arc<Shared>,
    state: SessionState,
    // Some iff state is Active.
    poller: Option<PollerHandle>,
}

impl fmt::Debug for FeedSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedSession")
            .field("source", &self.source.name())
            .field("options", &self.options)
            .field("state", &self.state)
            .field("view", &self.view())
            .finish_non_exhaustive()
    }
}

impl FeedSession {
    /// Create an idle session. Nothing runs until [`mount`](Self::mount).
    #[must_use]
    pub fn new(source: Arc<dyn FrameSource>, options: FeedOptions) -> Self {
        let registry = FrameRegistry::new();
        let shared = Arc::new(Shared {
            active: AtomicBool::new(false),
            in_flight: AtomicBool::new(false),
            display: Mutex::new(DisplayResourceManager::new(registry.clone())),
            counters: Counters::default(),
            failing: AtomicBool::new(false),
        });
        Self {
            source,
            options,
            registry,
            shared,
            state: SessionState::Idle,
            poller: None,
        }
    }

    /// Start polling. The first fetch is attempted immediately.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionState`] unless the session is idle, and
    /// [`Error::Internal`] when called outside a Tokio runtime.
    pub fn mount(&mut self) -> Result<()> {
        if self.state != SessionState::Idle {
            return Err(Error::SessionState {
                operation: "mount",
                state: self.state,
            });
        }
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(Error::internal("mount requires a Tokio runtime"));
        }

        self.shared.active.store(true, Ordering::SeqCst);
        self.shared.display().activate();

        let shared = Arc::clone(&self.shared);
        let source = Arc::clone(&self.source);
        let timeout = self.options.fetch_timeout;
        let poller = FramePoller::start(self.options.interval, move || {
            if shared.admit() {
                spawn_fetch(Arc::clone(&shared), Arc::clone(&source), timeout);
            }
        });

        self.poller = Some(poller);
        self.state = SessionState::Active;
        info!(
            source = self.source.name(),
            interval_ms = self.options.interval.as_millis(),
            "Feed mounted"
        );
        Ok(())
    }

    /// Stop polling and release the current frame.
    ///
    /// Idempotent. After this returns no frame is created or released by
    /// this session; an outstanding fetch finishes and is discarded.
    pub fn unmount(&mut self) {
        if self.state == SessionState::Terminated {
            return;
        }
        let was_active = self.state == SessionState::Active;

        self.shared.active.store(false, Ordering::SeqCst);
        if let Some(poller) = self.poller.take() {
            poller.cancel();
        }
        self.shared.display().close();
        self.state = SessionState::Terminated;

        if was_active {
            let stats = self.stats();
            info!(
                frames = stats.frames_published,
                failures = stats.failures,
                dropped = stats.ticks_dropped,
                "Feed unmounted"
            );
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// What a renderer should show right now.
    #[must_use]
    pub fn view(&self) -> FeedView {
        self.shared.display().view()
    }

    /// Subscribe to view changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<FeedView> {
        self.shared.display().subscribe()
    }

    /// Address of the current frame, if any.
    #[must_use]
    pub fn current(&self) -> Option<HandleId> {
        self.shared.display().current()
    }

    /// The current frame, if any.
    #[must_use]
    pub fn current_frame(&self) -> Option<Frame> {
        self.current().and_then(|id| self.registry.resolve(id))
    }

    /// The registry renderers resolve handles against.
    #[must_use]
    pub fn registry(&self) -> &FrameRegistry {
        &self.registry
    }

    /// Whether a fetch is outstanding.
    #[must_use]
    pub fn is_fetching(&self) -> bool {
        self.shared.in_flight.load(Ordering::SeqCst)
    }

    /// Counters so far.
    #[must_use]
    pub fn stats(&self) -> FeedStats {
        self.shared.counters.snapshot()
    }
}

impl Drop for FeedSession {
    fn drop(&mut self) {
        self.unmount();
    }
}

fn spawn_fetch(shared: Arc<Shared>, source: Arc<dyn FrameSource>, timeout: Option<Duration>) {
    tokio::spawn(async move {
        let _flight = FlightGuard(&shared.in_flight);

        let result = match timeout {
            Some(limit) => tokio::time::timeout(limit, source.fetch_frame())
                .await
                .unwrap_or_else(|_| {
                    let ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX);
                    FetchFailure::Timeout(ms).into()
                }),
            None => source.fetch_frame().await,
        };

        shared.route(result);
    });
}
