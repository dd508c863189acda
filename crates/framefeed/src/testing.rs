//! Test doubles for frame sources.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::fetcher::FrameSource;
use crate::frame::{FetchFailure, FrameResult};

/// One scripted fetch: wait `delay`, then return `result`.
#[derive(Debug, Clone)]
pub struct Step {
    pub delay: Duration,
    pub result: FrameResult,
}

impl Step {
    pub fn new(delay_ms: u64, result: FrameResult) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
            result,
        }
    }
}

/// Replays scripted results and records how many fetches overlap.
///
/// Once the script runs out every fetch fails immediately.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    steps: Mutex<VecDeque<Step>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedSource {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl FrameSource for ScriptedSource {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn fetch_frame(&self) -> FrameResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        // Decrements even when a timeout drops this future mid-sleep.
        let _guard = InFlight(&self.in_flight);

        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(step) => {
                tokio::time::sleep(step.delay).await;
                step.result
            }
            None => FetchFailure::Transport("script exhausted".to_string()).into(),
        }
    }
}
