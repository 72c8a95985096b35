//! Per-worker execution loop.
//!
//! One runner per worker, each owning its own HTTP client. A runner walks
//! the profile's resource trees once per iteration, warmup first, then
//! paces itself to the engine-wide resource rate against an absolute
//! deadline. The stop signal is observed between resources, between
//! iterations and during the pacing sleep; an interrupt mid-iteration
//! cancels the in-flight requests by dropping the iteration future.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::time::{self, Duration, Instant};
use tracing::{debug, info};

use crate::config::LoadConfig;
use crate::engine::{EngineState, StateCell, StopSignal};
use crate::handler::{ResultHandler, SampleMode};
use crate::resource::{IssueContext, Resource};

/// Cookie name prefix for the per-runner session identifier.
const SESSION_COOKIE: &str = "rust_loadgen";

/// Busy-spin tail below the timer's minimum sleep granularity.
const SPIN_TAIL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunnerState {
    Idle,
    Warming,
    Running,
    Draining,
    Done,
}

pub(crate) struct RunnerOutcome {
    /// Measured iterations executed.
    pub iterations: u64,
    /// True when the runner exited on the stop signal.
    pub interrupted: bool,
}

pub(crate) struct Runner {
    id: usize,
    client: reqwest::Client,
    session_cookie: String,
    base_url: Arc<str>,
    profile: Arc<Vec<Resource>>,
    handler: Arc<ResultHandler>,
    stop: Arc<StopSignal>,
    engine_state: Arc<StateCell>,
    warmup_countdown: Arc<AtomicUsize>,
    iterations: u64,
    warmup_remaining: u64,
    pace_interval: Option<Duration>,
    epoch: std::time::Instant,
}

impl Runner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: usize,
        client: reqwest::Client,
        config: &LoadConfig,
        handler: Arc<ResultHandler>,
        stop: Arc<StopSignal>,
        engine_state: Arc<StateCell>,
        warmup_countdown: Arc<AtomicUsize>,
        epoch: std::time::Instant,
    ) -> Self {
        // Per-runner session identity: the nanosecond timestamp at creation.
        let session_id = epoch.elapsed().as_nanos() as u64;
        let session_cookie = format!("{}={}-{}", SESSION_COOKIE, id, session_id);

        let pace_interval = if config.resource_rate > 0 {
            let per_worker_rate = (config.resource_rate / config.workers as u64).max(1);
            Some(Duration::from_micros(1_000_000 / per_worker_rate))
        } else {
            None
        };

        Self {
            id,
            client,
            session_cookie,
            base_url: config.base_url.as_str().into(),
            profile: config.profile.clone(),
            handler,
            stop,
            engine_state,
            warmup_countdown,
            iterations: config.iterations,
            warmup_remaining: config.warmup,
            pace_interval,
            epoch,
        }
    }

    pub async fn run(mut self) -> RunnerOutcome {
        debug!(
            worker_id = self.id,
            iterations = self.iterations,
            warmup = self.warmup_remaining,
            pace_interval = ?self.pace_interval,
            "runner starting"
        );

        let mut state = RunnerState::Idle;
        let mut executed = 0u64;
        let mut interrupted = false;
        let mut next_fire = Instant::now();

        loop {
            if self.stop.is_triggered() {
                interrupted = true;
                break;
            }

            let mode = if self.warmup_remaining > 0 {
                SampleMode::Warmup
            } else {
                SampleMode::Measured
            };
            if mode == SampleMode::Measured && self.iterations > 0 && executed >= self.iterations {
                break;
            }

            let target = match mode {
                SampleMode::Warmup => RunnerState::Warming,
                SampleMode::Measured => RunnerState::Running,
            };
            if state != target {
                debug!(worker_id = self.id, state = ?target, "runner state change");
                state = target;
            }

            // Dropping the iteration future on stop cancels its in-flight
            // requests through the client.
            let completed = tokio::select! {
                biased;
                _ = self.stop.cancelled() => false,
                _ = self.run_iteration(mode) => true,
            };
            if !completed {
                interrupted = true;
                break;
            }

            match mode {
                SampleMode::Warmup => {
                    self.warmup_remaining -= 1;
                    if self.warmup_remaining == 0 {
                        self.finish_warmup();
                    }
                }
                SampleMode::Measured => executed += 1,
            }

            if let Some(interval) = self.pace_interval {
                next_fire += interval;
                let now = Instant::now();
                if next_fire < now {
                    // The iteration overran the budget: fall behind instead
                    // of bursting to catch up.
                    next_fire = now;
                } else {
                    let stopped = tokio::select! {
                        biased;
                        _ = self.stop.cancelled() => true,
                        _ = sleep_until_precise(next_fire) => false,
                    };
                    if stopped {
                        interrupted = true;
                        break;
                    }
                }
            }
        }

        debug!(worker_id = self.id, state = ?RunnerState::Draining, "runner state change");
        state = RunnerState::Done;
        info!(
            worker_id = self.id,
            state = ?state,
            iterations = executed,
            interrupted,
            "runner done"
        );

        RunnerOutcome {
            iterations: executed,
            interrupted,
        }
    }

    /// One traversal of the profile, roots in declared order.
    async fn run_iteration(&self, mode: SampleMode) {
        let ctx = IssueContext {
            client: &self.client,
            base_url: &self.base_url,
            session_cookie: &self.session_cookie,
            handler: &self.handler,
            mode,
            worker_id: self.id,
            epoch: self.epoch,
        };

        for root in self.profile.iter() {
            let info = root.issue(&ctx).await;
            self.handler.on_tree_complete(&info, mode);

            if self.stop.is_triggered() {
                break;
            }
        }
    }

    /// Last runner out of warmup flips the engine to RUNNING.
    fn finish_warmup(&self) {
        if self.warmup_countdown.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.engine_state.set(EngineState::Running);
            debug!(worker_id = self.id, "warmup complete, engine running");
        }
    }
}

/// Sleep until an absolute deadline with sub-millisecond precision.
///
/// The timer wheel only guarantees millisecond granularity, so the final
/// stretch busy-spins on the monotonic clock. Rates in the thousands per
/// second need this; a plain coarse sleep rounds every pause up.
pub(crate) async fn sleep_until_precise(deadline: Instant) {
    if let Some(coarse) = deadline.checked_sub(SPIN_TAIL) {
        if coarse > Instant::now() {
            time::sleep_until(coarse).await;
        }
    }
    while Instant::now() < deadline {
        std::hint::spin_loop();
    }
}
