//! Engine lifecycle: workers, schedulers, warmup, interrupt, completion.
//!
//! [`LoadGenerator`] owns the runners, the client pool and the periodic
//! snapshot task. All methods take `&self`; wrap the generator in an `Arc`
//! to interrupt from another task while `begin` is pending. A run walks
//! `CONFIGURED → STARTED → WARMING → RUNNING → INTERRUPTING → STOPPED`;
//! `STOPPED` is terminal per run but the generator is reusable.

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info};

use crate::config::{LoadConfig, LoadGeneratorBuilder, SnapshotSchedule};
use crate::errors::LoadError;
use crate::handler::ResultHandler;
use crate::listeners::SnapshotListener;
use crate::runner::Runner;
use crate::stats::Summary;

/// Lifecycle states of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EngineState {
    Configured = 0,
    Started = 1,
    Warming = 2,
    Running = 3,
    Interrupting = 4,
    Stopped = 5,
}

/// Atomic cell holding the current [`EngineState`].
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    fn new() -> Self {
        Self(AtomicU8::new(EngineState::Configured as u8))
    }

    pub fn get(&self) -> EngineState {
        match self.0.load(Ordering::Acquire) {
            0 => EngineState::Configured,
            1 => EngineState::Started,
            2 => EngineState::Warming,
            3 => EngineState::Running,
            4 => EngineState::Interrupting,
            _ => EngineState::Stopped,
        }
    }

    pub fn set(&self, state: EngineState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

/// Shared cooperative stop signal, polled by runners at well-defined
/// points and awaited inside their selects.
pub(crate) struct StopSignal {
    triggered: AtomicBool,
    notify: Notify,
}

impl StopSignal {
    fn new() -> Self {
        Self {
            triggered: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    pub fn trigger(&self) {
        self.triggered.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }

    fn reset(&self) {
        self.triggered.store(false, Ordering::Release);
    }

    /// Resolves once the signal has been triggered.
    pub async fn cancelled(&self) {
        while !self.is_triggered() {
            let notified = self.notify.notified();
            if self.is_triggered() {
                return;
            }
            notified.await;
        }
    }
}

/// The load generator engine.
pub struct LoadGenerator {
    config: LoadConfig,
    handler: Arc<ResultHandler>,
    state: Arc<StateCell>,
    stop: Arc<StopSignal>,
    running: AtomicBool,
    epoch: Instant,
}

impl LoadGenerator {
    pub fn builder() -> LoadGeneratorBuilder {
        LoadGeneratorBuilder::new()
    }

    pub(crate) fn new(config: LoadConfig) -> Self {
        let handler = Arc::new(ResultHandler::new(
            config.listeners.clone(),
            config.fail_on_http_error,
        ));
        Self {
            config,
            handler,
            state: Arc::new(StateCell::new()),
            stop: Arc::new(StopSignal::new()),
            running: AtomicBool::new(false),
            epoch: Instant::now(),
        }
    }

    pub fn state(&self) -> EngineState {
        self.state.get()
    }

    pub fn workers(&self) -> usize {
        self.config.workers
    }

    /// Requests issued in the current or most recent run, warmup included.
    pub fn requests_issued(&self) -> u64 {
        self.handler.requests_issued()
    }

    /// Failed requests in the current or most recent run.
    pub fn failures(&self) -> u64 {
        self.handler.failures()
    }

    /// Request nodes per full profile traversal.
    pub fn resources_per_iteration(&self) -> usize {
        self.config
            .profile
            .iter()
            .map(|root| root.count_resources())
            .sum()
    }

    /// Run-total latency summary; `None` before any measured sample.
    pub fn latency_summary(&self) -> Option<Summary> {
        self.handler.latency_recorder().summary()
    }

    /// Run-total response-time summary.
    pub fn response_time_summary(&self) -> Option<Summary> {
        self.handler.response_time_recorder().summary()
    }

    /// Per-path response-time summaries, sorted by path.
    pub fn response_time_summaries(&self) -> Vec<(String, Summary)> {
        self.handler.per_path_recorders().summaries()
    }

    /// Start a run and resolve when it finishes.
    ///
    /// Completes `Ok` when every worker reached its iteration bound, and
    /// `Err(LoadError::Interrupted)` when the run was cut short by
    /// [`interrupt`](Self::interrupt) or the configured run duration.
    /// Calling `begin` again after completion starts a fresh run over the
    /// same configuration.
    pub async fn begin(&self) -> Result<(), LoadError> {
        self.run_inner(self.config.run_duration).await
    }

    /// Run with a wall-clock bound: an interrupt fires once `duration`
    /// elapses. Resolves `Ok` only if the iteration bounds completed first.
    pub async fn run_for(&self, duration: Duration) -> Result<(), LoadError> {
        self.run_inner(Some(duration)).await
    }

    /// Request cancellation of the in-progress run.
    ///
    /// Runners observe the signal at their next check and in-flight
    /// requests are cancelled through the client; the pending `begin`
    /// resolves `Err(LoadError::Interrupted)` in bounded time.
    pub fn interrupt(&self) {
        if self.running.load(Ordering::Acquire) {
            self.state.set(EngineState::Interrupting);
            info!("interrupt requested");
        }
        self.stop.trigger();
    }

    async fn run_inner(&self, limit: Option<Duration>) -> Result<(), LoadError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(LoadError::AlreadyRunning);
        }
        let guard = RunGuard(&self.running);

        self.stop.reset();
        self.handler.reset_run();
        self.state.set(EngineState::Started);

        // One client per worker, built atomically with its transport.
        let mut clients = Vec::with_capacity(self.config.workers);
        for _ in 0..self.config.workers {
            match self
                .config
                .transport_builder
                .build(self.config.selectors, &self.config.tls)
            {
                Ok(client) => clients.push(client),
                Err(e) => {
                    error!(error = %e, "transport start failed");
                    self.state.set(EngineState::Stopped);
                    return Err(e.into());
                }
            }
        }

        info!(
            workers = self.config.workers,
            users = self.config.users,
            iterations = self.config.iterations,
            warmup = self.config.warmup,
            resource_rate = self.config.resource_rate,
            transport = %self.config.transport,
            resources_per_iteration = self.resources_per_iteration(),
            target = %self.config.base_url,
            "load generator starting"
        );

        let warmup_countdown = Arc::new(AtomicUsize::new(if self.config.warmup > 0 {
            self.config.workers
        } else {
            0
        }));
        self.state.set(if self.config.warmup > 0 {
            EngineState::Warming
        } else {
            EngineState::Running
        });

        let mut workers: Vec<JoinHandle<_>> = Vec::with_capacity(self.config.workers);
        for (id, client) in clients.into_iter().enumerate() {
            let runner = Runner::new(
                id,
                client,
                &self.config,
                self.handler.clone(),
                self.stop.clone(),
                self.state.clone(),
                warmup_countdown.clone(),
                self.epoch,
            );
            workers.push(tokio::spawn(runner.run()));
        }

        let snapshot_task = self.config.snapshot.as_ref().map(|schedule| {
            tokio::spawn(snapshot_loop(
                self.handler.clone(),
                self.stop.clone(),
                schedule.clone(),
            ))
        });
        let interrupt_timer = limit.map(|duration| {
            let stop = self.stop.clone();
            tokio::spawn(async move {
                sleep(duration).await;
                debug!(?duration, "run duration elapsed, interrupting");
                stop.trigger();
            })
        });

        let mut total_iterations = 0u64;
        let mut interrupted = false;
        let mut worker_error = None;
        for handle in workers {
            match handle.await {
                Ok(outcome) => {
                    total_iterations += outcome.iterations;
                    interrupted |= outcome.interrupted;
                }
                Err(e) => {
                    error!(error = %e, "worker task failed");
                    worker_error = Some(LoadError::WorkerPanic(e.to_string()));
                }
            }
        }

        if let Some(timer) = interrupt_timer {
            timer.abort();
        }
        // Runners are done; release the snapshot task as well.
        self.stop.trigger();
        if let Some(task) = snapshot_task {
            let _ = task.await;
        }

        self.state.set(EngineState::Stopped);
        self.handler.on_generator_stop();
        info!(
            iterations = total_iterations,
            requests = self.handler.requests_issued(),
            failures = self.handler.failures(),
            interrupted,
            "load generator stopped"
        );
        drop(guard);

        if let Some(error) = worker_error {
            return Err(error);
        }
        if interrupted {
            return Err(LoadError::Interrupted);
        }
        Ok(())
    }
}

/// Clears the running flag on every exit path.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Periodic interval-snapshot scheduler.
///
/// First tick after the initial delay, then every period; exits with the
/// stop signal. Ticks with no samples are skipped.
async fn snapshot_loop(
    handler: Arc<ResultHandler>,
    stop: Arc<StopSignal>,
    schedule: SnapshotSchedule,
) {
    let stopped = tokio::select! {
        _ = stop.cancelled() => true,
        _ = sleep(schedule.initial_delay) => false,
    };
    if stopped {
        return;
    }

    loop {
        emit_snapshots(&handler, handler.snapshot_listeners());

        let stopped = tokio::select! {
            _ = stop.cancelled() => true,
            _ = sleep(schedule.period) => false,
        };
        if stopped {
            return;
        }
    }
}

fn emit_snapshots(handler: &ResultHandler, listeners: &[Arc<dyn SnapshotListener>]) {
    let latency = handler.latency_recorder().interval_snapshot();
    if let Some(summary) = Summary::from_histogram(&latency) {
        debug!(samples = summary.count, "latency interval snapshot");
        for listener in listeners {
            listener.on_latency_interval(&latency, &summary);
        }
    }

    let response_time = handler.response_time_recorder().interval_snapshot();
    if let Some(summary) = Summary::from_histogram(&response_time) {
        for listener in listeners {
            listener.on_response_time_interval(&response_time, &summary);
        }
    }
}
