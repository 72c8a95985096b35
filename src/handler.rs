//! The hot-path sink for per-request timing events.
//!
//! One handler is shared by all runners. It updates the recorders, keeps
//! the run counters and fans events out to user-supplied listeners. Request
//! listeners fire for every request; node and tree listeners, sample
//! listeners and histogram updates are suppressed for warmup iterations.

use std::sync::atomic::{AtomicU64, Ordering};

use reqwest::header::HeaderMap;
use tracing::debug;

use crate::errors::RequestFailure;
use crate::listeners::{ListenerSet, RequestEvent};
use crate::resource::ResourceInfo;
use crate::stats::{PathRecorders, Recorder};

/// Whether an iteration's samples count towards statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SampleMode {
    /// Warmup iteration: request listeners fire, nothing is recorded and
    /// resource-level listeners stay silent.
    Warmup,
    /// Fully instrumented iteration.
    Measured,
}

pub(crate) struct ResultHandler {
    latency: Recorder,
    response_time: Recorder,
    per_path: PathRecorders,
    listeners: ListenerSet,
    fail_on_http_error: bool,
    requests: AtomicU64,
    failures: AtomicU64,
}

impl ResultHandler {
    pub fn new(listeners: ListenerSet, fail_on_http_error: bool) -> Self {
        Self {
            latency: Recorder::new(),
            response_time: Recorder::new(),
            per_path: PathRecorders::new(),
            listeners,
            fail_on_http_error,
            requests: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// Reset counters and recorders for a fresh run over the same
    /// configuration.
    pub fn reset_run(&self) {
        self.requests.store(0, Ordering::Relaxed);
        self.failures.store(0, Ordering::Relaxed);
        self.latency.reset();
        self.response_time.reset();
        self.per_path.reset();
    }

    pub fn requests_issued(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn latency_recorder(&self) -> &Recorder {
        &self.latency
    }

    pub fn response_time_recorder(&self) -> &Recorder {
        &self.response_time
    }

    pub fn per_path_recorders(&self) -> &PathRecorders {
        &self.per_path
    }

    pub fn on_request_begin(&self, event: &RequestEvent, request: &reqwest::Request) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        for listener in &self.listeners.request {
            listener.on_begin(event, request);
        }
    }

    pub fn on_request_commit(&self, event: &RequestEvent) {
        for listener in &self.listeners.request {
            listener.on_commit(event);
        }
    }

    /// A response completed. Returns true when the status counts as a
    /// failure under the current configuration.
    pub fn on_exchange_complete(
        &self,
        event: &RequestEvent,
        status: u16,
        headers: &HeaderMap,
    ) -> bool {
        if self.fail_on_http_error && status >= 400 {
            let failure = RequestFailure::from_status(status);
            self.on_request_failure(event, &failure);
            return true;
        }
        for listener in &self.listeners.request {
            listener.on_success(event, status, headers);
        }
        false
    }

    /// Transport-level failure, or a failed status when so configured.
    pub fn on_request_failure(&self, event: &RequestEvent, failure: &RequestFailure) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        debug!(
            worker_id = event.worker_id,
            path = %event.path,
            category = failure.category.label(),
            error = %failure.message,
            "request failed"
        );
        for listener in &self.listeners.request {
            listener.on_failure(event, failure);
        }
    }

    /// A resource completed successfully.
    ///
    /// Recording and resource-level listener dispatch happen only for
    /// measured iterations.
    pub fn on_node_complete(&self, info: &ResourceInfo, mode: SampleMode) {
        if mode != SampleMode::Measured {
            return;
        }

        let latency = info.latency();
        let response_time = info.response_time();

        self.latency.record_nanos(latency);
        self.response_time.record_nanos(response_time);
        if let Some(path) = info.path.as_deref() {
            self.per_path.record_nanos(path, response_time);

            for listener in &self.listeners.response_time {
                listener.on_response_time_value(path, response_time);
            }
        }
        for listener in &self.listeners.latency {
            listener.on_latency_value(latency);
        }
        for listener in &self.listeners.node {
            listener.on_node(info);
        }
    }

    /// A subtree root completed; fires the tree listeners exactly once.
    pub fn on_tree_complete(&self, info: &ResourceInfo, mode: SampleMode) {
        if mode != SampleMode::Measured {
            return;
        }
        for listener in &self.listeners.tree {
            listener.on_tree(info);
        }
    }

    /// Terminal callback once the run has stopped.
    pub fn on_generator_stop(&self) {
        for listener in &self.listeners.lifecycle {
            listener.on_stop();
        }
    }

    pub fn snapshot_listeners(
        &self,
    ) -> &[std::sync::Arc<dyn crate::listeners::SnapshotListener>] {
        &self.listeners.snapshot
    }
}
