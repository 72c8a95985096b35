//! Observer interfaces for requests, resources and statistics.
//!
//! Listeners are a small closed set of callback traits, dispatched by
//! explicit selection from the hot path. All of them may be invoked
//! concurrently from several workers and must be `Send + Sync`; callbacks
//! are infallible and should return quickly.

use std::sync::Arc;

use hdrhistogram::Histogram;
use reqwest::header::HeaderMap;
use reqwest::{Method, Request};

use crate::errors::RequestFailure;
use crate::resource::ResourceInfo;
use crate::stats::Summary;

/// Identity of one outgoing request, handed to [`RequestListener`] callbacks.
#[derive(Debug, Clone)]
pub struct RequestEvent {
    /// Id of the worker issuing the request.
    pub worker_id: usize,
    pub method: Method,
    pub path: String,
}

/// Request lifecycle callbacks.
///
/// These fire for every request, warmup iterations included. `on_begin`
/// fires with the fully built request, before it is handed to the client.
/// `on_commit` fires once the response has begun: the client exposes no
/// separate write-complete hook, so this is the first observable point
/// after the request was fully sent, and it does not fire for requests
/// that never produce a response. Exactly one of `on_success` (the
/// response completed, any status; the response headers are attached) or
/// `on_failure` (transport error, or a status counted as failed by
/// configuration) follows.
///
/// The response body is not surfaced: it is a single-consumer stream the
/// runner drains for timing.
pub trait RequestListener: Send + Sync {
    fn on_begin(&self, _event: &RequestEvent, _request: &Request) {}
    fn on_commit(&self, _event: &RequestEvent) {}
    fn on_success(&self, _event: &RequestEvent, _status: u16, _headers: &HeaderMap) {}
    fn on_failure(&self, _event: &RequestEvent, _failure: &RequestFailure) {}
}

/// Called when a single resource completes. Suppressed during warmup.
pub trait NodeListener: Send + Sync {
    fn on_node(&self, info: &ResourceInfo);
}

/// Called exactly once when a subtree root completes, strictly after every
/// node callback of that subtree. Suppressed during warmup.
pub trait TreeListener: Send + Sync {
    fn on_tree(&self, info: &ResourceInfo);
}

/// Hot-path latency sample sink.
pub trait LatencyListener: Send + Sync {
    fn on_latency_value(&self, nanos: u64);
}

/// Hot-path response-time sample sink.
pub trait ResponseTimeListener: Send + Sync {
    fn on_response_time_value(&self, path: &str, nanos: u64);
}

/// Periodic interval-snapshot consumer.
///
/// Each tick delivers the histogram of samples recorded since the previous
/// tick together with its [`Summary`] (microsecond values).
pub trait SnapshotListener: Send + Sync {
    fn on_latency_interval(&self, _interval: &Histogram<u64>, _summary: &Summary) {}
    fn on_response_time_interval(&self, _interval: &Histogram<u64>, _summary: &Summary) {}
}

/// Terminal callback, fired once the run has fully stopped. Flush and
/// release here.
pub trait LifecycleListener: Send + Sync {
    fn on_stop(&self);
}

/// Listener registrations collected by the builder.
#[derive(Default, Clone)]
pub(crate) struct ListenerSet {
    pub request: Vec<Arc<dyn RequestListener>>,
    pub node: Vec<Arc<dyn NodeListener>>,
    pub tree: Vec<Arc<dyn TreeListener>>,
    pub latency: Vec<Arc<dyn LatencyListener>>,
    pub response_time: Vec<Arc<dyn ResponseTimeListener>>,
    pub snapshot: Vec<Arc<dyn SnapshotListener>>,
    pub lifecycle: Vec<Arc<dyn LifecycleListener>>,
}
