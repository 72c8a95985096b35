//! Builder and validation for [`LoadGenerator`] instances.
//!
//! All knobs are programmatic; validation runs in [`build`] before any
//! resource is allocated, one distinct error per rule.
//!
//! [`LoadGenerator`]: crate::engine::LoadGenerator
//! [`build`]: LoadGeneratorBuilder::build

use std::sync::Arc;
use std::time::Duration;

use crate::engine::LoadGenerator;
use crate::errors::ConfigError;
use crate::listeners::{
    LatencyListener, LifecycleListener, ListenerSet, NodeListener, RequestListener,
    ResponseTimeListener, SnapshotListener, TreeListener,
};
use crate::resource::Resource;
use crate::transport::{ClientTransportBuilder, HttpTransportBuilder, TlsConfig, Transport};

/// Periodic snapshot schedule for [`SnapshotListener`]s.
#[derive(Debug, Clone)]
pub(crate) struct SnapshotSchedule {
    pub initial_delay: Duration,
    pub period: Duration,
}

/// Validated, resolved configuration owned by the engine.
pub(crate) struct LoadConfig {
    pub workers: usize,
    pub users: usize,
    pub iterations: u64,
    pub warmup: u64,
    pub resource_rate: u64,
    pub run_duration: Option<Duration>,
    pub base_url: String,
    pub transport: Transport,
    pub tls: TlsConfig,
    pub selectors: usize,
    pub transport_builder: Arc<dyn ClientTransportBuilder>,
    pub profile: Arc<Vec<Resource>>,
    pub snapshot: Option<SnapshotSchedule>,
    pub listeners: ListenerSet,
    pub fail_on_http_error: bool,
}

/// Builder for a [`LoadGenerator`].
///
/// ```no_run
/// use rust_loadgen::{LoadGeneratorBuilder, Resource, Transport};
///
/// let generator = LoadGeneratorBuilder::new()
///     .host("localhost")
///     .port(8080)
///     .transport(Transport::Http1)
///     .users(4)
///     .iterations(100)
///     .resource_rate(500)
///     .resource(Resource::new("/index.html"))
///     .build()
///     .expect("valid configuration");
/// ```
pub struct LoadGeneratorBuilder {
    users: usize,
    workers: Option<usize>,
    iterations: u64,
    warmup: u64,
    resource_rate: u64,
    run_duration: Option<Duration>,
    host: String,
    port: u16,
    transport: Option<Transport>,
    tls: TlsConfig,
    selectors: usize,
    transport_builder: Option<Arc<dyn ClientTransportBuilder>>,
    resources: Vec<Resource>,
    snapshot: Option<SnapshotSchedule>,
    listeners: ListenerSet,
    fail_on_http_error: bool,
}

impl LoadGeneratorBuilder {
    pub fn new() -> Self {
        Self {
            users: 1,
            workers: None,
            iterations: 1,
            warmup: 0,
            resource_rate: 0,
            run_duration: None,
            host: String::new(),
            port: 0,
            transport: None,
            tls: TlsConfig::default(),
            selectors: 1,
            transport_builder: None,
            resources: Vec::new(),
            snapshot: None,
            listeners: ListenerSet::default(),
            fail_on_http_error: false,
        }
    }

    /// Number of simulated users. Must be at least 1.
    pub fn users(mut self, users: usize) -> Self {
        self.users = users;
        self
    }

    /// Number of worker tasks. Defaults to `min(available cores, users)`.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Measured iterations per worker; 0 means unbounded.
    pub fn iterations(mut self, iterations: u64) -> Self {
        self.iterations = iterations;
        self
    }

    /// Warmup iterations per worker, excluded from statistics.
    pub fn warmup(mut self, warmup: u64) -> Self {
        self.warmup = warmup;
        self
    }

    /// Target resources per second across the whole engine; 0 = unthrottled.
    pub fn resource_rate(mut self, rate: u64) -> Self {
        self.resource_rate = rate;
        self
    }

    /// Wall-clock bound for `begin()`; an interrupt fires when it elapses.
    pub fn run_duration(mut self, duration: Duration) -> Self {
        self.run_duration = Some(duration);
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn transport(mut self, transport: Transport) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn tls(mut self, tls: TlsConfig) -> Self {
        self.tls = tls;
        self
    }

    /// Reactor selector count handed to the transport builder.
    pub fn selectors(mut self, selectors: usize) -> Self {
        self.selectors = selectors;
        self
    }

    /// Replace the built-in client builder, e.g. with a FastCGI-capable one.
    pub fn transport_builder(mut self, builder: Arc<dyn ClientTransportBuilder>) -> Self {
        self.transport_builder = Some(builder);
        self
    }

    /// Append a root resource to the profile. Roots are cycled through in
    /// declared order on every iteration.
    pub fn resource(mut self, resource: Resource) -> Self {
        self.resources.push(resource);
        self
    }

    /// Count HTTP status >= 400 as request failures. Off by default.
    pub fn fail_on_http_error(mut self, fail: bool) -> Self {
        self.fail_on_http_error = fail;
        self
    }

    /// Install the periodic interval-snapshot task.
    pub fn snapshot_every(mut self, initial_delay: Duration, period: Duration) -> Self {
        self.snapshot = Some(SnapshotSchedule {
            initial_delay,
            period,
        });
        self
    }

    pub fn request_listener(mut self, listener: Arc<dyn RequestListener>) -> Self {
        self.listeners.request.push(listener);
        self
    }

    pub fn node_listener(mut self, listener: Arc<dyn NodeListener>) -> Self {
        self.listeners.node.push(listener);
        self
    }

    pub fn tree_listener(mut self, listener: Arc<dyn TreeListener>) -> Self {
        self.listeners.tree.push(listener);
        self
    }

    pub fn latency_listener(mut self, listener: Arc<dyn LatencyListener>) -> Self {
        self.listeners.latency.push(listener);
        self
    }

    pub fn response_time_listener(mut self, listener: Arc<dyn ResponseTimeListener>) -> Self {
        self.listeners.response_time.push(listener);
        self
    }

    pub fn snapshot_listener(mut self, listener: Arc<dyn SnapshotListener>) -> Self {
        self.listeners.snapshot.push(listener);
        self
    }

    pub fn lifecycle_listener(mut self, listener: Arc<dyn LifecycleListener>) -> Self {
        self.listeners.lifecycle.push(listener);
        self
    }

    /// Validate and construct the engine.
    pub fn build(self) -> Result<LoadGenerator, ConfigError> {
        if self.users < 1 {
            return Err(ConfigError::NoUsers);
        }
        if self.host.is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        if self.port < 1 {
            return Err(ConfigError::InvalidPort);
        }
        if self.resources.is_empty() {
            return Err(ConfigError::NoResources);
        }
        let transport = self.transport.ok_or(ConfigError::NoTransport)?;

        let workers = self
            .workers
            .unwrap_or_else(|| num_cpus::get().min(self.users))
            .max(1);
        let base_url = format!("{}://{}:{}", transport.scheme(), self.host, self.port);
        let transport_builder = self
            .transport_builder
            .unwrap_or_else(|| Arc::new(HttpTransportBuilder::new(transport)));

        Ok(LoadGenerator::new(LoadConfig {
            workers,
            users: self.users,
            iterations: self.iterations,
            warmup: self.warmup,
            resource_rate: self.resource_rate,
            run_duration: self.run_duration,
            base_url,
            transport,
            tls: self.tls,
            selectors: self.selectors,
            transport_builder,
            profile: Arc::new(self.resources),
            snapshot: self.snapshot,
            listeners: self.listeners,
            fail_on_http_error: self.fail_on_http_error,
        }))
    }
}

impl Default for LoadGeneratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
