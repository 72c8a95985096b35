//! HTTP load generator core.
//!
//! Drives configurable, repeatable workloads against HTTP/1.1 and HTTP/2
//! endpoints (cleartext and TLS; FastCGI through an injected transport
//! builder), measures per-request latency and response time on HDR
//! histograms, and surfaces the measurements to pluggable observers in
//! real time.
//!
//! A [`Resource`] tree describes the requests of one iteration; the
//! [`LoadGeneratorBuilder`] validates the workload and produces a
//! [`LoadGenerator`] that runs N paced workers until iteration bounds,
//! a wall-clock limit or [`LoadGenerator::interrupt`] ends the run.
//!
//! ```no_run
//! use rust_loadgen::{LoadGeneratorBuilder, Resource, Transport};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let generator = LoadGeneratorBuilder::new()
//!     .host("localhost")
//!     .port(8080)
//!     .transport(Transport::Http1)
//!     .users(8)
//!     .iterations(1_000)
//!     .resource_rate(2_000)
//!     .resource(Resource::new("/index.html").children(vec![
//!         Resource::new("/style.css"),
//!         Resource::new("/app.js"),
//!     ]))
//!     .build()?;
//!
//! generator.begin().await?;
//! println!("{:?}", generator.latency_summary());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod errors;
pub mod listeners;
pub mod resource;
pub mod stats;
pub mod transport;

mod handler;
mod runner;

pub use config::LoadGeneratorBuilder;
pub use engine::{EngineState, LoadGenerator};
pub use errors::{ConfigError, ErrorCategory, LoadError, RequestFailure, TransportStartError};
pub use listeners::{
    LatencyListener, LifecycleListener, NodeListener, RequestEvent, RequestListener,
    ResponseTimeListener, SnapshotListener, TreeListener,
};
pub use resource::{Resource, ResourceInfo, AFTER_SEND_TIME_HEADER, DOWNLOAD_HEADER};
pub use stats::{PathRecorders, Recorder, Summary};
pub use transport::{ClientTransportBuilder, HttpTransportBuilder, TlsConfig, Transport};
