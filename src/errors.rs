//! Error taxonomy for the load generator.
//!
//! Build-time problems surface as [`ConfigError`] before any resource is
//! allocated. Problems that end a run surface through the completion result
//! as [`LoadError`]. Per-request failures never stop a runner; they are
//! counted, classified into an [`ErrorCategory`] and delivered to request
//! listeners as a [`RequestFailure`].

use std::fmt;

use thiserror::Error;

use crate::transport::Transport;

/// Configuration validation error, one variant per rule.
///
/// Raised by [`LoadGeneratorBuilder::build`](crate::config::LoadGeneratorBuilder::build);
/// the engine is not created.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("at least one user is required")]
    NoUsers,

    #[error("host cannot be empty")]
    EmptyHost,

    #[error("port must be at least 1")]
    InvalidPort,

    #[error("at least one resource must be configured")]
    NoResources,

    #[error("no transport selected")]
    NoTransport,
}

/// Failed to produce an HTTP client for the selected transport.
///
/// Fatal to the run; surfaced through the completion result.
#[derive(Error, Debug)]
pub enum TransportStartError {
    #[error("transport '{0}' has no built-in client; inject a ClientTransportBuilder for it")]
    Unsupported(Transport),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Terminal failure kinds of a run.
#[derive(Error, Debug)]
pub enum LoadError {
    /// A run is already in progress on this generator.
    #[error("load generator is already running")]
    AlreadyRunning,

    #[error(transparent)]
    TransportStart(#[from] TransportStartError),

    /// The expected outcome of `interrupt()` and of `run_for()` hitting its
    /// wall-clock bound before the iteration limits.
    #[error("run interrupted")]
    Interrupted,

    #[error("worker task failed: {0}")]
    WorkerPanic(String),
}

/// Categories of per-request failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// HTTP 4xx errors (client errors)
    ClientError,

    /// HTTP 5xx errors (server errors)
    ServerError,

    /// Network connectivity errors (DNS, connection refused, etc.)
    NetworkError,

    /// Request timeout errors
    TimeoutError,

    /// TLS/SSL certificate errors
    TlsError,

    /// Other/unknown errors
    OtherError,
}

impl ErrorCategory {
    /// Categorize an HTTP status code. Returns `None` for 2xx/3xx.
    pub fn from_status_code(status_code: u16) -> Option<Self> {
        match status_code {
            200..=399 => None,
            400..=499 => Some(ErrorCategory::ClientError),
            500..=599 => Some(ErrorCategory::ServerError),
            _ => Some(ErrorCategory::OtherError),
        }
    }

    /// Categorize a transport-level error from the HTTP client.
    pub fn from_reqwest_error(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            ErrorCategory::TimeoutError
        } else if error.is_connect() || error.is_request() {
            ErrorCategory::NetworkError
        } else if error.is_body() || error.is_decode() {
            ErrorCategory::NetworkError
        } else if error.is_redirect() {
            ErrorCategory::ClientError
        } else {
            let message = error.to_string().to_lowercase();
            if message.contains("certificate") || message.contains("tls") || message.contains("ssl")
            {
                ErrorCategory::TlsError
            } else if message.contains("timeout") {
                ErrorCategory::TimeoutError
            } else if message.contains("dns")
                || message.contains("resolve")
                || message.contains("connect")
            {
                ErrorCategory::NetworkError
            } else {
                ErrorCategory::OtherError
            }
        }
    }

    /// Short label used in log fields.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorCategory::ClientError => "client_error",
            ErrorCategory::ServerError => "server_error",
            ErrorCategory::NetworkError => "network_error",
            ErrorCategory::TimeoutError => "timeout_error",
            ErrorCategory::TlsError => "tls_error",
            ErrorCategory::OtherError => "other_error",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A classified per-request failure, delivered to request listeners.
#[derive(Debug, Clone)]
pub struct RequestFailure {
    pub category: ErrorCategory,
    pub status_code: Option<u16>,
    pub message: String,
}

impl RequestFailure {
    pub fn from_reqwest(error: &reqwest::Error) -> Self {
        Self {
            category: ErrorCategory::from_reqwest_error(error),
            status_code: error.status().map(|s| s.as_u16()),
            message: error.to_string(),
        }
    }

    /// Failure for a completed exchange whose status counts as failed.
    pub fn from_status(status_code: u16) -> Self {
        Self {
            category: ErrorCategory::from_status_code(status_code)
                .unwrap_or(ErrorCategory::OtherError),
            status_code: Some(status_code),
            message: format!("HTTP status {}", status_code),
        }
    }
}

impl fmt::Display for RequestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status_code {
            Some(status) => write!(f, "[{}] HTTP {}: {}", self.category, status, self.message),
            None => write!(f, "[{}] {}", self.category, self.message),
        }
    }
}
