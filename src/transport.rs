//! Transport selection and the HTTP client boundary.
//!
//! The engine never talks to the network directly: it asks a
//! [`ClientTransportBuilder`] for one client per worker. The built-in
//! [`HttpTransportBuilder`] covers HTTP/1.x and HTTP/2, cleartext and TLS.
//! FastCGI framing belongs to the client stack, so that variant is served
//! by injecting a FastCGI-capable builder through the same trait; the
//! built-in builder reports it as a start error.

use std::fmt;

use tracing::debug;

use crate::errors::TransportStartError;

/// Wire protocol used to reach the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// HTTP/1.1 cleartext
    Http1,
    /// HTTP/1.1 over TLS
    Http1Tls,
    /// HTTP/2 cleartext (prior knowledge)
    Http2,
    /// HTTP/2 over TLS
    Http2Tls,
    /// FastCGI
    Fcgi,
}

impl Transport {
    /// URL scheme for requests over this transport.
    pub fn scheme(&self) -> &'static str {
        match self {
            Transport::Http1 | Transport::Http2 | Transport::Fcgi => "http",
            Transport::Http1Tls | Transport::Http2Tls => "https",
        }
    }

    pub fn is_tls(&self) -> bool {
        matches!(self, Transport::Http1Tls | Transport::Http2Tls)
    }

    /// Default per-destination connection limit, matching browser-like
    /// multiplexing: 7 connections for HTTP/1.x, a single multiplexed
    /// connection for HTTP/2. FastCGI mirrors HTTP/1.x.
    pub fn default_connections_per_destination(&self) -> usize {
        match self {
            Transport::Http1 | Transport::Http1Tls | Transport::Fcgi => 7,
            Transport::Http2 | Transport::Http2Tls => 1,
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Transport::Http1 => "http",
            Transport::Http1Tls => "https",
            Transport::Http2 => "h2c",
            Transport::Http2Tls => "h2",
            Transport::Fcgi => "fcgi",
        };
        write!(f, "{}", name)
    }
}

/// TLS knobs passed to the transport builder.
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    /// Accept invalid certificates; for self-signed test endpoints only.
    pub skip_verify: bool,
}

/// Produces one ready-to-use HTTP client per worker.
///
/// The client and its transport are built atomically here; nothing is
/// mutated after construction. `selectors` sizes the I/O reactor where the
/// implementation supports it.
pub trait ClientTransportBuilder: Send + Sync {
    fn build(
        &self,
        selectors: usize,
        tls: &TlsConfig,
    ) -> Result<reqwest::Client, TransportStartError>;
}

/// The built-in builder over reqwest.
///
/// reqwest multiplexes I/O on the shared tokio runtime, so `selectors` is
/// accepted for interface parity and ignored here.
pub struct HttpTransportBuilder {
    transport: Transport,
}

impl HttpTransportBuilder {
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }
}

impl ClientTransportBuilder for HttpTransportBuilder {
    fn build(
        &self,
        _selectors: usize,
        tls: &TlsConfig,
    ) -> Result<reqwest::Client, TransportStartError> {
        if self.transport == Transport::Fcgi {
            return Err(TransportStartError::Unsupported(self.transport));
        }

        let limit = self.transport.default_connections_per_destination();
        let mut builder = reqwest::Client::builder()
            .cookie_store(true)
            .pool_max_idle_per_host(limit);

        builder = match self.transport {
            Transport::Http1 | Transport::Http1Tls => builder.http1_only(),
            Transport::Http2 | Transport::Http2Tls => builder.http2_prior_knowledge(),
            Transport::Fcgi => unreachable!(),
        };

        if self.transport.is_tls() && tls.skip_verify {
            debug!(transport = %self.transport, "accepting invalid certificates");
            builder = builder.danger_accept_invalid_certs(true);
        }

        builder.build().map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_limits_match_transport() {
        assert_eq!(Transport::Http1.default_connections_per_destination(), 7);
        assert_eq!(Transport::Http1Tls.default_connections_per_destination(), 7);
        assert_eq!(Transport::Http2.default_connections_per_destination(), 1);
        assert_eq!(Transport::Http2Tls.default_connections_per_destination(), 1);
        assert_eq!(Transport::Fcgi.default_connections_per_destination(), 7);
    }

    #[test]
    fn schemes() {
        assert_eq!(Transport::Http1.scheme(), "http");
        assert_eq!(Transport::Http2.scheme(), "http");
        assert_eq!(Transport::Http1Tls.scheme(), "https");
        assert_eq!(Transport::Http2Tls.scheme(), "https");
        assert!(!Transport::Http2.is_tls());
        assert!(Transport::Http2Tls.is_tls());
    }

    #[tokio::test]
    async fn builtin_builder_rejects_fcgi() {
        let builder = HttpTransportBuilder::new(Transport::Fcgi);
        let result = builder.build(1, &TlsConfig::default());
        assert!(matches!(
            result,
            Err(TransportStartError::Unsupported(Transport::Fcgi))
        ));
    }

    #[tokio::test]
    async fn builtin_builder_produces_clients_for_http_variants() {
        for transport in [
            Transport::Http1,
            Transport::Http1Tls,
            Transport::Http2,
            Transport::Http2Tls,
        ] {
            let builder = HttpTransportBuilder::new(transport);
            builder
                .build(1, &TlsConfig::default())
                .unwrap_or_else(|e| panic!("building {} client failed: {}", transport, e));
        }
    }
}
