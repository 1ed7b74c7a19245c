//! EncoderBuilder -- fluent builder for starting the encoder link.
//!
//! Separates configuration from construction so that callers can set up
//! the endpoint, timeouts, and reconnect policy before the IO task starts
//! connecting.
//!
//! # Example
//!
//! ```no_run
//! use rdslink_encoder::EncoderBuilder;
//! use std::time::Duration;
//!
//! # async fn example() -> rdslink_core::Result<()> {
//! let link = EncoderBuilder::new()
//!     .host("192.168.1.50")
//!     .port(5000)
//!     .response_timeout(Duration::from_secs(3))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use rdslink_core::error::{Error, Result};
use rdslink_core::transport::Connector;
use rdslink_transport::TcpConnector;

use crate::io::{EncoderHandle, LinkConfig, spawn_io_task};

/// Default encoder host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default encoder TCP port.
pub const DEFAULT_PORT: u16 = 5000;

/// Fluent builder for [`EncoderHandle`].
///
/// Every setting has a default, so the simplest usage is
/// `EncoderBuilder::new().host(h).build()?`.
#[derive(Debug, Clone)]
pub struct EncoderBuilder {
    host: String,
    port: u16,
    connect_timeout: Duration,
    link: LinkConfig,
}

impl Default for EncoderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EncoderBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        EncoderBuilder {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            connect_timeout: Duration::from_secs(5),
            link: LinkConfig::default(),
        }
    }

    /// Set the encoder host name or address.
    pub fn host(mut self, host: &str) -> Self {
        self.host = host.to_string();
        self
    }

    /// Set the encoder TCP port (default: 5000).
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the TCP connect timeout (default: 5s).
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set how long to wait for `OK`/`NO` after each command (default: 5s).
    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.link.response_timeout = timeout;
        self
    }

    /// Set the reconnect backoff bounds (default: 1s doubling to 30s).
    pub fn backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.link.backoff_initial = initial;
        self.link.backoff_max = max;
        self
    }

    /// Enable or disable reconnect jitter (default: enabled).
    pub fn backoff_jitter(mut self, enabled: bool) -> Self {
        self.link.backoff_jitter = enabled;
        self
    }

    /// Set how long each idle read waits (default: 100ms).
    pub fn idle_poll(mut self, poll: Duration) -> Self {
        self.link.idle_poll = poll;
        self
    }

    /// Set how many submissions may queue for the IO task (default: 16).
    pub fn queue_depth(mut self, depth: usize) -> Self {
        self.link.queue_depth = depth;
        self
    }

    /// The `host:port` this builder will connect to.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::InvalidParameter("encoder host is empty".into()));
        }
        if self.port == 0 {
            return Err(Error::InvalidParameter("encoder port must be non-zero".into()));
        }
        for (name, d) in [
            ("connect_timeout", self.connect_timeout),
            ("response_timeout", self.link.response_timeout),
            ("backoff_initial", self.link.backoff_initial),
            ("idle_poll", self.link.idle_poll),
        ] {
            if d.is_zero() {
                return Err(Error::InvalidParameter(format!("{name} must be non-zero")));
            }
        }
        if self.link.backoff_initial > self.link.backoff_max {
            return Err(Error::InvalidParameter(format!(
                "backoff_initial ({:?}) exceeds backoff_max ({:?})",
                self.link.backoff_initial, self.link.backoff_max
            )));
        }
        if self.link.queue_depth == 0 {
            return Err(Error::InvalidParameter("queue_depth must be non-zero".into()));
        }
        Ok(())
    }

    /// Start the link with a caller-provided connector.
    ///
    /// This is the entry point for testing (pass a `MockConnector` from
    /// `rdslink-test-harness`). Must be called inside a tokio runtime.
    pub fn build_with_connector(self, connector: Arc<dyn Connector>) -> Result<EncoderHandle> {
        self.validate()?;
        tracing::debug!(endpoint = %connector.endpoint(), "starting encoder link");
        Ok(spawn_io_task(connector, self.link))
    }

    /// Start the link over TCP to the configured host and port.
    ///
    /// Returns as soon as the IO task is running; the first connection is
    /// made in the background. Must be called inside a tokio runtime.
    pub fn build(self) -> Result<EncoderHandle> {
        let connector =
            TcpConnector::new(&self.host, self.port).connect_timeout(self.connect_timeout);
        self.build_with_connector(Arc::new(connector))
    }
}
