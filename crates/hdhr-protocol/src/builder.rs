//! ClientBuilder -- fluent builder for constructing [`Client`] instances.
//!
//! # Example
//!
//! ```no_run
//! use hdhr_protocol::ClientBuilder;
//! use std::time::Duration;
//!
//! # async fn example() -> hdhr_core::Result<()> {
//! let client = ClientBuilder::new()
//!     .host("192.168.1.20")
//!     .timeout(Duration::from_secs(1))
//!     .build()
//!     .await?;
//! println!("{}", client.model().await?);
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use hdhr_core::error::{Error, Result};
use hdhr_core::transport::Transport;
use hdhr_transport::{CONTROL_TCP_PORT, TcpTransport, with_default_port};

use crate::client::Client;
use crate::discovery::DiscoveredDevice;

/// Default TCP connect timeout.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Fluent builder for [`Client`].
#[derive(Debug, Clone)]
pub struct ClientBuilder {
    host: Option<String>,
    port: Option<u16>,
    timeout: Option<Duration>,
    connect_timeout: Duration,
}

impl ClientBuilder {
    /// Create a new builder with default settings: control port 65001,
    /// 5 second connect timeout, no per-request timeout.
    pub fn new() -> Self {
        ClientBuilder {
            host: None,
            port: None,
            timeout: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Set the device address: a host name or IP, optionally with a port.
    pub fn host(mut self, host: &str) -> Self {
        self.host = Some(host.to_string());
        self
    }

    /// Override the control port, including one given in [`host`](Self::host).
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the deadline for each request's write + read (default: none).
    /// A zero duration disables it.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    /// Set the TCP connect timeout (default: 5s).
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Configure the builder from a discovery result.
    pub fn device(mut self, device: &DiscoveredDevice) -> Self {
        self.host = Some(device.addr.ip().to_string());
        self.port = Some(CONTROL_TCP_PORT);
        self
    }

    /// The `host:port` string [`build`](Self::build) will connect to.
    pub fn addr(&self) -> Result<String> {
        let host = self.host.as_deref().ok_or_else(|| {
            Error::InvalidParameter(
                "host is required: call .host() or .device() before .build()".into(),
            )
        })?;

        Ok(match self.port {
            Some(port) => {
                let bare = with_default_port(host, CONTROL_TCP_PORT);
                let host = bare
                    .rsplit_once(':')
                    .map(|(h, _)| h)
                    .unwrap_or(bare.as_str());
                format!("{host}:{port}")
            }
            None => with_default_port(host, CONTROL_TCP_PORT),
        })
    }

    /// Connect to the device and build the [`Client`].
    pub async fn build(self) -> Result<Client> {
        let addr = self.addr()?;
        let transport = TcpTransport::connect_with_timeout(&addr, self.connect_timeout).await?;
        Ok(self.build_with_transport(transport).await)
    }

    /// Build a [`Client`] over an already connected transport.
    ///
    /// This is the entry point for testing with a mock transport.
    pub async fn build_with_transport<T: Transport>(self, transport: T) -> Client<T> {
        let client = Client::new(transport);
        client.set_timeout(self.timeout).await;
        client
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
