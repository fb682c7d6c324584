//! UDP transport for device discovery.
//!
//! [`UdpTransport`] wraps a [`tokio::net::UdpSocket`] with the same error
//! mapping and logging as [`super::TcpTransport`]. It does **not** implement
//! [`Transport`](hdhr_core::Transport): discovery is connectionless and
//! every reply may come from a different device.

use std::net::SocketAddr;

use hdhr_core::error::{Error, Result};
use tokio::net::UdpSocket;

/// Default UDP port devices listen on for discovery requests.
pub const DISCOVER_UDP_PORT: u16 = 65001;

/// Datagram socket used to send discovery requests and collect replies.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    local_addr: SocketAddr,
}

impl UdpTransport {
    /// Bind to a local address.
    ///
    /// Use `"0.0.0.0:0"` to bind an ephemeral port on all interfaces.
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        tracing::debug!(addr = %addr, "Binding UDP socket");

        let socket = UdpSocket::bind(addr).await.map_err(|e| {
            tracing::error!(addr = %addr, error = %e, "Failed to bind UDP socket");
            Error::Io(e)
        })?;

        let local_addr = socket.local_addr()?;

        tracing::debug!(local_addr = %local_addr, "UDP socket bound");

        Ok(Self { socket, local_addr })
    }

    /// The local address this socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Send one datagram to `addr`.
    pub async fn send_to(&self, data: &[u8], addr: SocketAddr) -> Result<()> {
        tracing::trace!(
            local = %self.local_addr,
            remote = %addr,
            bytes = data.len(),
            "Sending datagram"
        );

        self.socket.send_to(data, addr).await.map_err(|e| {
            tracing::debug!(
                local = %self.local_addr,
                remote = %addr,
                error = %e,
                "Failed to send datagram"
            );
            Error::Io(e)
        })?;

        Ok(())
    }

    /// Wait for one datagram. Returns `(bytes_read, source_addr)`.
    ///
    /// Bytes beyond `buf.len()` are discarded, as is usual for UDP.
    /// There is no timeout; callers race this against a cancellation
    /// signal instead.
    pub async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        match self.socket.recv_from(buf).await {
            Ok((n, src)) => {
                tracing::trace!(
                    local = %self.local_addr,
                    remote = %src,
                    bytes = n,
                    "Received datagram"
                );
                Ok((n, src))
            }
            Err(e) => {
                tracing::debug!(
                    local = %self.local_addr,
                    error = %e,
                    "Failed to receive datagram"
                );
                Err(Error::Io(e))
            }
        }
    }

    /// Enable or disable sending to broadcast addresses.
    pub fn set_broadcast(&self, enable: bool) -> Result<()> {
        tracing::debug!(local = %self.local_addr, enable, "Setting broadcast");
        self.socket.set_broadcast(enable).map_err(Error::Io)
    }
}
