//! TCP transport for the device control connection.
//!
//! [`TcpTransport`] implements the [`Transport`] trait over a single
//! long-lived TCP stream. Devices listen for get/set requests on port
//! 65001; an address without a port is completed with that default.
//!
//! Reads carry no deadline of their own. The client arms one deadline
//! around each whole request/reply exchange instead.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use hdhr_core::error::{Error, Result};
use hdhr_core::transport::Transport;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Control port devices accept get/set connections on.
pub const CONTROL_TCP_PORT: u16 = 65001;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// The control connection to one device.
#[derive(Debug)]
pub struct TcpTransport {
    /// `None` once closed.
    stream: Option<TcpStream>,
    /// `host:port` as dialed.
    addr: String,
}

impl TcpTransport {
    /// Connect to `addr` with a five second connect timeout.
    ///
    /// `addr` is a host with an optional port, e.g. `"192.168.1.20"`,
    /// `"192.168.1.20:65001"` or `"[fe80::1]:65001"`.
    pub async fn connect(addr: &str) -> Result<Self> {
        Self::connect_with_timeout(addr, DEFAULT_CONNECT_TIMEOUT).await
    }

    /// Connect to `addr`, giving up after `timeout`.
    pub async fn connect_with_timeout(addr: &str, timeout: Duration) -> Result<Self> {
        let addr = with_default_port(addr, CONTROL_TCP_PORT);

        let stream = match tokio::time::timeout(timeout, TcpStream::connect(&addr)).await {
            Err(_) => {
                tracing::debug!(addr = %addr, timeout = ?timeout, "Device did not accept connection in time");
                return Err(Error::Timeout);
            }
            Ok(Err(e)) if e.kind() == io::ErrorKind::ConnectionRefused => {
                return Err(Error::Transport(format!("connection refused: {addr}")));
            }
            Ok(Err(e)) => return Err(Error::Io(e)),
            Ok(Ok(stream)) => stream,
        };

        // One small packet per request; Nagle would only add latency.
        stream.set_nodelay(true).ok();

        tracing::debug!(addr = %addr, "Connected to device control port");
        Ok(Self::from_stream(stream, addr))
    }

    /// Use an already connected stream, labelled `addr` in logs.
    pub fn from_stream(stream: TcpStream, addr: String) -> Self {
        Self {
            stream: Some(stream),
            addr,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    fn stream(&mut self) -> Result<&mut TcpStream> {
        self.stream.as_mut().ok_or(Error::NotConnected)
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        tracing::trace!(addr = %self.addr, bytes = data.len(), "Writing request");
        let stream = self.stream()?;
        stream.write_all(data).await.map_err(stream_error)?;
        stream.flush().await.map_err(stream_error)
    }

    async fn receive(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = self.stream()?.read(buf).await.map_err(stream_error)?;
        if n == 0 {
            tracing::debug!(addr = %self.addr, "Device closed the control connection");
            return Err(Error::ConnectionLost);
        }
        tracing::trace!(addr = %self.addr, bytes = n, "Read reply bytes");
        Ok(n)
    }

    async fn close(&mut self) -> Result<()> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(());
        };
        // The socket is released on drop even if shutdown fails.
        if let Err(e) = stream.shutdown().await {
            tracing::debug!(addr = %self.addr, error = %e, "Shutdown of control connection failed");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

/// Complete `addr` with `port` if it does not already carry one.
///
/// Accepts `host`, `host:port`, `[v6]`, `[v6]:port` and bare IPv6 literals.
pub fn with_default_port(addr: &str, port: u16) -> String {
    match split_host_port(addr) {
        Some((host, p)) if host.contains(':') => format!("[{host}]:{p}"),
        Some((host, p)) => format!("{host}:{p}"),
        None => {
            let host = addr.trim_start_matches('[').trim_end_matches(']');
            if host.contains(':') {
                format!("[{host}]:{port}")
            } else {
                format!("{host}:{port}")
            }
        }
    }
}

/// Split `host:port`, returning `None` when no port is present.
fn split_host_port(addr: &str) -> Option<(&str, &str)> {
    if let Some(rest) = addr.strip_prefix('[') {
        let (host, tail) = rest.split_once(']')?;
        let port = tail.strip_prefix(':')?;
        return (!port.is_empty()).then_some((host, port));
    }

    let (host, port) = addr.rsplit_once(':')?;
    if host.contains(':') || port.is_empty() {
        // A bare IPv6 literal, not host:port.
        return None;
    }
    Some((host, port))
}

/// Errors on an established stream. A peer that went away is
/// [`Error::ConnectionLost`]; anything else stays an I/O error.
fn stream_error(e: io::Error) -> Error {
    match e.kind() {
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::NotConnected
        | io::ErrorKind::ConnectionAborted => Error::ConnectionLost,
        _ => Error::Io(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn default_port_added_to_bare_host() {
        assert_eq!(with_default_port("10.0.0.5", 65001), "10.0.0.5:65001");
        assert_eq!(with_default_port("hdhr.lan", 65001), "hdhr.lan:65001");
    }

    #[test]
    fn explicit_port_kept() {
        assert_eq!(with_default_port("10.0.0.5:1234", 65001), "10.0.0.5:1234");
        assert_eq!(with_default_port("[::1]:1234", 65001), "[::1]:1234");
    }

    #[test]
    fn ipv6_without_port() {
        assert_eq!(with_default_port("::1", 65001), "[::1]:65001");
        assert_eq!(with_default_port("[fe80::1]", 65001), "[fe80::1]:65001");
    }

    #[tokio::test]
    async fn reply_bytes_arrive_in_pieces() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let device = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 4];
            stream.read_exact(&mut request).await.unwrap();
            assert_eq!(request, [0x00, 0x04, 0x00, 0x00]);

            stream.write_all(&[0x00, 0x05]).await.unwrap();
            stream.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            stream.write_all(&[0x00, 0x00]).await.unwrap();
        });

        let mut transport = TcpTransport::connect(&addr).await.unwrap();
        assert_eq!(transport.addr(), addr);
        transport.send(&[0x00, 0x04, 0x00, 0x00]).await.unwrap();

        let mut buf = [0u8; 8];
        let mut filled = 0;
        while filled < 4 {
            filled += transport.receive(&mut buf[filled..]).await.unwrap();
        }
        assert_eq!(&buf[..4], &[0x00, 0x05, 0x00, 0x00]);

        device.await.unwrap();
    }

    #[tokio::test]
    async fn device_hangup_is_connection_lost() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let device = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let mut transport = TcpTransport::connect(&addr).await.unwrap();
        device.await.unwrap();

        let mut buf = [0u8; 16];
        assert!(matches!(
            transport.receive(&mut buf).await,
            Err(Error::ConnectionLost)
        ));
    }

    #[tokio::test]
    async fn closed_transport_rejects_io() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let stream = TcpStream::connect(listener.local_addr().unwrap()).await.unwrap();
        let mut transport = TcpTransport::from_stream(stream, "device".into());

        transport.close().await.unwrap();
        transport.close().await.unwrap();
        assert!(!transport.is_connected());
        assert!(matches!(transport.send(b"x").await, Err(Error::NotConnected)));
    }
}
