//! Transport trait for device communication.
//!
//! The [`Transport`] trait abstracts over the stream connection to a
//! device's control port. `TcpTransport` in `hdhr-transport` is the real
//! implementation; `MockTransport` in `hdhr-test-harness` replays scripted
//! packets for deterministic unit tests.
//!
//! Deadlines are not part of the trait: the transaction client arms one
//! deadline around a whole write + read exchange instead of per call.

use async_trait::async_trait;

use crate::error::Result;

/// Asynchronous byte-level stream transport to a device.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send raw bytes to the device.
    ///
    /// Implementations should not return until all bytes have been handed
    /// to the underlying socket.
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive bytes from the device into the provided buffer.
    ///
    /// Returns the number of bytes read, which is always non-zero. A peer
    /// that closed the connection is reported as
    /// [`Error::ConnectionLost`](crate::error::Error::ConnectionLost).
    async fn receive(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Close the transport connection.
    ///
    /// After calling `close()`, subsequent `send()` and `receive()` calls
    /// should return [`Error::NotConnected`](crate::error::Error::NotConnected).
    async fn close(&mut self) -> Result<()>;

    /// Check whether the transport is currently connected.
    fn is_connected(&self) -> bool;
}
