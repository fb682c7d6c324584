//! Mock transport for deterministic testing of the transaction client.
//!
//! [`MockTransport`] implements the [`Transport`] trait with pre-loaded
//! request/response pairs, either as raw bytes or as packets that are
//! encoded on the way in.
//!
//! # Example
//!
//! ```
//! use hdhr_protocol::Packet;
//! use hdhr_protocol::consts::{TAG_GETSET_NAME, TAG_GETSET_VALUE, TYPE_GETSET_REQ, TYPE_GETSET_RPY};
//! use hdhr_test_harness::MockTransport;
//!
//! let mut mock = MockTransport::new();
//! mock.expect_packet(
//!     &Packet::new(TYPE_GETSET_REQ).with_tag(TAG_GETSET_NAME, b"/sys/model\0"),
//!     &Packet::new(TYPE_GETSET_RPY)
//!         .with_tag(TAG_GETSET_NAME, b"/sys/model\0")
//!         .with_tag(TAG_GETSET_VALUE, b"hdhomerun4_atsc\0"),
//! )
//! .unwrap();
//! ```

use std::collections::VecDeque;

use async_trait::async_trait;
use hdhr_core::error::{Error, Result};
use hdhr_core::transport::Transport;
use hdhr_protocol::Packet;

#[derive(Debug, Clone)]
struct Expectation {
    request: Vec<u8>,
    response: Vec<u8>,
}

/// A mock [`Transport`] for testing without a device.
///
/// Expectations are consumed in order. When `send()` is called, the sent
/// data is recorded and matched against the next expectation. The
/// corresponding response is then handed out by `receive()`, at most
/// `chunk_size` bytes per call.
///
/// A mismatched request or an exhausted queue is reported as
/// [`Error::Protocol`]. A `receive()` with nothing pending fails with
/// [`Error::Timeout`].
#[derive(Debug)]
pub struct MockTransport {
    expectations: VecDeque<Expectation>,
    pending_response: Option<Vec<u8>>,
    response_cursor: usize,
    /// Largest number of bytes returned by one `receive()`.
    chunk_size: usize,
    /// When set, `receive()` waits forever instead of answering.
    stall: bool,
    connected: bool,
    sent_log: Vec<Vec<u8>>,
}

impl MockTransport {
    /// Create a new mock transport in the connected state.
    pub fn new() -> Self {
        MockTransport {
            expectations: VecDeque::new(),
            pending_response: None,
            response_cursor: 0,
            chunk_size: usize::MAX,
            stall: false,
            connected: true,
            sent_log: Vec::new(),
        }
    }

    /// Add an expected request/response pair of raw bytes.
    pub fn expect(&mut self, request: &[u8], response: &[u8]) {
        self.expectations.push_back(Expectation {
            request: request.to_vec(),
            response: response.to_vec(),
        });
    }

    /// Add an expected request/response pair of packets.
    pub fn expect_packet(&mut self, request: &Packet, response: &Packet) -> Result<()> {
        self.expect(&request.encode()?, &response.encode()?);
        Ok(())
    }

    /// Deliver responses in pieces of at most `size` bytes, to exercise
    /// reply reassembly.
    pub fn set_chunk_size(&mut self, size: usize) {
        self.chunk_size = size.max(1);
    }

    /// Never answer `receive()`, to exercise request timeouts.
    pub fn set_stall(&mut self, stall: bool) {
        self.stall = stall;
    }

    /// All data sent through this transport, one element per `send()`.
    pub fn sent_data(&self) -> &[Vec<u8>] {
        &self.sent_log
    }

    /// Number of expectations not yet consumed.
    pub fn remaining_expectations(&self) -> usize {
        self.expectations.len()
    }

    /// When set to `false`, `send()` and `receive()` fail with
    /// [`Error::NotConnected`].
    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if !self.connected {
            return Err(Error::NotConnected);
        }

        self.sent_log.push(data.to_vec());

        let Some(expectation) = self.expectations.pop_front() else {
            return Err(Error::Protocol(
                "no more expectations in mock transport".into(),
            ));
        };

        if data != expectation.request.as_slice() {
            return Err(Error::Protocol(format!(
                "unexpected send data: expected {:02X?}, got {:02X?}",
                expectation.request, data
            )));
        }

        self.pending_response = Some(expectation.response);
        self.response_cursor = 0;
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8]) -> Result<usize> {
        if !self.connected {
            return Err(Error::NotConnected);
        }

        if self.stall {
            std::future::pending::<()>().await;
        }

        let Some(response) = self.pending_response.as_ref() else {
            return Err(Error::Timeout);
        };

        let remaining = &response[self.response_cursor..];
        let n = remaining.len().min(buf.len()).min(self.chunk_size);
        buf[..n].copy_from_slice(&remaining[..n]);
        self.response_cursor += n;

        if self.response_cursor >= response.len() {
            self.pending_response = None;
            self.response_cursor = 0;
        }

        if n == 0 {
            return Err(Error::Timeout);
        }
        Ok(n)
    }

    async fn close(&mut self) -> Result<()> {
        self.connected = false;
        self.pending_response = None;
        self.response_cursor = 0;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_then_receive_response() {
        let mut mock = MockTransport::new();
        mock.expect(b"req", b"response");

        mock.send(b"req").await.unwrap();

        let mut buf = [0u8; 64];
        let n = mock.receive(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"response");
        assert_eq!(mock.remaining_expectations(), 0);
        assert_eq!(mock.sent_data(), &[b"req".to_vec()]);
    }

    #[tokio::test]
    async fn chunked_response() {
        let mut mock = MockTransport::new();
        mock.expect(b"req", b"abcdefg");
        mock.set_chunk_size(3);

        mock.send(b"req").await.unwrap();

        let mut buf = [0u8; 64];
        let mut got = Vec::new();
        for expected in [3, 3, 1] {
            let n = mock.receive(&mut buf).await.unwrap();
            assert_eq!(n, expected);
            got.extend_from_slice(&buf[..n]);
        }
        assert_eq!(got, b"abcdefg");

        assert!(matches!(mock.receive(&mut buf).await, Err(Error::Timeout)));
    }

    #[tokio::test]
    async fn mismatched_request_is_protocol_error() {
        let mut mock = MockTransport::new();
        mock.expect(b"req", b"response");

        assert!(matches!(
            mock.send(b"other").await,
            Err(Error::Protocol(_))
        ));
        assert!(matches!(
            mock.send(b"req").await,
            Err(Error::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn disconnected_and_closed() {
        let mut mock = MockTransport::new();
        mock.set_connected(false);
        assert!(!mock.is_connected());
        assert!(matches!(mock.send(b"x").await, Err(Error::NotConnected)));

        mock.set_connected(true);
        mock.close().await.unwrap();
        let mut buf = [0u8; 4];
        assert!(matches!(
            mock.receive(&mut buf).await,
            Err(Error::NotConnected)
        ));
    }
}
