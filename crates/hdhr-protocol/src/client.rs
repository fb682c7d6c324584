//! Get/set transaction client.
//!
//! [`Client`] owns one control connection to a device and runs one
//! request/reply exchange at a time. All access goes through a single
//! mutex held across the whole write + read, so concurrent callers queue
//! up instead of interleaving replies.

use std::time::Duration;

use hdhr_core::error::{DeviceError, Error, Result};
use hdhr_core::transport::Transport;
use hdhr_transport::TcpTransport;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::consts::{
    HEADER_SIZE, MAX_PACKET_SIZE, MIN_PACKET_SIZE, TAG_ERROR_MESSAGE, TAG_GETSET_NAME,
    TAG_GETSET_VALUE, TYPE_GETSET_REQ, TYPE_GETSET_RPY,
};
use crate::packet::Packet;
use crate::tuner::Tuner;

/// Get/set variable holding the device model name.
const MODEL_QUERY: &str = "/sys/model";

/// Client for the get/set protocol over one device connection.
///
/// Generic over the [`Transport`] so tests can substitute an in-memory
/// mock; production code uses the [`TcpTransport`] default.
pub struct Client<T: Transport = TcpTransport> {
    inner: Mutex<Inner<T>>,
}

/// Connection state guarded by the client mutex.
struct Inner<T> {
    transport: T,
    /// Receive buffer sized to the largest packet a device sends.
    buf: Vec<u8>,
    /// Deadline applied to each write + read, re-armed per call.
    timeout: Option<Duration>,
}

impl Client<TcpTransport> {
    /// Connect to a device at `addr` (host with optional port; 65001 if
    /// omitted) with no per-request timeout.
    ///
    /// Use [`ClientBuilder`](crate::ClientBuilder) for more control.
    pub async fn connect(addr: &str) -> Result<Self> {
        let transport = TcpTransport::connect(addr).await?;
        Ok(Self::new(transport))
    }
}

impl<T: Transport> Client<T> {
    /// Wrap an already connected transport.
    pub fn new(transport: T) -> Self {
        Client {
            inner: Mutex::new(Inner {
                transport,
                buf: vec![0u8; MAX_PACKET_SIZE],
                timeout: None,
            }),
        }
    }

    /// Set the deadline for a combined request write and reply read.
    /// `None` waits indefinitely.
    pub async fn set_timeout(&self, timeout: Option<Duration>) {
        self.inner.lock().await.timeout = timeout;
    }

    /// The configured per-request timeout.
    pub async fn timeout(&self) -> Option<Duration> {
        self.inner.lock().await.timeout
    }

    /// Close the underlying connection. Later requests fail with
    /// [`Error::NotConnected`].
    pub async fn close(&self) -> Result<()> {
        self.inner.lock().await.transport.close().await
    }

    /// Send one request packet and read one reply packet.
    ///
    /// No validation is applied to either packet; most callers want
    /// [`query`](Self::query) instead.
    pub async fn execute(&self, request: &Packet) -> Result<Packet> {
        let bytes = request.encode()?;

        let mut inner = self.inner.lock().await;
        let timeout = inner.timeout;
        match timeout {
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                tokio::time::timeout_at(deadline, inner.transact(&bytes))
                    .await
                    .map_err(|_| {
                        tracing::debug!(
                            timeout_ms = timeout.as_millis(),
                            "Timed out waiting for reply"
                        );
                        Error::Timeout
                    })?
            }
            None => inner.transact(&bytes).await,
        }
    }

    /// Read a get/set variable.
    ///
    /// Returns the raw value bytes, including the device's NUL terminator
    /// (see [`trim_nul`]). A device error reply becomes [`Error::Device`];
    /// use [`Error::is_not_exist`] to detect a missing key.
    pub async fn query(&self, name: &str) -> Result<Vec<u8>> {
        let request = Packet::new(TYPE_GETSET_REQ).with_tag(TAG_GETSET_NAME, nul_terminated(name));
        self.getset(request).await
    }

    /// Write a get/set variable and return the value the device echoes.
    pub async fn set(&self, name: &str, value: &str) -> Result<Vec<u8>> {
        let request = Packet::new(TYPE_GETSET_REQ)
            .with_tag(TAG_GETSET_NAME, nul_terminated(name))
            .with_tag(TAG_GETSET_VALUE, nul_terminated(value));
        self.getset(request).await
    }

    /// The device's model name, e.g. `hdhomerun4_atsc`.
    pub async fn model(&self) -> Result<String> {
        let value = self.query(MODEL_QUERY).await?;
        Ok(nul_str(&value))
    }

    /// A handle for the tuner at `index`. No I/O is performed.
    pub fn tuner(&self, index: usize) -> Tuner<'_, T> {
        Tuner::new(self, index)
    }

    async fn getset(&self, request: Packet) -> Result<Vec<u8>> {
        let name = request
            .find_tag(TAG_GETSET_NAME)
            .map(<[u8]>::to_vec)
            .unwrap_or_default();

        tracing::trace!(name = %nul_str(&name), "Get/set request");

        let reply = self.execute(&request).await?;
        check_getset_reply(&name, reply)
    }
}

impl<T: Transport> Inner<T> {
    /// Write one encoded request and read back one decoded reply.
    async fn transact(&mut self, request: &[u8]) -> Result<Packet> {
        self.transport.send(request).await?;
        let len = self.read_packet().await?;
        Ok(Packet::decode(&self.buf[..len])?)
    }

    /// Fill the buffer with exactly one packet and return its length.
    ///
    /// A stream may split a reply across reads, so keep reading until the
    /// header's payload length plus the trailer has arrived.
    async fn read_packet(&mut self) -> Result<usize> {
        let mut filled = 0;
        let mut total = None;

        loop {
            if total.is_none() && filled >= HEADER_SIZE {
                let payload_len = u16::from_be_bytes([self.buf[2], self.buf[3]]) as usize;
                let len = MIN_PACKET_SIZE + payload_len;
                if len > MAX_PACKET_SIZE {
                    return Err(Error::Protocol(format!(
                        "reply of {len} bytes exceeds maximum packet size {MAX_PACKET_SIZE}"
                    )));
                }
                total = Some(len);
            }

            if let Some(len) = total {
                if filled >= len {
                    if filled > len {
                        tracing::warn!(
                            discarded = filled - len,
                            "Discarding bytes after reply packet"
                        );
                    }
                    return Ok(len);
                }
            }

            let n = self.transport.receive(&mut self.buf[filled..]).await?;
            if n == 0 {
                return Err(Error::ConnectionLost);
            }
            filled += n;
        }
    }
}

/// Validate a get/set reply against the NUL-terminated request name and
/// extract the value.
fn check_getset_reply(name: &[u8], reply: Packet) -> Result<Vec<u8>> {
    if reply.packet_type != TYPE_GETSET_RPY {
        return Err(Error::Protocol(format!(
            "expected get/set reply, but got {:#06x}",
            reply.packet_type
        )));
    }

    if let Some(message) = reply.find_tag(TAG_ERROR_MESSAGE) {
        return Err(DeviceError::from_wire(message).into());
    }

    let (Some(reply_name), Some(value)) = (
        reply.find_tag(TAG_GETSET_NAME),
        reply.find_tag(TAG_GETSET_VALUE),
    ) else {
        return Err(Error::Protocol(
            "missing query name and/or value in query reply".into(),
        ));
    };

    if reply_name != name {
        return Err(Error::Protocol(format!(
            "unexpected query in reply packet: {}",
            nul_str(reply_name)
        )));
    }

    Ok(value.to_vec())
}

/// `s` as bytes with a NUL terminator appended.
pub fn nul_terminated(s: &str) -> Vec<u8> {
    let mut b = Vec::with_capacity(s.len() + 1);
    b.extend_from_slice(s.as_bytes());
    b.push(0x00);
    b
}

/// `b` with one trailing NUL terminator removed, if present.
pub fn trim_nul(b: &[u8]) -> &[u8] {
    b.strip_suffix(&[0x00]).unwrap_or(b)
}

/// `b` as text with the NUL terminator removed. Invalid UTF-8 is replaced.
pub fn nul_str(b: &[u8]) -> String {
    String::from_utf8_lossy(trim_nul(b)).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply() -> Packet {
        Packet::new(TYPE_GETSET_RPY)
    }

    #[test]
    fn nul_helpers() {
        assert_eq!(nul_terminated("/sys/model"), b"/sys/model\0");
        assert_eq!(trim_nul(b"abc\0"), b"abc");
        assert_eq!(trim_nul(b"abc"), b"abc");
        assert_eq!(trim_nul(b""), b"");
        assert_eq!(nul_str(b"hdhomerun4_atsc\0"), "hdhomerun4_atsc");
    }

    #[test]
    fn reply_value_returned_with_terminator() {
        let rep = reply()
            .with_tag(TAG_GETSET_NAME, b"/sys/model\0")
            .with_tag(TAG_GETSET_VALUE, b"hdhomerun4_atsc\0");
        let value = check_getset_reply(b"/sys/model\0", rep).unwrap();
        assert_eq!(value, b"hdhomerun4_atsc\0");
    }

    #[test]
    fn reply_wrong_type_rejected() {
        let rep = Packet::new(0x0003)
            .with_tag(TAG_GETSET_NAME, b"/sys/model\0".to_vec())
            .with_tag(TAG_GETSET_VALUE, b"x\0".to_vec());
        let err = check_getset_reply(b"/sys/model\0", rep).unwrap_err();
        assert!(
            matches!(&err, Error::Protocol(msg) if msg.contains("0x0003")),
            "got {err:?}"
        );
    }

    #[test]
    fn reply_name_mismatch_rejected() {
        let rep = reply()
            .with_tag(TAG_GETSET_NAME, b"/sys/hwmodel\0")
            .with_tag(TAG_GETSET_VALUE, b"HDHR4-2US\0");
        let err = check_getset_reply(b"/sys/model\0", rep).unwrap_err();
        match err {
            Error::Protocol(msg) => assert!(msg.contains("/sys/hwmodel"), "{msg}"),
            other => panic!("expected Protocol error, got {other:?}"),
        }
    }

    #[test]
    fn reply_name_without_terminator_rejected() {
        let rep = reply()
            .with_tag(TAG_GETSET_NAME, b"/sys/model")
            .with_tag(TAG_GETSET_VALUE, b"x\0");
        assert!(matches!(
            check_getset_reply(b"/sys/model\0", rep),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn reply_error_tag_becomes_device_error() {
        let rep = reply()
            .with_tag(TAG_GETSET_NAME, b"/tuner9/debug\0")
            .with_tag(TAG_ERROR_MESSAGE, b"ERROR: unknown getset variable\0");
        let err = check_getset_reply(b"/tuner9/debug\0", rep).unwrap_err();
        assert!(err.is_not_exist());
        assert_eq!(err.to_string(), "ERROR: unknown getset variable");
    }

    #[test]
    fn reply_error_tag_wins_over_value() {
        let rep = reply()
            .with_tag(TAG_GETSET_NAME, b"/sys/model\0")
            .with_tag(TAG_GETSET_VALUE, b"x\0")
            .with_tag(TAG_ERROR_MESSAGE, b"ERROR: resource locked\0");
        match check_getset_reply(b"/sys/model\0", rep) {
            Err(Error::Device(e)) => assert_eq!(e.message, "resource locked"),
            other => panic!("expected Device error, got {other:?}"),
        }
    }

    #[test]
    fn reply_missing_value_rejected() {
        let rep = reply()
            .with_tag(TAG_GETSET_NAME, b"/sys/model\0");
        assert!(matches!(
            check_getset_reply(b"/sys/model\0", rep),
            Err(Error::Protocol(_))
        ));

        let rep = reply();
        assert!(matches!(
            check_getset_reply(b"/sys/model\0", rep),
            Err(Error::Protocol(_))
        ));
    }
}
