//! Error types for hdhr.
//!
//! All fallible operations across the library return [`Result<T>`], which
//! uses [`Error`] as the error type. Framing, protocol, device-reported, and
//! transport errors are kept as distinct variants so callers can tell a
//! corrupted packet apart from a device saying "no such key".

use std::fmt;

/// Prefix a device prepends to the text of an error message tag.
pub const DEVICE_ERROR_PREFIX: &str = "ERROR: ";

/// Message body a device reports when a get/set key does not exist.
///
/// Matching on firmware wording is brittle, but the protocol offers no
/// structured status code for this condition.
pub const UNKNOWN_GETSET_VARIABLE: &str = "unknown getset variable";

/// The error type for all hdhr operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (TCP socket, UDP socket).
    #[error("transport error: {0}")]
    Transport(String),

    /// A protocol-level error: unexpected reply type, echoed name mismatch,
    /// missing required tags.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A packet could not be framed or unframed.
    #[error("framing error: {0}")]
    Frame(#[from] FrameError),

    /// The device answered with an error message tag.
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// Timed out waiting for a reply from the device.
    #[error("timeout waiting for response")]
    Timeout,

    /// An invalid parameter was passed by the caller.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The connection or socket has already been closed.
    #[error("not connected")]
    NotConnected,

    /// The connection to the device was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns `true` if this error is a device-reported "unknown getset
    /// variable" error, meaning the queried key does not exist.
    pub fn is_not_exist(&self) -> bool {
        matches!(self, Error::Device(e) if e.is_not_exist())
    }
}

/// Errors produced while encoding or decoding a packet.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// The buffer ended before a complete packet or tag could be read,
    /// or a declared length disagrees with the bytes present.
    #[error("unexpected end of packet")]
    Truncated,

    /// The CRC-32 trailer does not match the packet contents.
    #[error("invalid CRC32 checksum: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    /// A tag length helper was handed a buffer that is not exactly two bytes.
    #[error("tag length buffer must be exactly two bytes, got {0}")]
    TagLengthBuffer(usize),

    /// A tag's data is longer than the two-byte length field can express.
    #[error("tag data too long: {0} bytes")]
    TagTooLong(usize),

    /// The encoded tags do not fit the 16-bit payload length field.
    #[error("payload too long: {0} bytes")]
    PayloadTooLong(usize),
}

/// An error message returned by a device in a get/set reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceError {
    /// The message text, without the `ERROR: ` prefix.
    pub message: String,
}

impl DeviceError {
    /// Build a `DeviceError` from the raw bytes of an error message tag.
    ///
    /// A trailing NUL terminator and the `ERROR: ` prefix are removed.
    pub fn from_wire(data: &[u8]) -> Self {
        let data = data.strip_suffix(&[0x00]).unwrap_or(data);
        let text = String::from_utf8_lossy(data);
        let message = text
            .strip_prefix(DEVICE_ERROR_PREFIX)
            .unwrap_or(&text)
            .to_string();
        DeviceError { message }
    }

    /// Returns `true` if the device reported that the key does not exist.
    pub fn is_not_exist(&self) -> bool {
        self.message == UNKNOWN_GETSET_VARIABLE
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", DEVICE_ERROR_PREFIX, self.message)
    }
}

impl std::error::Error for DeviceError {}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;
