//! Wire constants for the HDHomeRun packet protocol.
//!
//! Values match the vendor's `hdhomerun_pkt.h`. Upgrade packet types and
//! the auth/lockkey tags are listed for completeness; this library never
//! sends them.

pub use hdhr_transport::{CONTROL_TCP_PORT, DISCOVER_UDP_PORT};

/// Largest packet a device sends or accepts, header and checksum included.
pub const MAX_PACKET_SIZE: usize = 1460;

/// Largest tag payload that fits in [`MAX_PACKET_SIZE`].
pub const MAX_PAYLOAD_SIZE: usize = 1452;

/// Bytes of packet type + payload length header.
pub const HEADER_SIZE: usize = 4;

/// Bytes of CRC-32 trailer.
pub const CHECKSUM_SIZE: usize = 4;

/// Smallest valid packet: header, no tags, checksum.
pub const MIN_PACKET_SIZE: usize = HEADER_SIZE + CHECKSUM_SIZE;

// ---------------------------------------------------------------------------
// Packet types
// ---------------------------------------------------------------------------

pub const TYPE_DISCOVER_REQ: u16 = 0x0002;
pub const TYPE_DISCOVER_RPY: u16 = 0x0003;
pub const TYPE_GETSET_REQ: u16 = 0x0004;
pub const TYPE_GETSET_RPY: u16 = 0x0005;
pub const TYPE_UPGRADE_REQ: u16 = 0x0006;
pub const TYPE_UPGRADE_RPY: u16 = 0x0007;

// ---------------------------------------------------------------------------
// Tag types
// ---------------------------------------------------------------------------

/// Device type, 4 bytes big-endian.
pub const TAG_DEVICE_TYPE: u8 = 0x01;
/// Device ID, 4 bytes.
pub const TAG_DEVICE_ID: u8 = 0x02;
/// Get/set variable name, NUL-terminated.
pub const TAG_GETSET_NAME: u8 = 0x03;
/// Get/set variable value, NUL-terminated.
pub const TAG_GETSET_VALUE: u8 = 0x04;
/// Error message, `ERROR: ` prefixed.
pub const TAG_ERROR_MESSAGE: u8 = 0x05;
/// Number of tuners, 1 byte.
pub const TAG_TUNER_COUNT: u8 = 0x10;
pub const TAG_GETSET_LOCKKEY: u8 = 0x15;
pub const TAG_DEVICE_AUTH_BIN: u8 = 0x29;
/// Web UI base URL.
pub const TAG_BASE_URL: u8 = 0x2A;
pub const TAG_DEVICE_AUTH_STR: u8 = 0x2B;
