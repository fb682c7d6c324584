//! Device identity types shared by discovery and the command-line tools.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// The kind of device answering a discovery request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceType {
    /// A TV tuner.
    Tuner,
    /// A storage (DVR) unit.
    Storage,
    /// Matches any device type in a discovery request.
    Wildcard,
    /// A type code not known to this library.
    Unknown(u32),
}

impl DeviceType {
    /// Wire value for [`DeviceType::Tuner`].
    pub const TUNER_CODE: u32 = 0x0000_0001;
    /// Wire value for [`DeviceType::Storage`].
    pub const STORAGE_CODE: u32 = 0x0000_0005;
    /// Wire value for [`DeviceType::Wildcard`].
    pub const WILDCARD_CODE: u32 = 0xFFFF_FFFF;

    /// Decode a device type from its 32-bit wire value.
    pub fn from_code(code: u32) -> Self {
        match code {
            Self::TUNER_CODE => DeviceType::Tuner,
            Self::STORAGE_CODE => DeviceType::Storage,
            Self::WILDCARD_CODE => DeviceType::Wildcard,
            other => DeviceType::Unknown(other),
        }
    }

    /// The 32-bit wire value of this device type.
    pub fn code(self) -> u32 {
        match self {
            DeviceType::Tuner => Self::TUNER_CODE,
            DeviceType::Storage => Self::STORAGE_CODE,
            DeviceType::Wildcard => Self::WILDCARD_CODE,
            DeviceType::Unknown(code) => code,
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceType::Tuner => write!(f, "tuner"),
            DeviceType::Storage => write!(f, "storage"),
            DeviceType::Wildcard => write!(f, "wildcard"),
            DeviceType::Unknown(code) => write!(f, "unknown({code})"),
        }
    }
}

impl FromStr for DeviceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "tuner" => Ok(DeviceType::Tuner),
            "storage" => Ok(DeviceType::Storage),
            "wildcard" | "any" | "*" => Ok(DeviceType::Wildcard),
            other => Err(Error::InvalidParameter(format!(
                "unknown device type: {other:?}"
            ))),
        }
    }
}

/// A 4-byte device ID, written as eight hexadecimal characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId(pub [u8; 4]);

impl DeviceId {
    /// Matches a device with any ID in a discovery request.
    pub const WILDCARD: DeviceId = DeviceId([0xFF; 4]);

    /// The raw bytes as carried in a device ID tag.
    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    /// Build a device ID from a tag payload, which must be exactly 4 bytes.
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        let bytes: [u8; 4] = data.try_into().map_err(|_| {
            Error::Protocol(format!("unexpected device ID length: {}", data.len()))
        })?;
        Ok(DeviceId(bytes))
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl FromStr for DeviceId {
    type Err = Error;

    /// Parse an eight character hexadecimal string such as `"1040abcd"`.
    fn from_str(s: &str) -> Result<Self> {
        if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::InvalidParameter(format!(
                "device ID must be eight hexadecimal characters: {s:?}"
            )));
        }

        let value = u32::from_str_radix(s, 16)
            .map_err(|e| Error::InvalidParameter(format!("invalid device ID {s:?}: {e}")))?;
        Ok(DeviceId(value.to_be_bytes()))
    }
}
