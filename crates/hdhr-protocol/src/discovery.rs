//! Device discovery over UDP broadcast.
//!
//! A [`Discoverer`] sends one discovery request when it is built, then
//! listens for replies on the same socket. Each [`Discoverer::discover`]
//! call returns the next device that answers; the request is never
//! re-sent, so repeated calls walk every device that replied.
//!
//! # Usage
//!
//! ```no_run
//! use hdhr_protocol::discovery::Discoverer;
//! use tokio_util::sync::CancellationToken;
//! use std::time::Duration;
//!
//! # async fn example() -> hdhr_core::Result<()> {
//! let cancel = CancellationToken::new();
//! let timer = cancel.clone();
//! tokio::spawn(async move {
//!     tokio::time::sleep(Duration::from_secs(2)).await;
//!     timer.cancel();
//! });
//!
//! let mut discoverer = Discoverer::new().await?;
//! while let Some(device) = discoverer.discover(&cancel).await? {
//!     println!("{} {} at {}", device.device_type, device.id, device.addr);
//! }
//! # Ok(())
//! # }
//! ```

use std::net::{Ipv4Addr, SocketAddr};

use hdhr_core::error::{Error, Result};
use hdhr_core::types::{DeviceId, DeviceType};
use hdhr_transport::{DISCOVER_UDP_PORT, UdpTransport};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::consts::{
    TAG_BASE_URL, TAG_DEVICE_ID, TAG_DEVICE_TYPE, TAG_TUNER_COUNT, TYPE_DISCOVER_REQ,
    TYPE_DISCOVER_RPY,
};
use crate::packet::Packet;

/// Size of the datagram receive buffer.
const REPLY_BUFFER_SIZE: usize = 2048;

/// A device that answered a discovery request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    /// Unique device ID.
    pub id: DeviceId,
    /// Address the reply came from. Its IP is the device's control address.
    pub addr: SocketAddr,
    /// Kind of device, such as a tuner or storage unit.
    pub device_type: DeviceType,
    /// Web UI address, if the device reported one.
    pub url: Option<Url>,
    /// Number of tuners, or 0 if the device did not say.
    pub tuners: u8,
}

/// Parse an eight character hexadecimal device ID.
pub fn parse_device_id(id: &str) -> Result<DeviceId> {
    id.parse()
}

/// Fluent builder for [`Discoverer`].
#[derive(Debug, Clone)]
pub struct DiscovererBuilder {
    device_type: DeviceType,
    device_id: DeviceId,
    target: SocketAddr,
    local_addr: SocketAddr,
    broadcast: bool,
}

impl DiscovererBuilder {
    /// Look for any device type with any ID, broadcast to
    /// `255.255.255.255:65001` from an ephemeral port.
    pub fn new() -> Self {
        DiscovererBuilder {
            device_type: DeviceType::Wildcard,
            device_id: DeviceId::WILDCARD,
            target: SocketAddr::from((Ipv4Addr::BROADCAST, DISCOVER_UDP_PORT)),
            local_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            broadcast: true,
        }
    }

    /// Only ask devices of this type to reply.
    pub fn device_type(mut self, device_type: DeviceType) -> Self {
        self.device_type = device_type;
        self
    }

    /// Only ask the device with this ID to reply.
    pub fn device_id(mut self, id: DeviceId) -> Self {
        self.device_id = id;
        self
    }

    /// Where to send the discovery request.
    pub fn target(mut self, addr: SocketAddr) -> Self {
        self.target = addr;
        self
    }

    /// Local address to bind the socket to.
    pub fn local_addr(mut self, addr: SocketAddr) -> Self {
        self.local_addr = addr;
        self
    }

    /// Whether to enable `SO_BROADCAST` on the socket (default: true).
    pub fn broadcast(mut self, enable: bool) -> Self {
        self.broadcast = enable;
        self
    }

    /// The request packet this builder sends.
    pub fn request(&self) -> Packet {
        Packet::new(TYPE_DISCOVER_REQ)
            .with_tag(TAG_DEVICE_TYPE, self.device_type.code().to_be_bytes())
            .with_tag(TAG_DEVICE_ID, *self.device_id.as_bytes())
    }

    /// Bind the socket and send the discovery request.
    pub async fn build(self) -> Result<Discoverer> {
        let request = self.request().encode()?;

        let socket = UdpTransport::bind(self.local_addr).await?;
        if self.broadcast {
            socket.set_broadcast(true)?;
        }

        tracing::debug!(
            dest = %self.target,
            device_type = %self.device_type,
            device_id = %self.device_id,
            "Sending discovery request"
        );
        socket.send_to(&request, self.target).await?;

        Ok(Discoverer {
            socket: Some(socket),
            canceled: false,
            buf: vec![0u8; REPLY_BUFFER_SIZE],
        })
    }
}

impl Default for DiscovererBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Listens for replies to one discovery request.
#[derive(Debug)]
pub struct Discoverer {
    /// `None` once canceled or after a fatal socket error.
    socket: Option<UdpTransport>,
    canceled: bool,
    buf: Vec<u8>,
}

impl Discoverer {
    /// Discover any device on the local network with default settings.
    pub async fn new() -> Result<Self> {
        DiscovererBuilder::new().build().await
    }

    /// The bound socket address, or `None` once the socket is closed.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().map(UdpTransport::local_addr)
    }

    /// Wait for the next device to reply.
    ///
    /// Returns `Ok(None)` once `cancel` fires; that is the normal end of
    /// discovery, not a failure. Malformed or unrelated datagrams are
    /// skipped. A socket error is returned and ends discovery: later calls
    /// fail with [`Error::NotConnected`].
    pub async fn discover(&mut self, cancel: &CancellationToken) -> Result<Option<DiscoveredDevice>> {
        loop {
            if cancel.is_cancelled() {
                self.finish_canceled();
                return Ok(None);
            }

            let Some(socket) = self.socket.as_ref() else {
                return if self.canceled {
                    Ok(None)
                } else {
                    Err(Error::NotConnected)
                };
            };

            let received = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                r = socket.recv_from(&mut self.buf) => Some(r),
            };

            match received {
                // Canceled mid-read; handled at the top of the loop.
                None => continue,
                Some(Err(e)) => {
                    if cancel.is_cancelled() {
                        self.finish_canceled();
                        return Ok(None);
                    }
                    tracing::debug!(error = %e, "Discovery socket failed");
                    self.socket = None;
                    return Err(e);
                }
                Some(Ok((n, src))) => match parse_reply(&self.buf[..n], src) {
                    Ok(device) => {
                        tracing::debug!(
                            id = %device.id,
                            addr = %device.addr,
                            device_type = %device.device_type,
                            "Discovered device"
                        );
                        return Ok(Some(device));
                    }
                    Err(e) => {
                        tracing::warn!(src = %src, error = %e, "Ignoring malformed discovery reply");
                    }
                },
            }
        }
    }

    fn finish_canceled(&mut self) {
        if self.socket.take().is_some() {
            tracing::debug!("Discovery canceled");
        }
        self.canceled = true;
    }
}

/// The base URL tag is optional. A value that is not a URL, even with an
/// `http://` scheme added, is dropped without rejecting the reply.
fn parse_base_url(data: &[u8]) -> Option<Url> {
    let text = String::from_utf8_lossy(data);
    let text = text.trim_end_matches('\0');

    match Url::parse(text).or_else(|_| Url::parse(&format!("http://{text}"))) {
        Ok(url) => Some(url),
        Err(e) => {
            tracing::debug!(url = %text, error = %e, "Ignoring unparseable base URL");
            None
        }
    }
}

/// Build a [`DiscoveredDevice`] from one received datagram.
pub fn parse_reply(data: &[u8], src: SocketAddr) -> Result<DiscoveredDevice> {
    let packet = Packet::decode(data)?;
    if packet.packet_type != TYPE_DISCOVER_RPY {
        return Err(Error::Protocol(format!(
            "expected discover reply, but got {:#06x}",
            packet.packet_type
        )));
    }

    let mut device_type = None;
    let mut id = None;
    let mut url = None;
    let mut tuners = 0;

    for tag in &packet.tags {
        match tag.tag_type {
            TAG_DEVICE_TYPE => {
                let code: [u8; 4] = tag.data.as_slice().try_into().map_err(|_| {
                    Error::Protocol(format!(
                        "unexpected device type length in discover reply: {}",
                        tag.data.len()
                    ))
                })?;
                // A zero code carries no type at all.
                device_type = match u32::from_be_bytes(code) {
                    0 => None,
                    code => Some(DeviceType::from_code(code)),
                };
            }
            TAG_DEVICE_ID => id = Some(DeviceId::from_slice(&tag.data)?),
            TAG_BASE_URL => url = parse_base_url(&tag.data),
            TAG_TUNER_COUNT => {
                let [count] = tag.data.as_slice() else {
                    return Err(Error::Protocol(format!(
                        "unexpected tuner count length in discover reply: {}",
                        tag.data.len()
                    )));
                };
                tuners = *count;
            }
            _ => {}
        }
    }

    let device_type = device_type
        .ok_or_else(|| Error::Protocol("no device type found in discover reply".into()))?;
    let id = id.ok_or_else(|| Error::Protocol("no device ID found in discover reply".into()))?;

    Ok(DiscoveredDevice {
        id,
        addr: src,
        device_type,
        url,
        tuners,
    })
}
