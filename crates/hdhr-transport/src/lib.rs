//! Transport implementations for hdhr.
//!
//! This crate provides the network plumbing used by the protocol layer:
//!
//! - [`TcpTransport`]: the persistent control connection (TCP port 65001),
//!   implementing the [`Transport`](hdhr_core::Transport) trait
//! - [`UdpTransport`]: datagram socket for broadcast/multicast discovery
//!
//! # Example
//!
//! ```no_run
//! use hdhr_transport::TcpTransport;
//! use hdhr_core::Transport;
//!
//! # async fn example() -> hdhr_core::Result<()> {
//! // No port given, so the default control port 65001 is used.
//! let mut transport = TcpTransport::connect("192.168.1.20").await?;
//! transport.send(&[0x00, 0x04, 0x00, 0x00]).await?;
//! # Ok(())
//! # }
//! ```

pub mod tcp;
pub mod udp;

pub use tcp::{CONTROL_TCP_PORT, TcpTransport, with_default_port};
pub use udp::{DISCOVER_UDP_PORT, UdpTransport};
