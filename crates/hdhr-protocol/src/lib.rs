//! HDHomeRun packet protocol for hdhr.
//!
//! This crate implements the client side of the binary request/reply
//! protocol spoken by HDHomeRun network tuners. It provides:
//!
//! - **Packet codec** ([`packet`]) -- encode and decode packets, including
//!   the CRC-32 trailer and variable-width tag lengths.
//! - **Wire constants** ([`consts`]) -- packet types, tag types, ports and
//!   size limits.
//! - **Client** ([`client`]) -- get/set queries over one TCP control
//!   connection, one transaction at a time.
//! - **ClientBuilder** ([`builder`]) -- fluent builder for `Client`.
//! - **Tuners** ([`tuner`]) -- per-tuner handles and tuner enumeration.
//! - **Tuner status** ([`status`]) -- parser for the text a tuner reports
//!   from its `debug` variable.
//! - **Discovery** ([`discovery`]) -- find devices with a UDP broadcast,
//!   with cancellation.
//!
//! # Example
//!
//! ```no_run
//! use hdhr_protocol::{ClientBuilder, DiscovererBuilder};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> hdhr_core::Result<()> {
//! let cancel = CancellationToken::new();
//! let mut discoverer = DiscovererBuilder::new().build().await?;
//! if let Some(device) = discoverer.discover(&cancel).await? {
//!     let client = ClientBuilder::new().device(&device).build().await?;
//!     println!("model: {}", client.model().await?);
//!
//!     client
//!         .for_each_tuner(|tuner| async move {
//!             let debug = tuner.debug().await?;
//!             println!("tuner {}: {:?}", tuner.index(), debug.tuner);
//!             Ok(())
//!         })
//!         .await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod client;
pub mod consts;
pub mod discovery;
pub mod packet;
pub mod status;
pub mod tuner;

pub use builder::ClientBuilder;
pub use client::{Client, nul_str, nul_terminated, trim_nul};
pub use discovery::{DiscoveredDevice, Discoverer, DiscovererBuilder, parse_device_id};
pub use packet::{Packet, Tag};
pub use status::{
    CableCardStatus, DeviceStatus, NetworkStatus, StopReason, TransportStreamStatus, TunerDebug,
    TunerStatus,
};
pub use tuner::Tuner;
