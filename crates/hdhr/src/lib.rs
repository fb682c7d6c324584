//! # hdhr -- Async client for HDHomeRun network tuners
//!
//! `hdhr` talks to SiliconDust HDHomeRun devices over their binary control
//! protocol: find devices on the LAN, read and write device variables, and
//! walk the tuners of a device reading their signal status.
//!
//! ## Quick Start
//!
//! ```no_run
//! use hdhr::{ClientBuilder, DiscovererBuilder};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cancel = CancellationToken::new();
//!     let mut discoverer = DiscovererBuilder::new().build().await?;
//!
//!     while let Some(device) = discoverer.discover(&cancel).await? {
//!         let client = ClientBuilder::new().device(&device).build().await?;
//!         println!("{} at {}: {}", device.id, device.addr, client.model().await?);
//!         cancel.cancel();
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! | Crate              | Purpose                                              |
//! |--------------------|------------------------------------------------------|
//! | `hdhr-core`        | [`Error`], [`Transport`] trait, device identity types |
//! | `hdhr-transport`   | TCP control connection and UDP discovery socket      |
//! | `hdhr-protocol`    | Packet codec, get/set client, tuners, discovery      |
//! | `hdhr-exporter`    | Prometheus exporter (feature `exporter`)             |
//! | **`hdhr`**         | This facade crate -- re-exports everything           |

pub use hdhr_core::*;
pub use hdhr_protocol::*;

/// Network transports.
pub mod transport {
    pub use hdhr_transport::*;
}

/// Prometheus metrics for device and tuner status.
#[cfg(feature = "exporter")]
pub mod exporter {
    pub use hdhr_exporter::*;
}
