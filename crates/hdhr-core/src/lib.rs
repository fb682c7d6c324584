//! hdhr-core: Core traits, types, and error definitions for hdhr.
//!
//! This crate defines the pieces shared by every other hdhr crate, so that
//! applications and test fakes can depend on them without pulling in any
//! networking code.
//!
//! # Key types
//!
//! - [`Transport`] -- byte-level stream channel to a device
//! - [`DeviceType`] / [`DeviceId`] -- device identity as seen by discovery
//! - [`Error`] / [`Result`] -- error handling, including [`DeviceError`]

pub mod error;
pub mod transport;
pub mod types;

pub use error::{DeviceError, Error, FrameError, Result};
pub use transport::Transport;
pub use types::{DeviceId, DeviceType};
