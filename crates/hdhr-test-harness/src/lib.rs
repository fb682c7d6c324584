//! hdhr-test-harness: Test utilities and mock devices for hdhr.
//!
//! This crate provides [`MockTransport`] for deterministic unit testing of
//! the transaction client without a real device, and [`MockDevice`], a
//! loopback TCP server that answers get/set requests from a table of
//! variables.

pub mod mock_device;
pub mod mock_transport;

pub use mock_device::{MockDevice, RunningMockDevice};
pub use mock_transport::MockTransport;
