//! Prometheus exporter for HDHomeRun devices.
//!
//! Each scrape of `/metrics?target=<host[:port]>` opens a control
//! connection to the target, walks its tuners and renders their status in
//! the Prometheus text format. See [`handler::router`] for the HTTP side and
//! [`collector::collect`] for the metric families.

pub mod collector;
pub mod handler;

pub use collector::{Device, collect};
pub use handler::{CONTENT_TYPE, Dial, DialFuture, router, tcp_dial};
