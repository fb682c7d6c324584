//! Parser for the text a tuner reports from its `debug` variable.
//!
//! The value is several lines, each a prefix followed by `key=value`
//! fields:
//!
//! ```text
//! tun: ch=qam:33 lock=qam256:33 ss=83 snq=90 seq=100 dbg=-494/13726
//! dev: bps=38807712 resync=0 overflow=0
//! cc: bps=38807712 resync=0 overflow=0
//! ts: bps=38807712 te=0 crc=0
//! net: pps=0 err=0 stop=0
//! ```
//!
//! A component whose line is absent is reported as `None`.

use std::fmt;

use hdhr_core::error::{Error, Result};

/// Everything a tuner reports about itself and its stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TunerDebug {
    pub tuner: Option<TunerStatus>,
    pub device: Option<DeviceStatus>,
    pub cablecard: Option<CableCardStatus>,
    pub transport_stream: Option<TransportStreamStatus>,
    pub network: Option<NetworkStatus>,
}

/// RF status of the tuner (`tun:` line).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TunerStatus {
    /// Tuned channel, e.g. `qam:33`, or `none`.
    pub channel: String,
    /// Lock state, e.g. `qam256:33`, or `none`.
    pub lock: String,
    /// Signal strength, percent.
    pub signal_strength: i64,
    /// Signal to noise quality, percent.
    pub signal_to_noise_quality: i64,
    /// Symbol error quality, percent.
    pub symbol_error_quality: i64,
    /// Opaque vendor debug string.
    pub debug: String,
}

/// Stream processing status of the tuner (`dev:` line).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceStatus {
    pub bits_per_second: i64,
    pub resync: i64,
    pub overflow: i64,
}

/// CableCARD status, if one is installed (`cc:` line).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CableCardStatus {
    pub bits_per_second: i64,
    pub resync: i64,
    pub overflow: i64,
}

/// Incoming transport stream status (`ts:` line).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportStreamStatus {
    pub bits_per_second: i64,
    pub transport_errors: i64,
    pub crc_errors: i64,
}

/// Outgoing network stream status (`net:` line).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkStatus {
    pub packets_per_second: i64,
    pub errors: i64,
    pub stop: StopReason,
}

/// Why a tuner's network stream stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum StopReason {
    #[default]
    NotStopped,
    Intentional,
    IcmpReject,
    ConnectionLoss,
    HttpConnectionClose,
    Unknown(i64),
}

impl StopReason {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => StopReason::NotStopped,
            1 => StopReason::Intentional,
            2 => StopReason::IcmpReject,
            3 => StopReason::ConnectionLoss,
            4 => StopReason::HttpConnectionClose,
            other => StopReason::Unknown(other),
        }
    }

    pub fn code(self) -> i64 {
        match self {
            StopReason::NotStopped => 0,
            StopReason::Intentional => 1,
            StopReason::IcmpReject => 2,
            StopReason::ConnectionLoss => 3,
            StopReason::HttpConnectionClose => 4,
            StopReason::Unknown(n) => n,
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::NotStopped => write!(f, "not stopped"),
            StopReason::Intentional => write!(f, "intentional"),
            StopReason::IcmpReject => write!(f, "ICMP reject"),
            StopReason::ConnectionLoss => write!(f, "connection loss"),
            StopReason::HttpConnectionClose => write!(f, "HTTP connection close"),
            StopReason::Unknown(n) => write!(f, "unknown({n})"),
        }
    }
}

impl TunerDebug {
    /// Parse the full text of a tuner `debug` value.
    ///
    /// NUL bytes are ignored. Lines with an unrecognized prefix are
    /// skipped.
    pub fn parse(text: &str) -> Result<Self> {
        let mut debug = TunerDebug::default();
        for line in text.lines() {
            debug.parse_line(line.trim_matches('\0'))?;
        }
        Ok(debug)
    }

    fn parse_line(&mut self, line: &str) -> Result<()> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields.as_slice() {
            [] => return Ok(()),
            [_] => {
                return Err(Error::Protocol(format!(
                    "malformed tuner status line: {line:?}"
                )));
            }
            _ => {}
        }

        let pairs = key_values(&fields[1..])?;

        match fields[0] {
            "tun:" => self.tuner = Some(parse_tuner(&pairs)?),
            "dev:" => {
                let [bps, resync, overflow] = numeric(&pairs, ["bps", "resync", "overflow"])?;
                self.device = Some(DeviceStatus {
                    bits_per_second: bps,
                    resync,
                    overflow,
                });
            }
            "cc:" => {
                let [bps, resync, overflow] = numeric(&pairs, ["bps", "resync", "overflow"])?;
                self.cablecard = Some(CableCardStatus {
                    bits_per_second: bps,
                    resync,
                    overflow,
                });
            }
            "ts:" => {
                let [bps, te, crc] = numeric(&pairs, ["bps", "te", "crc"])?;
                self.transport_stream = Some(TransportStreamStatus {
                    bits_per_second: bps,
                    transport_errors: te,
                    crc_errors: crc,
                });
            }
            "net:" => {
                let [pps, err, stop] = numeric(&pairs, ["pps", "err", "stop"])?;
                self.network = Some(NetworkStatus {
                    packets_per_second: pps,
                    errors: err,
                    stop: StopReason::from_code(stop),
                });
            }
            prefix => tracing::trace!(prefix, "Ignoring unknown tuner status line"),
        }

        Ok(())
    }
}

/// Split each `key=value` field.
fn key_values<'a>(fields: &[&'a str]) -> Result<Vec<(&'a str, &'a str)>> {
    fields
        .iter()
        .map(|field| {
            let mut parts = field.split('=');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(k), Some(v), None) => Ok((k, v)),
                _ => Err(Error::Protocol(format!(
                    "invalid key=value pair: {field:?}"
                ))),
            }
        })
        .collect()
}

/// The `tun:` line mixes text and numeric fields; only the numeric keys
/// must parse as integers.
fn parse_tuner(pairs: &[(&str, &str)]) -> Result<TunerStatus> {
    let mut status = TunerStatus::default();
    for &(key, value) in pairs {
        match key {
            "ch" => status.channel = value.to_string(),
            "lock" => status.lock = value.to_string(),
            "dbg" => status.debug = value.to_string(),
            "ss" => status.signal_strength = parse_int(value)?,
            "snq" => status.signal_to_noise_quality = parse_int(value)?,
            "seq" => status.symbol_error_quality = parse_int(value)?,
            _ => {}
        }
    }
    Ok(status)
}

/// Every value on a numeric line must be an integer, including keys we
/// don't use. Returns the values of `keys` in order, zero when absent.
fn numeric<const N: usize>(pairs: &[(&str, &str)], keys: [&str; N]) -> Result<[i64; N]> {
    let mut out = [0i64; N];
    for &(key, value) in pairs {
        let v = parse_int(value)?;
        if let Some(i) = keys.iter().position(|k| *k == key) {
            out[i] = v;
        }
    }
    Ok(out)
}

fn parse_int(value: &str) -> Result<i64> {
    value
        .parse()
        .map_err(|e| Error::Protocol(format!("invalid integer {value:?}: {e}")))
}
