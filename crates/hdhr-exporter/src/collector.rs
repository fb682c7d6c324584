//! Tuner status collection and Prometheus text rendering.
//!
//! [`collect`] asks a [`Device`] for its model and the debug status of
//! every tuner, then renders the result in the Prometheus text exposition
//! format (version 0.0.4).

use std::fmt::Write as _;

use async_trait::async_trait;
use hdhr_core::error::Result;
use hdhr_core::transport::Transport;
use hdhr_protocol::{CableCardStatus, Client, NetworkStatus, TunerDebug, TunerStatus};
use tokio::sync::Mutex;

/// The view of a device the collector needs.
///
/// Implemented for [`Client`]; tests substitute a fake.
#[async_trait]
pub trait Device: Send + Sync {
    /// The device model name.
    async fn model(&self) -> Result<String>;

    /// `(index, status)` for every tuner, in index order.
    async fn tuners(&self) -> Result<Vec<(usize, TunerDebug)>>;

    /// Release the connection after a scrape.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl<T: Transport + 'static> Device for Client<T> {
    async fn model(&self) -> Result<String> {
        Client::model(self).await
    }

    async fn tuners(&self) -> Result<Vec<(usize, TunerDebug)>> {
        let found = Mutex::new(Vec::new());
        self.for_each_tuner(|tuner| {
            let found = &found;
            async move {
                let debug = tuner.debug().await?;
                found.lock().await.push((tuner.index(), debug));
                Ok(())
            }
        })
        .await?;
        Ok(found.into_inner())
    }

    async fn close(&self) -> Result<()> {
        Client::close(self).await
    }
}

/// One metric family: a name, help text and its samples.
struct Family {
    name: &'static str,
    help: &'static str,
    samples: Vec<(Vec<(&'static str, String)>, f64)>,
}

impl Family {
    fn new(name: &'static str, help: &'static str) -> Self {
        Family {
            name,
            help,
            samples: Vec::new(),
        }
    }

    fn add(&mut self, labels: Vec<(&'static str, String)>, value: f64) {
        self.samples.push((labels, value));
    }

    /// Append this family as a gauge. Families without samples are omitted.
    fn render(&self, out: &mut String) {
        if self.samples.is_empty() {
            return;
        }

        let _ = writeln!(out, "# HELP {} {}", self.name, self.help);
        let _ = writeln!(out, "# TYPE {} gauge", self.name);
        for (labels, value) in &self.samples {
            out.push_str(self.name);
            if !labels.is_empty() {
                out.push('{');
                for (i, (k, v)) in labels.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    let _ = write!(out, "{}=\"{}\"", k, escape_label(v));
                }
                out.push('}');
            }
            let _ = writeln!(out, " {}", value);
        }
    }
}

/// Escape a label value per the text exposition format.
fn escape_label(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Metric families in output order.
struct Metrics {
    device_info: Family,
    tuner_info: Family,
    signal_strength: Family,
    signal_to_noise: Family,
    symbol_error: Family,
    cablecard_bytes: Family,
    cablecard_overflow: Family,
    cablecard_resync: Family,
    network_packets: Family,
    network_errors: Family,
}

impl Metrics {
    fn new() -> Self {
        Metrics {
            device_info: Family::new("hdhomerun_device_info", "Metadata about the device."),
            tuner_info: Family::new(
                "hdhomerun_tuner_info",
                "Metadata about each of the tuners available to a device.",
            ),
            signal_strength: Family::new(
                "hdhomerun_tuner_signal_strength_ratio",
                "Television signal strength ratio for this tuner.",
            ),
            signal_to_noise: Family::new(
                "hdhomerun_tuner_signal_to_noise_ratio",
                "Television signal-to-noise ratio for this tuner.",
            ),
            symbol_error: Family::new(
                "hdhomerun_tuner_symbol_error_ratio",
                "Television symbol error ratio for this tuner.",
            ),
            cablecard_bytes: Family::new(
                "hdhomerun_cablecard_bytes_per_second",
                "Number of bytes per second being received by the CableCARD.",
            ),
            cablecard_overflow: Family::new(
                "hdhomerun_cablecard_overflow",
                "Number of buffer overflows for the CableCARD.",
            ),
            cablecard_resync: Family::new(
                "hdhomerun_cablecard_resync",
                "Number of re-sync operations due to missing sync byte in transport stream for the CableCARD.",
            ),
            network_packets: Family::new(
                "hdhomerun_network_packets_per_second",
                "Number of packets per second being sent by the device for this tuner.",
            ),
            network_errors: Family::new(
                "hdhomerun_network_errors",
                "Number of device network errors for this tuner.",
            ),
        }
    }

    fn tuner(&mut self, tuner: &str, status: &TunerStatus) {
        self.tuner_info.add(
            vec![
                ("tuner", tuner.to_string()),
                ("channel", status.channel.clone()),
                ("lock", status.lock.clone()),
            ],
            1.0,
        );

        let label = || vec![("tuner", tuner.to_string())];
        self.signal_strength
            .add(label(), ratio(status.signal_strength));
        self.signal_to_noise
            .add(label(), ratio(status.signal_to_noise_quality));
        self.symbol_error
            .add(label(), ratio(status.symbol_error_quality));
    }

    fn network(&mut self, tuner: &str, status: &NetworkStatus) {
        self.network_packets
            .add(vec![("tuner", tuner.to_string())], status.packets_per_second as f64);
        self.network_errors
            .add(vec![("tuner", tuner.to_string())], status.errors as f64);
    }

    fn cablecard(&mut self, status: &CableCardStatus) {
        self.cablecard_bytes
            .add(Vec::new(), status.bits_per_second as f64 / 8.0);
        self.cablecard_overflow
            .add(Vec::new(), status.overflow as f64);
        self.cablecard_resync.add(Vec::new(), status.resync as f64);
    }

    fn render(&self) -> String {
        let mut out = String::new();
        for family in [
            &self.device_info,
            &self.tuner_info,
            &self.signal_strength,
            &self.signal_to_noise,
            &self.symbol_error,
            &self.cablecard_bytes,
            &self.cablecard_overflow,
            &self.cablecard_resync,
            &self.network_packets,
            &self.network_errors,
        ] {
            family.render(&mut out);
        }
        out
    }
}

/// A percentage as a 0.0 to 1.0 ratio.
fn ratio(percent: i64) -> f64 {
    percent as f64 / 100.0
}

/// Scrape `device` and render its metrics.
///
/// Fails if the model query or the tuner walk fails; a partial scrape is
/// never rendered.
pub async fn collect<D: Device + ?Sized>(device: &D) -> Result<String> {
    let model = device.model().await?;
    let tuners = device.tuners().await?;

    tracing::debug!(model = %model, tuners = tuners.len(), "Collected device status");

    let mut metrics = Metrics::new();
    metrics.device_info.add(vec![("model", model)], 1.0);

    // Every tuner shares one path into the CableCARD, so report it once.
    let mut cablecard_seen = false;
    for (index, debug) in &tuners {
        let tuner = index.to_string();
        if let Some(status) = &debug.tuner {
            metrics.tuner(&tuner, status);
        }
        if let Some(status) = &debug.network {
            metrics.network(&tuner, status);
        }
        if let Some(status) = &debug.cablecard {
            if !cablecard_seen {
                metrics.cablecard(status);
                cablecard_seen = true;
            }
        }
    }

    Ok(metrics.render())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use hdhr_core::error::{DeviceError, Error};
    use hdhr_protocol::StopReason;

    /// In-memory device for collector and handler tests.
    pub(crate) struct FakeDevice {
        pub model: Result<String>,
        pub tuners: Result<Vec<(usize, TunerDebug)>>,
    }

    #[async_trait]
    impl Device for FakeDevice {
        async fn model(&self) -> Result<String> {
            match &self.model {
                Ok(m) => Ok(m.clone()),
                Err(e) => Err(Error::Protocol(e.to_string())),
            }
        }

        async fn tuners(&self) -> Result<Vec<(usize, TunerDebug)>> {
            match &self.tuners {
                Ok(t) => Ok(t.clone()),
                Err(e) => Err(Error::Protocol(e.to_string())),
            }
        }
    }

    pub(crate) fn locked_tuner(cablecard_bps: Option<i64>) -> TunerDebug {
        TunerDebug {
            tuner: Some(TunerStatus {
                channel: "qam:33".into(),
                lock: "qam256:33".into(),
                signal_strength: 83,
                signal_to_noise_quality: 90,
                symbol_error_quality: 100,
                debug: "-494/13726".into(),
            }),
            cablecard: cablecard_bps.map(|bps| CableCardStatus {
                bits_per_second: bps,
                resync: 1,
                overflow: 2,
            }),
            network: Some(NetworkStatus {
                packets_per_second: 3,
                errors: 4,
                stop: StopReason::NotStopped,
            }),
            ..TunerDebug::default()
        }
    }

    pub(crate) fn fake_device() -> FakeDevice {
        FakeDevice {
            model: Ok("hdhomerun3_cablecard".into()),
            tuners: Ok(vec![
                (0, locked_tuner(Some(38807712))),
                (1, locked_tuner(Some(1))),
            ]),
        }
    }

    fn has_line(out: &str, line: &str) -> bool {
        out.lines().any(|l| l == line)
    }

    #[tokio::test]
    async fn renders_device_and_tuner_metrics() {
        let out = collect(&fake_device()).await.unwrap();

        for line in [
            "# TYPE hdhomerun_device_info gauge",
            "hdhomerun_device_info{model=\"hdhomerun3_cablecard\"} 1",
            "hdhomerun_tuner_info{tuner=\"0\",channel=\"qam:33\",lock=\"qam256:33\"} 1",
            "hdhomerun_tuner_info{tuner=\"1\",channel=\"qam:33\",lock=\"qam256:33\"} 1",
            "hdhomerun_tuner_signal_strength_ratio{tuner=\"0\"} 0.83",
            "hdhomerun_tuner_signal_to_noise_ratio{tuner=\"0\"} 0.9",
            "hdhomerun_tuner_symbol_error_ratio{tuner=\"1\"} 1",
            "hdhomerun_network_packets_per_second{tuner=\"1\"} 3",
            "hdhomerun_network_errors{tuner=\"0\"} 4",
            "hdhomerun_cablecard_bytes_per_second 4850964",
            "hdhomerun_cablecard_overflow 2",
            "hdhomerun_cablecard_resync 1",
        ] {
            assert!(has_line(&out, line), "missing {line:?} in:\n{out}");
        }
    }

    #[tokio::test]
    async fn families_are_grouped() {
        let out = collect(&fake_device()).await.unwrap();

        // Both tuner_info samples directly follow their TYPE line.
        let lines: Vec<&str> = out.lines().collect();
        let pos = lines
            .iter()
            .position(|l| *l == "# TYPE hdhomerun_tuner_info gauge")
            .unwrap();
        assert!(lines[pos + 1].starts_with("hdhomerun_tuner_info{tuner=\"0\""));
        assert!(lines[pos + 2].starts_with("hdhomerun_tuner_info{tuner=\"1\""));
    }

    #[tokio::test]
    async fn cablecard_reported_once() {
        let out = collect(&fake_device()).await.unwrap();
        let count = out
            .lines()
            .filter(|l| l.starts_with("hdhomerun_cablecard_bytes_per_second "))
            .count();
        assert_eq!(count, 1);
        assert!(!has_line(&out, "hdhomerun_cablecard_bytes_per_second 0.125"));
    }

    #[tokio::test]
    async fn no_cablecard_no_family() {
        let device = FakeDevice {
            model: Ok("hdhomerun4_atsc".into()),
            tuners: Ok(vec![(0, locked_tuner(None))]),
        };
        let out = collect(&device).await.unwrap();
        assert!(!out.contains("hdhomerun_cablecard"));
        assert!(has_line(&out, "hdhomerun_tuner_signal_strength_ratio{tuner=\"0\"} 0.83"));
    }

    #[tokio::test]
    async fn model_failure_fails_scrape() {
        let device = FakeDevice {
            model: Err(DeviceError::from_wire(b"ERROR: unknown getset variable").into()),
            tuners: Ok(Vec::new()),
        };
        assert!(collect(&device).await.is_err());
    }

    #[tokio::test]
    async fn tuner_failure_fails_scrape() {
        let device = FakeDevice {
            model: Ok("hdhomerun4_atsc".into()),
            tuners: Err(Error::Timeout),
        };
        assert!(collect(&device).await.is_err());
    }

    #[test]
    fn label_values_escaped() {
        assert_eq!(escape_label("a\"b\\c\nd"), "a\\\"b\\\\c\\nd");
    }
}
