// hdhomerun-exporter -- serve Prometheus metrics for HDHomeRun devices.
//
// Usage:
//   hdhomerun-exporter
//   hdhomerun-exporter --metrics-addr 127.0.0.1:9137 --hdhomerun-timeout 2s
//
// Scrape with:
//   curl 'http://localhost:9137/metrics?target=192.168.1.20'

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use hdhr_exporter::{router, tcp_dial};

/// Prometheus exporter for HDHomeRun tuner status.
#[derive(Parser)]
#[command(name = "hdhomerun-exporter", version, about)]
struct Cli {
    /// Address for the HTTP server to listen on. A bare ":port" listens on
    /// all interfaces.
    #[arg(long, env = "HDHOMERUN_EXPORTER_METRICS_ADDR", default_value = ":9137", value_parser = parse_listen_addr)]
    metrics_addr: SocketAddr,

    /// URL path on which metrics are served.
    #[arg(long, default_value = "/metrics")]
    metrics_path: String,

    /// Per-request timeout for device queries, e.g. "1s" or "500ms". Zero
    /// disables it.
    #[arg(long, default_value = "1s", value_parser = parse_duration)]
    hdhomerun_timeout: Duration,
}

/// Parse a listen address, accepting ":port" as shorthand for all interfaces.
fn parse_listen_addr(s: &str) -> std::result::Result<SocketAddr, String> {
    let full = match s.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{port}"),
        None => s.to_string(),
    };
    full.parse()
        .map_err(|e| format!("invalid listen address {s:?}: {e}"))
}

/// Parse a duration like "1s", "250ms", "2m" or a bare number of seconds.
fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (num, unit) = s.split_at(split);
    let n: u64 = num
        .parse()
        .map_err(|_| format!("invalid duration {s:?}"))?;

    match unit {
        "" | "s" => Ok(Duration::from_secs(n)),
        "ms" => Ok(Duration::from_millis(n)),
        "m" => n
            .checked_mul(60)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("duration {s:?} is too large")),
        _ => Err(format!("invalid duration unit {unit:?} in {s:?}")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    if !cli.metrics_path.starts_with('/') {
        anyhow::bail!("metrics path must start with '/': {:?}", cli.metrics_path);
    }

    let app = router(&cli.metrics_path, tcp_dial(cli.hdhomerun_timeout));
    let listener = tokio::net::TcpListener::bind(cli.metrics_addr)
        .await
        .with_context(|| format!("failed to listen on {}", cli.metrics_addr))?;

    tracing::info!(
        addr = %cli.metrics_addr,
        path = %cli.metrics_path,
        timeout = ?cli.hdhomerun_timeout,
        "Starting HDHomeRun exporter"
    );

    axum::serve(listener, app)
        .await
        .context("HTTP server failed")?;
    Ok(())
}
