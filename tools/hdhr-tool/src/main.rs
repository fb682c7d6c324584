// hdhr-tool -- command-line access to HDHomeRun devices.
//
// Usage:
//   hdhr-tool discover
//   hdhr-tool discover --wait 5 --device-type storage
//   hdhr-tool --host 192.168.1.20 model
//   hdhr-tool --host 192.168.1.20 query /sys/hwmodel
//   hdhr-tool --host 192.168.1.20 set /tuner0/channel auto:33
//   hdhr-tool --host 192.168.1.20 tuners
//   hdhr-tool --host 192.168.1.20 debug 1

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use hdhr::{
    Client, ClientBuilder, DeviceId, DeviceType, DiscovererBuilder, TunerDebug, nul_str,
    parse_device_id,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line tool for HDHomeRun devices.
#[derive(Parser)]
#[command(name = "hdhr-tool", version, about)]
struct Cli {
    /// Device address: host or IP, optionally with a port (default 65001).
    #[arg(long, env = "HDHR_HOST")]
    host: Option<String>,

    /// Per-request timeout in seconds. Zero disables it.
    #[arg(long, default_value_t = 2.0)]
    timeout: f64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Find devices on the local network.
    Discover {
        /// Seconds to wait for replies.
        #[arg(long, default_value_t = 3)]
        wait: u64,

        /// Device type to ask for: tuner, storage, wildcard or a number.
        #[arg(long, default_value = "wildcard")]
        device_type: DeviceType,

        /// Device id to ask for, as 8 hex digits.
        #[arg(long, value_parser = parse_id)]
        id: Option<DeviceId>,

        /// Send the request to this address instead of broadcasting.
        #[arg(long)]
        target: Option<SocketAddr>,
    },

    /// Print the device model.
    Model,

    /// Read a device variable.
    Query {
        /// Variable name, e.g. /sys/model.
        name: String,
    },

    /// Write a device variable.
    Set {
        /// Variable name, e.g. /tuner0/channel.
        name: String,
        /// New value.
        value: String,
    },

    /// List tuners with their current status.
    Tuners,

    /// Print the full status of one tuner.
    Debug {
        /// Tuner index.
        index: usize,
    },
}

fn parse_id(s: &str) -> std::result::Result<DeviceId, String> {
    parse_device_id(s).map_err(|e| e.to_string())
}

fn timeout(cli: &Cli) -> Result<Duration> {
    Duration::try_from_secs_f64(cli.timeout)
        .map_err(|e| anyhow::anyhow!("invalid --timeout {}: {e}", cli.timeout))
}

async fn connect(cli: &Cli) -> Result<Client> {
    let Some(host) = cli.host.as_deref() else {
        bail!("--host is required for this command (or set HDHR_HOST)");
    };
    ClientBuilder::new()
        .host(host)
        .timeout(timeout(cli)?)
        .build()
        .await
        .with_context(|| format!("failed to connect to {host}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    if let Command::Discover {
        wait,
        device_type,
        id,
        target,
    } = &cli.command
    {
        return cmd_discover(Duration::from_secs(*wait), *device_type, *id, *target).await;
    }

    let client = connect(&cli).await?;
    let result = match &cli.command {
        Command::Discover { .. } => Ok(()),
        Command::Model => cmd_model(&client).await,
        Command::Query { name } => cmd_query(&client, name).await,
        Command::Set { name, value } => cmd_set(&client, name, value).await,
        Command::Tuners => cmd_tuners(&client).await,
        Command::Debug { index } => cmd_debug(&client, *index).await,
    };
    client.close().await.ok();
    result
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn cmd_discover(
    wait: Duration,
    device_type: DeviceType,
    id: Option<DeviceId>,
    target: Option<SocketAddr>,
) -> Result<()> {
    let mut builder = DiscovererBuilder::new().device_type(device_type);
    if let Some(id) = id {
        builder = builder.device_id(id);
    }
    if let Some(target) = target {
        builder = builder.target(target);
    }
    let mut discoverer = builder.build().await.context("discovery failed")?;

    let cancel = CancellationToken::new();
    let timer = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            cancel.cancel();
        })
    };

    println!("{:<10}  {:<8}  {:<6}  {:<22}  URL", "ID", "Type", "Tuners", "Address");
    let mut found = 0;
    while let Some(device) = discoverer.discover(&cancel).await? {
        found += 1;
        println!(
            "{:<10}  {:<8}  {:<6}  {:<22}  {}",
            device.id.to_string(),
            device.device_type.to_string(),
            device.tuners,
            device.addr.to_string(),
            device.url.as_ref().map(|u| u.as_str()).unwrap_or("-"),
        );
    }
    timer.abort();

    println!();
    println!("{found} device(s) found.");
    Ok(())
}

async fn cmd_model(client: &Client) -> Result<()> {
    println!("{}", client.model().await?);
    Ok(())
}

async fn cmd_query(client: &Client, name: &str) -> Result<()> {
    let value = client.query(name).await?;
    println!("{}", nul_str(&value));
    Ok(())
}

async fn cmd_set(client: &Client, name: &str, value: &str) -> Result<()> {
    let value = client.set(name, value).await?;
    println!("{}", nul_str(&value));
    Ok(())
}

async fn cmd_tuners(client: &Client) -> Result<()> {
    println!(
        "{:<5}  {:<14}  {:<16}  {:>4}  {:>4}  {:>4}",
        "Tuner", "Channel", "Lock", "SS", "SNQ", "SEQ"
    );
    client
        .for_each_tuner(|tuner| async move {
            let debug = tuner.debug().await?;
            match &debug.tuner {
                Some(t) => println!(
                    "{:<5}  {:<14}  {:<16}  {:>3}%  {:>3}%  {:>3}%",
                    tuner.index(),
                    t.channel,
                    t.lock,
                    t.signal_strength,
                    t.signal_to_noise_quality,
                    t.symbol_error_quality
                ),
                None => println!("{:<5}  (no tuner status)", tuner.index()),
            }
            Ok(())
        })
        .await?;
    Ok(())
}

async fn cmd_debug(client: &Client, index: usize) -> Result<()> {
    let debug = client.tuner(index).debug().await?;
    print_debug(index, &debug);
    Ok(())
}

fn print_debug(index: usize, debug: &TunerDebug) {
    println!("Tuner {index}");
    if let Some(t) = &debug.tuner {
        println!("  channel:          {}", t.channel);
        println!("  lock:             {}", t.lock);
        println!("  signal strength:  {}%", t.signal_strength);
        println!("  signal quality:   {}%", t.signal_to_noise_quality);
        println!("  symbol quality:   {}%", t.symbol_error_quality);
    }
    if let Some(d) = &debug.device {
        println!("  device:           {} bps, {} resync, {} overflow", d.bits_per_second, d.resync, d.overflow);
    }
    if let Some(c) = &debug.cablecard {
        println!("  cablecard:        {} bps, {} resync, {} overflow", c.bits_per_second, c.resync, c.overflow);
    }
    if let Some(ts) = &debug.transport_stream {
        println!(
            "  transport stream: {} bps, {} transport errors, {} crc errors",
            ts.bits_per_second, ts.transport_errors, ts.crc_errors
        );
    }
    if let Some(n) = &debug.network {
        println!("  network:          {} pps, {} errors, stop: {}", n.packets_per_second, n.errors, n.stop);
    }
}
