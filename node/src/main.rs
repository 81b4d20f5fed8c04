mod config;
mod version;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::NodeConfig;
use crate::version::{git_commit_hash, TOXBRIDGE_VERSION};
use toxbridge_transport::{encode, PacketEnvelope, TransportBridge};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("toxbridge-node")
        .version(TOXBRIDGE_VERSION)
        .about("Hosts the toxbridge transport on real UDP sockets")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level (overrides config)"),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("Log format: pretty or compact"),
        )
        .arg(
            Arg::new("echo")
                .long("echo")
                .action(ArgAction::SetTrue)
                .help("Reflect inbound datagrams back to their sender"),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config").map(PathBuf::from);
    let mut config =
        NodeConfig::load(config_path.as_deref()).context("failed to load configuration")?;
    if let Some(level) = matches.get_one::<String>("log-level") {
        config.log_level = level.clone();
    }
    if let Some(format) = matches.get_one::<String>("log-format") {
        config.log_format = format.clone();
    }
    if matches.get_flag("echo") {
        config.echo = true;
    }

    init_logging(&config)?;
    info!(
        "Starting toxbridge node {} ({})",
        TOXBRIDGE_VERSION,
        git_commit_hash()
    );

    let (bridge, packets) = TransportBridge::new(config.transport.clone());
    for spec in &config.sockets {
        let socket = bridge
            .open_socket(spec.family, spec.port)
            .await
            .with_context(|| {
                format!("failed to open {} socket on port {}", spec.family, spec.port)
            })?;
        let local = bridge.registry().local_addr(socket)?;
        info!(%socket, %local, "virtual socket ready");
    }

    serve(&bridge, packets, &config).await;

    info!("Shutting down toxbridge node");
    bridge.shutdown().await;
    let stats = bridge.stats();
    info!(
        inbound = stats.inbound_packets,
        outbound = stats.outbound_packets,
        dropped = stats.outbound_dropped,
        "toxbridge node shutdown complete"
    );
    Ok(())
}

async fn serve(
    bridge: &TransportBridge,
    mut packets: UnboundedReceiver<PacketEnvelope>,
    config: &NodeConfig,
) {
    let period = Duration::from_secs(config.stats_interval_secs.max(1));
    let mut stats_tick = tokio::time::interval(period);
    stats_tick.tick().await;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            packet = packets.recv() => {
                let Some(packet) = packet else {
                    warn!("Packet channel closed");
                    break;
                };
                debug!(
                    socket = %packet.socket,
                    from = %packet.endpoint,
                    len = packet.payload.len(),
                    "datagram"
                );
                if config.echo {
                    let packed = encode(&packet.endpoint);
                    bridge.send(packet.socket, packed.as_bytes(), &packet.payload).await;
                }
            }
            _ = stats_tick.tick(), if config.stats_interval_secs > 0 => {
                let stats = bridge.stats();
                info!(
                    sockets = bridge.registry().len(),
                    inbound = stats.inbound_packets,
                    outbound = stats.outbound_packets,
                    dropped = stats.outbound_dropped,
                    "transport stats"
                );
            }
            result = &mut shutdown => {
                if let Err(err) = result {
                    warn!("Failed to listen for shutdown signal: {}", err);
                }
                break;
            }
        }
    }
}

fn init_logging(config: &NodeConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    if config.log_format == "pretty" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().compact())
            .init();
    }

    Ok(())
}
