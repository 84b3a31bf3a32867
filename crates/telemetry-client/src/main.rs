//! Telemetry relay client entry point.
//!
//! Connects to a telemetry server, keeps the latest value of every received
//! field, and logs each update.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ TelemetryConnection::start() -- TCP reconnect loop
//!  └─ event loop
//!       ├─ Connected    -> log
//!       ├─ Sample       -> TelemetryTracker::apply, log merged state
//!       └─ Disconnected -> log; the connection reconnects on its own
//! ```

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use telemetry_core::MessageType;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use telemetry_client::infrastructure::network::{
    ClientConnectionConfig, NetworkEvent, TelemetryConnection,
};
use telemetry_client::TelemetryTracker;

#[derive(Debug, Parser)]
#[command(name = "telemetry-client", version, about = "Receive telemetry from a relay server")]
struct Cli {
    /// Server address as `host:port`.
    #[arg(long, env = "TELEMETRY_SERVER_ADDR", default_value = "127.0.0.1:9000")]
    server: SocketAddr,

    /// Seconds to wait before reconnecting after a lost connection.
    #[arg(long, env = "TELEMETRY_RECONNECT_SECS", default_value_t = 5)]
    reconnect_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("telemetry client starting");

    let running = Arc::new(AtomicBool::new(true));
    let connection = Arc::new(TelemetryConnection::new(ClientConnectionConfig {
        server_addr: cli.server,
        reconnect_interval: Duration::from_secs(cli.reconnect_secs),
        ..ClientConnectionConfig::default()
    }));
    let mut events = connection.start(Arc::clone(&running));
    let mut tracker = TelemetryTracker::new();

    loop {
        let event = tokio::select! {
            event = events.recv() => event,
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!("Ctrl-C handler failed: {e}");
                }
                info!("shutdown signal received");
                break;
            }
        };
        let Some(event) = event else { break };

        match event {
            NetworkEvent::Connected { server_addr } => info!("connected to {server_addr}"),
            NetworkEvent::Disconnected => warn!("disconnected; reconnect in progress"),
            NetworkEvent::Sample(sample) => match tracker.apply(sample) {
                MessageType::Gps => {
                    if let Some(fix) = tracker.gps() {
                        info!(
                            time = fix.time.as_deref().unwrap_or("-"),
                            lat = ?fix.lat,
                            lon = ?fix.lon,
                            alt = ?fix.alt,
                            speed = ?fix.speed,
                            climb = ?fix.climb,
                            epx = ?fix.epx,
                            epy = ?fix.epy,
                            epv = ?fix.epv,
                            "gps"
                        );
                    }
                }
                MessageType::Orientation => {
                    if let Some(o) = tracker.orientation() {
                        info!(roll = o.roll, pitch = o.pitch, yaw = o.yaw, "orientation");
                    }
                }
            },
        }
    }

    running.store(false, Ordering::Relaxed);
    info!(
        "telemetry client stopped ({} gps, {} orientation updates)",
        tracker.updates(MessageType::Gps),
        tracker.updates(MessageType::Orientation)
    );
    Ok(())
}
