//! Telemetry relay server entry point.
//!
//! Loads configuration, binds the listener, starts one reader per configured
//! sensor, and runs until Ctrl-C.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load_config()          -- TOML file or built-in defaults
//!  └─ TelemetryServer::bind  -- fatal if the port is unavailable
//!  └─ build_sensors()        -- one SensorSpec per [[sensors]] entry
//!  └─ start()
//!       ├─ SampleReader threads (one per sensor)
//!       ├─ Broadcaster task
//!       └─ Acceptor task
//!  └─ ctrl_c → shutdown()
//! ```
//!
//! # Command-line overrides (for beginners)
//!
//! Every flag also reads an environment variable, so the server can be
//! configured from a systemd unit or container without a config file:
//!
//! | Flag        | Env var                    |
//! |-------------|----------------------------|
//! | `--config`  | `TELEMETRY_SERVER_CONFIG`  |
//! | `--bind`    | `TELEMETRY_SERVER_BIND`    |
//! | `--port`    | `TELEMETRY_SERVER_PORT`    |
//!
//! Flags win over the config file, which wins over built-in defaults.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use telemetry_server::infrastructure::network::TelemetryServer;
use telemetry_server::infrastructure::sensors::build_sensors;
use telemetry_server::infrastructure::storage::config::load_config;

#[derive(Debug, Parser)]
#[command(name = "telemetry-server", version, about = "Relay sensor telemetry to TCP clients")]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long, env = "TELEMETRY_SERVER_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on, overriding `server.bind_address`.
    #[arg(long, env = "TELEMETRY_SERVER_BIND")]
    bind: Option<String>,

    /// Port to listen on, overriding `server.port`.
    #[arg(long, env = "TELEMETRY_SERVER_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(bind) = cli.bind {
        config.server.bind_address = bind;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    // Level is overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level)),
        )
        .init();

    info!("telemetry server starting");

    let settings = config
        .server
        .to_settings()
        .context("invalid [server] configuration")?;
    let sensors = build_sensors(&config.sensors).context("invalid [[sensors]] configuration")?;

    let server = TelemetryServer::bind(settings).context("failed to open listening socket")?;
    let running = server.start(sensors).context("failed to start server")?;
    info!("listening on {}", running.local_addr());

    tokio::signal::ctrl_c()
        .await
        .context("failed to install Ctrl-C handler")?;
    info!("shutdown signal received");

    running.shutdown().await;
    info!("telemetry server stopped");
    Ok(())
}
