//! launcher-driver
//!
//! Binds Dream Cheeky USB launchers and exposes each one as a socket node
//! that accepts single command bytes.

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use common::{DriverBridge, DriverCommand, DriverEvent, create_driver_bridge, setup_logging};
use driver::config::DriverConfig;
use driver::manager::{list_launchers, spawn_usb_thread};
use driver::node::NodeServer;
use driver::Registry;
use std::sync::Arc;
use tokio::signal;
use tokio::signal::unix::{SignalKind, signal as unix_signal};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "launcher-driver")]
#[command(author, version, about = "Dream Cheeky USB launcher driver")]
#[command(long_about = "
Binds Dream Cheeky USB launchers and exposes each one as a Unix socket node.
Every byte written to a node is sent to the launcher as one command.

EXAMPLES:
    # Run with default config
    launcher-driver

    # List attached launchers and exit
    launcher-driver --list-devices

    # Run with debug logging
    launcher-driver --log-level debug

CONFIGURATION:
    The driver looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/launcher/driver.toml
    3. /etc/launcher/driver.toml
    4. Built-in defaults

SIGHUP triggers a rescan of the bus.
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<std::path::PathBuf>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// List attached launchers and exit
    #[arg(long)]
    list_devices: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.save_config {
        let config = DriverConfig::default();
        let path = DriverConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let config = if let Some(ref path) = args.config {
        DriverConfig::load(Some(path.clone())).context("Failed to load configuration")?
    } else {
        DriverConfig::load_or_default()
    };

    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.driver.log_level);

    setup_logging(log_level).context("Failed to setup logging")?;

    info!("launcher-driver v{}", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", log_level);

    if args.list_devices {
        return list_devices_mode(&config);
    }

    let registry = Arc::new(Registry::new());
    let (bridge, worker) = create_driver_bridge();
    let usb_handle = spawn_usb_thread(Arc::clone(&registry), config.usb.clone(), worker)
        .context("Failed to spawn USB thread")?;

    let mut nodes = NodeServer::new(Arc::clone(&registry), config.clone());
    let result = run(&bridge, &mut nodes).await;

    info!("Shutting down USB subsystem...");
    nodes.shutdown();
    if let Err(e) = bridge.send_command(DriverCommand::Shutdown).await {
        error!("Error shutting down USB thread: {:#}", e);
    }

    match tokio::task::spawn_blocking(move || usb_handle.join()).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => error!("USB thread failed: {:#}", e),
        Ok(Err(e)) => error!("USB thread panicked: {:?}", e),
        Err(e) => error!("Failed to join USB thread: {}", e),
    }

    result
}

/// Print matching launchers and exit
fn list_devices_mode(config: &DriverConfig) -> Result<()> {
    let ids = config.usb.device_ids()?;
    let launchers = list_launchers(ids).context("Failed to enumerate USB devices")?;

    if launchers.is_empty() {
        println!("No launchers found.");
    } else {
        println!("Found {} launcher(s):\n", launchers.len());
        for launcher in launchers {
            println!("  {}", launcher);
        }
    }
    Ok(())
}

/// Publish nodes as launchers come and go until Ctrl+C
async fn run(bridge: &DriverBridge, nodes: &mut NodeServer) -> Result<()> {
    let mut hangup = unix_signal(SignalKind::hangup()).context("Failed to install SIGHUP handler")?;

    info!("Press Ctrl+C to shutdown");

    loop {
        tokio::select! {
            event = bridge.recv_event() => {
                match event.map_err(|e| anyhow!("USB thread stopped: {}", e))? {
                    DriverEvent::DeviceAttached { minor, serial } => {
                        info!("launcher{} attached (serial {})", minor, serial);
                        if let Err(e) = nodes.publish(minor) {
                            error!("Failed to create node for launcher{}: {}", minor, e);
                        }
                    }
                    DriverEvent::DeviceDetached { minor } => {
                        info!("launcher{} detached", minor);
                        nodes.unpublish(minor);
                    }
                }
            }
            _ = hangup.recv() => {
                info!("Received SIGHUP, rescanning");
                if let Err(e) = bridge.send_command(DriverCommand::Rescan).await {
                    warn!("Failed to request rescan: {}", e);
                }
            }
            result = signal::ctrl_c() => {
                match result {
                    Ok(()) => info!("Received Ctrl+C, shutting down gracefully..."),
                    Err(e) => error!("Error waiting for Ctrl+C: {}", e),
                }
                return Ok(());
            }
        }
    }
}
