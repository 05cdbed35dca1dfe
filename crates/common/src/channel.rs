//! Async channel bridge between Tokio runtime and USB thread
//!
//! The USB thread owns the libusb context and the hot-plug callbacks. It
//! publishes launchers in the driver registry and tells the runtime about
//! them so device nodes can be created and removed.

use async_channel::{Receiver, Sender, bounded};
use protocol::Minor;

/// Commands from Tokio runtime to USB thread
#[derive(Debug)]
pub enum DriverCommand {
    /// Re-enumerate the bus and bind launchers that were missed
    Rescan,

    /// Detach every bound launcher and stop the USB thread
    Shutdown,
}

/// Events from the USB thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverEvent {
    /// A launcher was attached and published in the registry
    DeviceAttached {
        /// Minor number it was published under
        minor: Minor,
        /// Serial string read at attach
        serial: String,
    },

    /// A launcher was physically removed and unpublished
    DeviceDetached {
        /// Minor number it was published under
        minor: Minor,
    },
}

/// Handle for Tokio runtime (async)
#[derive(Clone)]
pub struct DriverBridge {
    cmd_tx: Sender<DriverCommand>,
    event_rx: Receiver<DriverEvent>,
}

impl DriverBridge {
    /// Send a command to the USB thread
    pub async fn send_command(&self, cmd: DriverCommand) -> crate::Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Receive an event from the USB thread
    pub async fn recv_event(&self) -> crate::Result<DriverEvent> {
        self.event_rx
            .recv()
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }
}

/// Handle for USB thread (blocking)
pub struct DriverWorker {
    cmd_rx: Receiver<DriverCommand>,
    event_tx: Sender<DriverEvent>,
}

impl DriverWorker {
    /// Try to receive a command without blocking
    pub fn try_recv_command(&self) -> Option<DriverCommand> {
        self.cmd_rx.try_recv().ok()
    }

    /// Send an event to Tokio runtime (blocking)
    pub fn send_event(&self, event: DriverEvent) -> crate::Result<()> {
        self.event_tx
            .send_blocking(event)
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }
}

/// Create the channel bridge between Tokio and USB thread
///
/// Returns (DriverBridge for Tokio, DriverWorker for USB thread)
pub fn create_driver_bridge() -> (DriverBridge, DriverWorker) {
    let (cmd_tx, cmd_rx) = bounded(16);
    let (event_tx, event_rx) = bounded(64);

    (
        DriverBridge { cmd_tx, event_rx },
        DriverWorker { cmd_rx, event_tx },
    )
}
