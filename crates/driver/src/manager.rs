//! Launcher enumeration and hot-plug binding
//!
//! Runs on a dedicated USB thread that owns the libusb context. Matching
//! devices are opened, attached to the [`Registry`] and announced to the
//! Tokio runtime; removed devices are detached and their transport shut
//! down.

use crate::config::UsbSettings;
use crate::launcher::Registry;
use crate::usb::RusbTransport;
use common::{DriverCommand, DriverEvent, DriverWorker};
use protocol::Minor;
use rusb::{Context, Device, Hotplug, HotplugBuilder, Registration, UsbContext};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// How long one `handle_events` call may block
const EVENT_SLICE: Duration = Duration::from_millis(100);

/// Matching launcher found on the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LauncherInfo {
    pub bus: u8,
    pub address: u8,
    pub vendor_id: u16,
    pub product_id: u16,
}

impl std::fmt::Display for LauncherInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "bus {:03} address {:03}: {:04x}:{:04x}",
            self.bus, self.address, self.vendor_id, self.product_id
        )
    }
}

enum HotplugEvent {
    Arrived(Device<Context>),
    Left(u8, u8),
}

/// Forwards libusb hot-plug notifications to the manager loop
struct HotplugCallback {
    tx: async_channel::Sender<HotplugEvent>,
}

impl Hotplug<Context> for HotplugCallback {
    fn device_arrived(&mut self, device: Device<Context>) {
        debug!(
            "Hot-plug callback: device arrived (bus={}, addr={})",
            device.bus_number(),
            device.address()
        );
        if self.tx.try_send(HotplugEvent::Arrived(device)).is_err() {
            warn!("Hot-plug queue closed, arrival dropped");
        }
    }

    fn device_left(&mut self, device: Device<Context>) {
        debug!(
            "Hot-plug callback: device left (bus={}, addr={})",
            device.bus_number(),
            device.address()
        );
        if self
            .tx
            .try_send(HotplugEvent::Left(device.bus_number(), device.address()))
            .is_err()
        {
            warn!("Hot-plug queue closed, removal dropped");
        }
    }
}

/// True if `(vendor_id, product_id)` is the launcher being bound
pub fn matches_ids(vendor_id: u16, product_id: u16, wanted: (u16, u16)) -> bool {
    (vendor_id, product_id) == wanted
}

/// Launchers currently on the bus
pub fn list_launchers(ids: (u16, u16)) -> Result<Vec<LauncherInfo>, rusb::Error> {
    let context = Context::new()?;
    let mut found = Vec::new();

    for device in context.devices()?.iter() {
        let Ok(desc) = device.device_descriptor() else {
            continue;
        };
        if matches_ids(desc.vendor_id(), desc.product_id(), ids) {
            found.push(LauncherInfo {
                bus: device.bus_number(),
                address: device.address(),
                vendor_id: desc.vendor_id(),
                product_id: desc.product_id(),
            });
        }
    }

    Ok(found)
}

/// Binds launchers on the bus to the registry
pub struct DeviceManager {
    context: Context,
    registry: Arc<Registry>,
    ids: (u16, u16),
    poll_slice: Duration,
    /// (bus, address) -> published launcher
    bound: HashMap<(u8, u8), (Minor, Arc<RusbTransport>)>,
    hotplug_tx: async_channel::Sender<HotplugEvent>,
    hotplug_rx: async_channel::Receiver<HotplugEvent>,
    _hotplug_registration: Option<Registration<Context>>,
    worker: DriverWorker,
}

impl DeviceManager {
    pub fn new(
        registry: Arc<Registry>,
        settings: &UsbSettings,
        worker: DriverWorker,
    ) -> anyhow::Result<Self> {
        let context = Context::new()?;
        let (hotplug_tx, hotplug_rx) = async_channel::unbounded();

        Ok(Self {
            context,
            registry,
            ids: settings.device_ids()?,
            poll_slice: settings.poll_timeout(),
            bound: HashMap::new(),
            hotplug_tx,
            hotplug_rx,
            _hotplug_registration: None,
            worker,
        })
    }

    /// Bind launchers already present and register hot-plug callbacks
    pub fn initialize(&mut self) -> Result<(), rusb::Error> {
        self.rescan()?;

        if rusb::has_hotplug() {
            let registration = HotplugBuilder::new()
                .vendor_id(self.ids.0)
                .product_id(self.ids.1)
                .enumerate(false)
                .register(
                    &self.context,
                    Box::new(HotplugCallback {
                        tx: self.hotplug_tx.clone(),
                    }),
                )?;
            self._hotplug_registration = Some(registration);
            debug!("Hot-plug callbacks registered");
        } else {
            warn!("libusb has no hot-plug support, new launchers need a rescan");
        }

        info!("Device manager initialized with {} launcher(s)", self.registry.len());
        Ok(())
    }

    /// Run the USB event loop until a Shutdown command arrives
    pub fn run(mut self) -> Result<(), rusb::Error> {
        info!("USB thread started");

        loop {
            match self.worker.try_recv_command() {
                Some(DriverCommand::Shutdown) => {
                    info!("USB thread shutting down");
                    break;
                }
                Some(DriverCommand::Rescan) => {
                    if let Err(e) = self.rescan() {
                        warn!("Rescan failed: {}", e);
                    }
                }
                None => {}
            }

            match self.context.handle_events(Some(EVENT_SLICE)) {
                Ok(()) => {}
                Err(rusb::Error::Interrupted) => {
                    debug!("USB event handling interrupted");
                }
                Err(e) => {
                    warn!("Error handling USB events: {}", e);
                    std::thread::sleep(EVENT_SLICE);
                }
            }

            while let Ok(event) = self.hotplug_rx.try_recv() {
                match event {
                    HotplugEvent::Arrived(device) => self.bind(device),
                    HotplugEvent::Left(bus, address) => self.unbind((bus, address)),
                }
            }
        }

        let keys: Vec<_> = self.bound.keys().copied().collect();
        for key in keys {
            self.unbind(key);
        }
        if !self.registry.is_empty() {
            warn!("{} launcher(s) still registered at shutdown", self.registry.len());
        }

        info!("USB thread stopped");
        Ok(())
    }

    /// Bind new launchers and unbind the ones that disappeared
    pub fn rescan(&mut self) -> Result<(), rusb::Error> {
        let mut present = Vec::new();

        for device in self.context.devices()?.iter() {
            if !self.is_launcher(&device) {
                continue;
            }
            present.push((device.bus_number(), device.address()));
            self.bind(device);
        }

        let gone: Vec<_> = self
            .bound
            .keys()
            .filter(|key| !present.contains(key))
            .copied()
            .collect();
        for key in gone {
            self.unbind(key);
        }

        debug!("Rescan found {} launcher(s)", present.len());
        Ok(())
    }

    fn is_launcher(&self, device: &Device<Context>) -> bool {
        device
            .device_descriptor()
            .map(|desc| matches_ids(desc.vendor_id(), desc.product_id(), self.ids))
            .unwrap_or(false)
    }

    fn bind(&mut self, device: Device<Context>) {
        let key = (device.bus_number(), device.address());
        if self.bound.contains_key(&key) || !self.is_launcher(&device) {
            return;
        }

        let transport = match RusbTransport::open(device, self.poll_slice) {
            Ok(transport) => transport,
            Err(e) => {
                warn!("Failed to open launcher at bus {} address {}: {}", key.0, key.1, e);
                return;
            }
        };

        let minor = match self.registry.attach(transport.clone()) {
            Ok(minor) => minor,
            Err(e) => {
                error!("Failed to attach launcher at bus {} address {}: {}", key.0, key.1, e);
                transport.shutdown();
                return;
            }
        };

        let serial = self
            .registry
            .get(minor)
            .map(|device| device.serial().to_string())
            .unwrap_or_default();
        self.bound.insert(key, (minor, transport));

        if let Err(e) = self
            .worker
            .send_event(DriverEvent::DeviceAttached { minor, serial })
        {
            error!("Failed to send DeviceAttached event: {}", e);
        }
    }

    fn unbind(&mut self, key: (u8, u8)) {
        let Some((minor, transport)) = self.bound.remove(&key) else {
            return;
        };

        if let Err(e) = self.registry.detach(minor) {
            warn!("Detaching launcher{} failed: {}", minor, e);
        }
        transport.shutdown();

        if let Err(e) = self.worker.send_event(DriverEvent::DeviceDetached { minor }) {
            error!("Failed to send DeviceDetached event: {}", e);
        }
    }
}

/// Spawn the USB thread
pub fn spawn_usb_thread(
    registry: Arc<Registry>,
    settings: UsbSettings,
    worker: DriverWorker,
) -> std::io::Result<std::thread::JoinHandle<anyhow::Result<()>>> {
    std::thread::Builder::new()
        .name("usb".to_string())
        .spawn(move || {
            let mut manager = DeviceManager::new(registry, &settings, worker)?;
            manager.initialize()?;
            manager.run()?;
            Ok(())
        })
}
