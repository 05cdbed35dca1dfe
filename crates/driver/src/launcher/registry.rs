//! Published launcher instances
//!
//! The table mutex is the disconnect lock: attach, detach and the lookup
//! step of open all run under it, so an instance cannot be unpublished while
//! it is being opened.

use crate::error::DriverError;
use crate::launcher::device::LauncherDevice;
use crate::usb::transport::{EndpointDescriptor, Transport};
use parking_lot::Mutex;
use protocol::{FRAME_SIZE, Minor};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info};

#[derive(Default)]
struct RegistryTable {
    devices: BTreeMap<Minor, Arc<LauncherDevice>>,
}

impl RegistryTable {
    /// Lowest minor not in use
    fn free_minor(&self) -> Minor {
        let mut next = 0;
        for minor in self.devices.keys() {
            if minor.0 != next {
                break;
            }
            next += 1;
        }
        Minor(next)
    }
}

/// Repository of attached launchers, keyed by minor
#[derive(Default)]
pub struct Registry {
    table: Mutex<RegistryTable>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a newly attached launcher and publish it under a fresh minor.
    ///
    /// Nothing is published if any step fails.
    pub fn attach(&self, transport: Arc<dyn Transport>) -> Result<Minor, DriverError> {
        let mut table = self.table.lock();

        let endpoint = find_status_endpoint(&transport.endpoints()).ok_or_else(|| {
            error!("could not find interrupt in endpoint");
            DriverError::NoEndpoint
        })?;
        debug!(
            "status endpoint {:#04x}, {} bytes, interval {}",
            endpoint.address, endpoint.max_packet_size, endpoint.interval
        );

        let status_buffer = alloc_buffer(usize::from(endpoint.max_packet_size))?;
        let ctrl_buffer = alloc_buffer(FRAME_SIZE)?;

        let serial = transport.serial_number().map_err(|e| {
            error!("could not retrieve serial number: {}", e);
            DriverError::Serial(e)
        })?;

        let minor = table.free_minor();
        let device = LauncherDevice::new(
            minor,
            serial,
            endpoint,
            transport,
            status_buffer,
            ctrl_buffer,
        );
        table.devices.insert(minor, device);

        info!("launcher now attached to launcher{}", minor);
        Ok(minor)
    }

    /// Unpublish a launcher that was physically removed
    pub fn detach(&self, minor: Minor) -> Result<(), DriverError> {
        let mut table = self.table.lock();
        let device = table.devices.remove(&minor).ok_or(DriverError::NoDevice)?;

        device.disconnect();

        info!("launcher{} now disconnected", minor);
        Ok(())
    }

    pub fn get(&self, minor: Minor) -> Option<Arc<LauncherDevice>> {
        self.table.lock().devices.get(&minor).cloned()
    }

    pub fn len(&self) -> usize {
        self.table.lock().devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.lock().devices.is_empty()
    }

    /// Run `f` on the published instance while holding the disconnect lock
    pub(crate) fn with_device<R>(
        &self,
        minor: Minor,
        f: impl FnOnce(&Arc<LauncherDevice>) -> Result<R, DriverError>,
    ) -> Result<R, DriverError> {
        let table = self.table.lock();
        let device = table.devices.get(&minor).ok_or_else(|| {
            error!("can't find device for minor {}", minor);
            DriverError::NoDevice
        })?;
        f(device)
    }
}

/// First interrupt IN endpoint that can carry a report
fn find_status_endpoint(endpoints: &[EndpointDescriptor]) -> Option<EndpointDescriptor> {
    endpoints
        .iter()
        .find(|ep| ep.is_interrupt_in() && ep.max_packet_size > 0)
        .copied()
}

fn alloc_buffer(len: usize) -> Result<Vec<u8>, DriverError> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|_| DriverError::NoMemory)?;
    buffer.resize(len, 0);
    Ok(buffer)
}
