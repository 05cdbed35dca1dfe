//! libusb transport
//!
//! Binds interface 0 of a launcher through `rusb` and implements
//! [`Transport`] on top of it.
//!
//! libusb's synchronous API is used throughout. Asynchronous requests are
//! queued and serviced by one worker thread per device: control requests are
//! written as soon as they are picked up, the interrupt request is polled in
//! short timeout slices so that new work and cancellations are noticed
//! quickly. Completion handlers therefore run on the worker thread, or on the
//! cancelling thread for a request that is cancelled while queued.

use crate::error::TransportError;
use crate::usb::transport::{
    EndpointDescriptor, Transport, USB_ENDPOINT_XFER_BULK, USB_ENDPOINT_XFER_CONTROL,
    USB_ENDPOINT_XFER_INT, USB_ENDPOINT_XFER_ISOC,
};
use crate::usb::urb::{Urb, UrbKind};
use parking_lot::{Condvar, Mutex};
use protocol::{COMMAND_TIMEOUT, ControlSetup};
use rusb::{Context, Device, DeviceHandle, TransferType};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// The launcher exposes a single interface
const INTERFACE: u8 = 0;

/// Map rusb errors to transport errors
pub fn map_rusb_error(err: rusb::Error) -> TransportError {
    match err {
        rusb::Error::Timeout => TransportError::Timeout,
        rusb::Error::Pipe => TransportError::Pipe,
        rusb::Error::NoDevice => TransportError::NoDevice,
        rusb::Error::NotFound => TransportError::NotFound,
        rusb::Error::Busy => TransportError::Busy,
        rusb::Error::Overflow => TransportError::Overflow,
        rusb::Error::Io => TransportError::Io,
        rusb::Error::InvalidParam => TransportError::InvalidParam,
        rusb::Error::Access => TransportError::Access,
        rusb::Error::Interrupted => TransportError::Canceled,
        _ => TransportError::Other(err.to_string()),
    }
}

fn transfer_type_bits(transfer_type: TransferType) -> u8 {
    match transfer_type {
        TransferType::Control => USB_ENDPOINT_XFER_CONTROL,
        TransferType::Isochronous => USB_ENDPOINT_XFER_ISOC,
        TransferType::Bulk => USB_ENDPOINT_XFER_BULK,
        TransferType::Interrupt => USB_ENDPOINT_XFER_INT,
    }
}

#[derive(Default)]
struct WorkQueue {
    pending: Vec<Arc<Urb>>,
    /// Device vanished; new submissions fail
    gone: bool,
    shutdown: bool,
}

impl WorkQueue {
    /// Remove `urb` if it is still queued
    fn take(&mut self, urb: &Urb) -> Option<Arc<Urb>> {
        let pos = self
            .pending
            .iter()
            .position(|p| std::ptr::eq(Arc::as_ptr(p), urb))?;
        Some(self.pending.remove(pos))
    }
}

enum Work {
    Control(Arc<Urb>, ControlSetup),
    Poll(Arc<Urb>, u8),
}

struct Inner {
    handle: DeviceHandle<Context>,
    queue: Mutex<WorkQueue>,
    wake: Condvar,
    poll_slice: Duration,
}

impl Inner {
    /// Give every queued request back with [`TransportError::Shutdown`]
    fn drain(&self, gone: bool) {
        let pending = {
            let mut queue = self.queue.lock();
            queue.gone |= gone;
            std::mem::take(&mut queue.pending)
        };
        for urb in pending {
            urb.give_back(Err(TransportError::Shutdown));
        }
    }

    fn next_work(&self) -> Option<Work> {
        let mut queue = self.queue.lock();
        loop {
            if queue.shutdown {
                return None;
            }

            let control = queue.pending.iter().position(|urb| matches!(urb.kind(), UrbKind::Control { .. }));
            if let Some(pos) = control {
                let urb = queue.pending.remove(pos);
                if let UrbKind::Control { setup } = urb.kind() {
                    return Some(Work::Control(urb, setup));
                }
            }

            let poll = queue.pending.iter().find_map(|urb| match urb.kind() {
                UrbKind::Interrupt { endpoint, .. } => Some(Work::Poll(Arc::clone(urb), endpoint)),
                UrbKind::Control { .. } => None,
            });
            if poll.is_some() {
                return poll;
            }

            self.wake.wait(&mut queue);
        }
    }

    fn run(&self) {
        debug!("transfer worker started");

        while let Some(work) = self.next_work() {
            match work {
                Work::Control(urb, setup) => self.control(urb, setup),
                Work::Poll(urb, endpoint) => self.poll(urb, endpoint),
            }
        }

        debug!("transfer worker stopped");
    }

    fn control(&self, urb: Arc<Urb>, setup: ControlSetup) {
        let data = urb.transfer_buffer().clone();
        let result = self
            .handle
            .write_control(
                setup.request_type,
                setup.request,
                setup.value,
                setup.index,
                &data,
                COMMAND_TIMEOUT,
            )
            .map_err(map_rusb_error);

        let gone = result == Err(TransportError::NoDevice);
        urb.give_back(result);
        if gone {
            self.drain(true);
        }
    }

    fn poll(&self, urb: Arc<Urb>, endpoint: u8) {
        let mut data = vec![0u8; urb.buffer_len()];

        match self.handle.read_interrupt(endpoint, &mut data, self.poll_slice) {
            Err(rusb::Error::Timeout) => {}
            Err(rusb::Error::NoDevice) => {
                warn!("device vanished while polling endpoint {:#04x}", endpoint);
                self.drain(true);
            }
            result => {
                // Cancelled while on the wire: the canceller already gave it back.
                let Some(urb) = self.queue.lock().take(&urb) else {
                    return;
                };
                let result = result.map_err(map_rusb_error).map(|len| {
                    let mut buffer = urb.transfer_buffer();
                    let len = len.min(buffer.len());
                    buffer[..len].copy_from_slice(&data[..len]);
                    len
                });
                trace!("interrupt in {:#04x}: {:?}", endpoint, result);
                urb.give_back(result);
            }
        }
    }
}

/// [`Transport`] over an open libusb device handle
pub struct RusbTransport {
    inner: Arc<Inner>,
    endpoints: Vec<EndpointDescriptor>,
    serial_index: Option<u8>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl RusbTransport {
    /// Open `device`, claim its interface and start the transfer worker.
    ///
    /// `poll_slice` bounds how long the worker waits on the interrupt
    /// endpoint before looking for new work.
    pub fn open(device: Device<Context>, poll_slice: Duration) -> Result<Arc<Self>, TransportError> {
        let mut handle = device.open().map_err(map_rusb_error)?;

        match handle.kernel_driver_active(INTERFACE) {
            Ok(true) => {
                handle
                    .detach_kernel_driver(INTERFACE)
                    .map_err(map_rusb_error)?;
                debug!("detached kernel driver from interface {}", INTERFACE);
            }
            Ok(false) | Err(rusb::Error::NotSupported) => {}
            Err(e) => warn!("could not query kernel driver state: {}", e),
        }

        handle.claim_interface(INTERFACE).map_err(map_rusb_error)?;

        let config = device.active_config_descriptor().map_err(map_rusb_error)?;
        let endpoints = config
            .interfaces()
            .find(|interface| interface.number() == INTERFACE)
            .and_then(|interface| interface.descriptors().next())
            .map(|desc| {
                desc.endpoint_descriptors()
                    .map(|ep| EndpointDescriptor {
                        address: ep.address(),
                        attributes: transfer_type_bits(ep.transfer_type()),
                        max_packet_size: ep.max_packet_size(),
                        interval: ep.interval(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let serial_index = device
            .device_descriptor()
            .ok()
            .and_then(|desc| desc.serial_number_string_index());

        let inner = Arc::new(Inner {
            handle,
            queue: Mutex::new(WorkQueue::default()),
            wake: Condvar::new(),
            poll_slice,
        });

        let worker_inner = Arc::clone(&inner);
        let worker = std::thread::Builder::new()
            .name(format!("launcher-usb-{}-{}", device.bus_number(), device.address()))
            .spawn(move || worker_inner.run())
            .map_err(|e| TransportError::Other(format!("failed to spawn transfer worker: {}", e)))?;

        info!(
            "opened launcher at bus {} address {}",
            device.bus_number(),
            device.address()
        );

        Ok(Arc::new(Self {
            inner,
            endpoints,
            serial_index,
            worker: Mutex::new(Some(worker)),
        }))
    }

    /// Stop the worker and give back everything still queued.
    ///
    /// Later submissions fail with [`TransportError::NoDevice`].
    pub fn shutdown(&self) {
        {
            let mut queue = self.inner.queue.lock();
            queue.shutdown = true;
            queue.gone = true;
        }
        self.inner.wake.notify_all();

        if let Some(worker) = self.worker.lock().take() {
            // The last reference can go away inside a completion handler.
            if worker.thread().id() == std::thread::current().id() {
                debug!("transfer worker shutting itself down");
            } else if worker.join().is_err() {
                error!("transfer worker panicked");
            }
        }

        self.inner.drain(true);
    }
}

impl Drop for RusbTransport {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Transport for RusbTransport {
    fn endpoints(&self) -> Vec<EndpointDescriptor> {
        self.endpoints.clone()
    }

    fn serial_number(&self) -> Result<String, TransportError> {
        let index = self.serial_index.ok_or(TransportError::NotFound)?;
        self.inner
            .handle
            .read_string_descriptor_ascii(index)
            .map_err(map_rusb_error)
    }

    fn control_msg(
        &self,
        setup: ControlSetup,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        self.inner
            .handle
            .write_control(
                setup.request_type,
                setup.request,
                setup.value,
                setup.index,
                data,
                timeout,
            )
            .map_err(map_rusb_error)
    }

    fn submit(&self, urb: Arc<Urb>) -> Result<(), TransportError> {
        {
            let mut queue = self.inner.queue.lock();
            if queue.gone || queue.shutdown {
                return Err(TransportError::NoDevice);
            }
            queue.pending.push(urb);
        }
        self.inner.wake.notify_one();
        Ok(())
    }

    fn cancel(&self, urb: &Urb) {
        let cancelled = self.inner.queue.lock().take(urb);
        if let Some(urb) = cancelled {
            urb.give_back(Err(TransportError::Canceled));
        }
    }
}
