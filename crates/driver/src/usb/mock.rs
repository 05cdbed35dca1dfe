//! In-memory transport for exercising the driver without hardware
//!
//! Requests submitted to a [`MockTransport`] stay pending until the test
//! completes them with [`MockTransport::complete_status`],
//! [`MockTransport::complete_control`] or one of the failure helpers.
//! [`MockTransport::unplug`] gives every pending request back with
//! [`TransportError::Shutdown`], the way a host controller does when the
//! device disappears.
//!
//! # Example
//!
//! ```
//! use driver::usb::mock::MockTransport;
//! use driver::{Interrupt, Registry, Session};
//! use std::sync::Arc;
//!
//! let mock = Arc::new(MockTransport::new());
//! let registry = Registry::new();
//! let minor = registry.attach(mock.clone()).unwrap();
//!
//! let session = Session::open(&registry, minor, Interrupt::new()).unwrap();
//! session.write(&[0x02]).unwrap();
//! assert_eq!(mock.control_frames(), vec![vec![0x02, 0x02, 0, 0, 0, 0, 0, 0]]);
//! ```

use crate::error::TransportError;
use crate::usb::transport::{EndpointDescriptor, Transport, USB_ENDPOINT_XFER_INT};
use crate::usb::urb::{Urb, UrbKind};
use parking_lot::Mutex;
use protocol::ControlSetup;
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct MockState {
    control_frames: Vec<Vec<u8>>,
    submitted_frames: Vec<Vec<u8>>,
    pending: Vec<Arc<Urb>>,
    control_error: Option<TransportError>,
    submit_error: Option<TransportError>,
    status_submissions: usize,
    unplugged: bool,
}

/// Scriptable [`Transport`]
pub struct MockTransport {
    endpoints: Vec<EndpointDescriptor>,
    serial: Result<String, TransportError>,
    state: Mutex<MockState>,
}

impl MockTransport {
    /// Launcher-shaped transport: one 8-byte interrupt IN endpoint
    pub fn new() -> Self {
        Self::with_endpoints(vec![Self::status_endpoint()])
    }

    pub fn with_endpoints(endpoints: Vec<EndpointDescriptor>) -> Self {
        Self {
            endpoints,
            serial: Ok("SN000001".to_string()),
            state: Mutex::new(MockState::default()),
        }
    }

    pub fn with_serial(mut self, serial: Result<String, TransportError>) -> Self {
        self.serial = serial;
        self
    }

    /// Endpoint 0x81, interrupt, 8 bytes, 10 ms
    pub fn status_endpoint() -> EndpointDescriptor {
        EndpointDescriptor {
            address: 0x81,
            attributes: USB_ENDPOINT_XFER_INT,
            max_packet_size: 8,
            interval: 10,
        }
    }

    /// Frames sent through the blocking control path
    pub fn control_frames(&self) -> Vec<Vec<u8>> {
        self.state.lock().control_frames.clone()
    }

    /// Frames submitted as asynchronous control requests
    pub fn submitted_frames(&self) -> Vec<Vec<u8>> {
        self.state.lock().submitted_frames.clone()
    }

    /// Number of accepted status request submissions
    pub fn status_submissions(&self) -> usize {
        self.state.lock().status_submissions
    }

    pub fn pending_status(&self) -> bool {
        self.state
            .lock()
            .pending
            .iter()
            .any(|urb| matches!(urb.kind(), UrbKind::Interrupt { .. }))
    }

    pub fn pending_control(&self) -> bool {
        self.state
            .lock()
            .pending
            .iter()
            .any(|urb| matches!(urb.kind(), UrbKind::Control { .. }))
    }

    /// Fail the next blocking control transfer
    pub fn fail_next_control(&self, error: TransportError) {
        self.state.lock().control_error = Some(error);
    }

    /// Reject the next asynchronous submission
    pub fn fail_next_submit(&self, error: TransportError) {
        self.state.lock().submit_error = Some(error);
    }

    /// Deliver a status report to the pending status request
    pub fn complete_status(&self, report: &[u8]) -> bool {
        let Some(urb) = self.take_pending(true) else {
            return false;
        };
        let len = {
            let mut buffer = urb.transfer_buffer();
            let len = report.len().min(buffer.len());
            buffer[..len].copy_from_slice(&report[..len]);
            len
        };
        urb.give_back(Ok(len));
        true
    }

    /// Give the pending status request back with `error`
    pub fn fail_status(&self, error: TransportError) -> bool {
        let Some(urb) = self.take_pending(true) else {
            return false;
        };
        urb.give_back(Err(error));
        true
    }

    /// Complete the pending asynchronous control request
    pub fn complete_control(&self) -> bool {
        let Some(urb) = self.take_pending(false) else {
            return false;
        };
        let len = urb.buffer_len();
        urb.give_back(Ok(len));
        true
    }

    /// Give the pending asynchronous control request back with `error`
    pub fn fail_control(&self, error: TransportError) -> bool {
        let Some(urb) = self.take_pending(false) else {
            return false;
        };
        urb.give_back(Err(error));
        true
    }

    /// Simulate physical removal
    pub fn unplug(&self) {
        let pending = {
            let mut state = self.state.lock();
            state.unplugged = true;
            std::mem::take(&mut state.pending)
        };
        for urb in pending {
            urb.give_back(Err(TransportError::Shutdown));
        }
    }

    fn take_pending(&self, interrupt: bool) -> Option<Arc<Urb>> {
        let mut state = self.state.lock();
        let pos = state.pending.iter().position(|urb| {
            matches!(urb.kind(), UrbKind::Interrupt { .. }) == interrupt
        })?;
        Some(state.pending.remove(pos))
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MockTransport {
    fn endpoints(&self) -> Vec<EndpointDescriptor> {
        self.endpoints.clone()
    }

    fn serial_number(&self) -> Result<String, TransportError> {
        self.serial.clone()
    }

    fn control_msg(
        &self,
        _setup: ControlSetup,
        data: &[u8],
        _timeout: Duration,
    ) -> Result<usize, TransportError> {
        let mut state = self.state.lock();
        if state.unplugged {
            return Err(TransportError::NoDevice);
        }
        if let Some(error) = state.control_error.take() {
            return Err(error);
        }
        state.control_frames.push(data.to_vec());
        Ok(data.len())
    }

    fn submit(&self, urb: Arc<Urb>) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.unplugged {
            return Err(TransportError::NoDevice);
        }
        if let Some(error) = state.submit_error.take() {
            return Err(error);
        }
        match urb.kind() {
            UrbKind::Control { .. } => {
                let frame = urb.transfer_buffer().clone();
                state.submitted_frames.push(frame);
            }
            UrbKind::Interrupt { .. } => state.status_submissions += 1,
        }
        state.pending.push(urb);
        Ok(())
    }

    fn cancel(&self, urb: &Urb) {
        let cancelled = {
            let mut state = self.state.lock();
            let pos = state
                .pending
                .iter()
                .position(|p| std::ptr::eq(Arc::as_ptr(p), urb));
            pos.map(|pos| state.pending.remove(pos))
        };
        if let Some(urb) = cancelled {
            urb.give_back(Err(TransportError::Canceled));
        }
    }
}
