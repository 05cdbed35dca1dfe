//! Launcher device instance
//!
//! One [`LauncherDevice`] exists per attached launcher. It owns the two
//! reusable transfer requests, their buffers, the command state and the
//! session bookkeeping. Two events can end its life: the last session
//! closing, and the device being unplugged. Whichever of the two observes
//! "no sessions and no transport" releases it, through
//! [`LauncherDevice::release_if_unused`].

use crate::launcher::lock::SessionLock;
use crate::usb::transport::{EndpointDescriptor, Transport};
use crate::usb::urb::{Urb, UrbKind};
use parking_lot::Mutex;
use protocol::{Command, ControlSetup, Minor};
use std::sync::atomic::{AtomicBool, Ordering, fence};
use std::sync::{Arc, Weak};
use tracing::{debug, info};

/// State guarded by the session lock
pub(crate) struct SessionState {
    pub(crate) open_count: usize,
    /// `None` once the device has been unplugged; never set again
    pub(crate) transport: Option<Arc<dyn Transport>>,
    pub(crate) released: bool,
}

/// State guarded by the command lock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CommandState {
    pub(crate) command: Command,
    pub(crate) correction_required: bool,
}

/// Per-device state of an attached launcher
pub struct LauncherDevice {
    minor: Minor,
    serial: String,
    status_endpoint: EndpointDescriptor,
    /// Serializes open, close and write
    pub(crate) session: SessionLock<SessionState>,
    /// Shared with the completion path; held only briefly
    pub(crate) command: Mutex<CommandState>,
    /// Status polling armed
    pub(crate) polling: AtomicBool,
    /// Mirrors `SessionState::transport.is_some()` for the completion path
    pub(crate) present: AtomicBool,
    pub(crate) status_urb: Arc<Urb>,
    pub(crate) ctrl_urb: Arc<Urb>,
}

impl LauncherDevice {
    pub(crate) fn new(
        minor: Minor,
        serial: String,
        status_endpoint: EndpointDescriptor,
        transport: Arc<dyn Transport>,
        status_buffer: Vec<u8>,
        ctrl_buffer: Vec<u8>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<LauncherDevice>| {
            let status_dev = weak.clone();
            let status_urb = Arc::new(Urb::new(
                UrbKind::Interrupt {
                    endpoint: status_endpoint.address,
                },
                status_buffer,
                Box::new(move |result| {
                    if let Some(dev) = status_dev.upgrade() {
                        dev.status_complete(result);
                    }
                }),
            ));

            let ctrl_dev = weak.clone();
            let ctrl_urb = Arc::new(Urb::new(
                UrbKind::Control {
                    setup: ControlSetup::COMMAND,
                },
                ctrl_buffer,
                Box::new(move |result| {
                    if let Some(dev) = ctrl_dev.upgrade() {
                        dev.command_complete(result);
                    }
                }),
            ));

            LauncherDevice {
                minor,
                serial,
                status_endpoint,
                session: SessionLock::new(SessionState {
                    open_count: 0,
                    transport: Some(transport),
                    released: false,
                }),
                command: Mutex::new(CommandState {
                    command: Command::STOP,
                    correction_required: false,
                }),
                polling: AtomicBool::new(false),
                present: AtomicBool::new(true),
                status_urb,
                ctrl_urb,
            }
        })
    }

    pub fn minor(&self) -> Minor {
        self.minor
    }

    /// Serial string read at attach
    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn status_endpoint(&self) -> EndpointDescriptor {
        self.status_endpoint
    }

    /// Currently desired command bits
    pub fn command(&self) -> Command {
        self.command.lock().command
    }

    /// A limit correction was issued and not yet acknowledged
    pub fn correction_pending(&self) -> bool {
        self.command.lock().correction_required
    }

    pub fn open_count(&self) -> usize {
        self.session.lock().open_count
    }

    /// False once the device has been unplugged
    pub fn is_attached(&self) -> bool {
        self.present.load(Ordering::SeqCst)
    }

    pub fn is_polling(&self) -> bool {
        self.polling.load(Ordering::SeqCst)
    }

    /// Buffers and requests have been given up
    pub fn is_released(&self) -> bool {
        self.session.lock().released
    }

    /// Stop status polling and cancel both transfer requests, waiting for
    /// their completion handlers to finish.
    ///
    /// Safe after the device was unplugged.
    pub fn abort(&self) {
        if self.polling.swap(false, Ordering::SeqCst) {
            debug!("launcher{}: status polling disarmed", self.minor);
        }
        // The disarm must be visible to the completion path before the
        // cancellation it would otherwise race with a resubmission.
        fence(Ordering::SeqCst);

        self.status_urb.kill();
        self.ctrl_urb.kill();
    }

    /// Release the device if nobody has it open and it is unplugged.
    ///
    /// The single place both close and detach free a device. Returns true if
    /// this call released it.
    pub(crate) fn release_if_unused(&self, state: &mut SessionState) -> bool {
        if state.open_count > 0 || state.transport.is_some() || state.released {
            return false;
        }

        self.abort();
        self.status_urb.release();
        self.ctrl_urb.release();
        state.released = true;

        info!("launcher{}: released", self.minor);
        true
    }

    /// Physical removal: drop the transport and release now if unused
    pub(crate) fn disconnect(&self) {
        let mut state = self.session.lock();
        self.present.store(false, Ordering::SeqCst);
        state.transport = None;

        if !self.release_if_unused(&mut state) && !state.released {
            info!(
                "launcher{}: unplugged with {} open session(s), release deferred",
                self.minor, state.open_count
            );
        }
    }
}

impl std::fmt::Debug for LauncherDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LauncherDevice")
            .field("minor", &self.minor)
            .field("serial", &self.serial)
            .field("attached", &self.is_attached())
            .field("polling", &self.is_polling())
            .finish()
    }
}
