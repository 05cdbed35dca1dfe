//! Sessions on a launcher
//!
//! A [`Session`] is one open reference to a published launcher. Opening arms
//! status polling; closing the last session disarms it. Dropping a session
//! that was not closed closes it without the possibility of interruption.

use crate::error::DriverError;
use crate::launcher::device::{LauncherDevice, SessionState};
use crate::launcher::lock::Interrupt;
use crate::launcher::registry::Registry;
use protocol::Minor;
use std::sync::Arc;
use tracing::{error, info, warn};

/// One open reference to a launcher
#[derive(Debug)]
pub struct Session {
    device: Arc<LauncherDevice>,
    interrupt: Interrupt,
    open: bool,
}

impl Session {
    /// Open the launcher published under `minor`.
    ///
    /// `interrupt` aborts waiting for the session lock here and in every
    /// later call on this session.
    pub fn open(registry: &Registry, minor: Minor, interrupt: Interrupt) -> Result<Self, DriverError> {
        let device = registry.with_device(minor, |device| {
            let mut state = device.session.lock_interruptible(&interrupt)?;

            let Some(transport) = state.transport.clone() else {
                return Err(DriverError::NoDevice);
            };

            state.open_count += 1;
            if state.open_count > 1 {
                info!("launcher{}: open_count = {}", minor, state.open_count);
            }

            if let Err(e) = device.start_polling(&transport) {
                error!("launcher{}: submitting status request failed: {}", minor, e);
                state.open_count -= 1;
                return Err(e.into());
            }

            Ok(Arc::clone(device))
        })?;

        Ok(Session {
            device,
            interrupt,
            open: true,
        })
    }

    /// Send the first byte of `buf` as the launcher command
    pub fn write(&self, buf: &[u8]) -> Result<usize, DriverError> {
        if !self.open {
            return Err(DriverError::NoDevice);
        }
        self.device.write_command(buf, &self.interrupt)
    }

    /// Status is never readable through a session.
    pub fn read(&self, _buf: &mut [u8]) -> Result<usize, DriverError> {
        Err(DriverError::Fault)
    }

    /// End the session.
    ///
    /// On [`DriverError::Restart`] the session stays open and the call may
    /// be repeated.
    pub fn close(&mut self) -> Result<(), DriverError> {
        if !self.open {
            return Err(DriverError::NoDevice);
        }

        let mut state = self.device.session.lock_interruptible(&self.interrupt)?;
        self.open = false;
        end_session(&self.device, &mut state)
    }

    pub fn device(&self) -> &Arc<LauncherDevice> {
        &self.device
    }

    pub fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }

    pub fn is_open(&self) -> bool {
        self.open
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.open {
            self.open = false;
            let mut state = self.device.session.lock();
            if let Err(e) = end_session(&self.device, &mut state) {
                warn!("launcher{}: close on drop failed: {}", self.device.minor(), e);
            }
        }
    }
}

fn end_session(device: &LauncherDevice, state: &mut SessionState) -> Result<(), DriverError> {
    if state.open_count == 0 {
        error!("launcher{}: device not opened", device.minor());
        return Err(DriverError::NoDevice);
    }

    let Some(transport) = state.transport.clone() else {
        warn!("launcher{}: device unplugged before the file was released", device.minor());
        state.open_count -= 1;
        device.release_if_unused(state);
        return Ok(());
    };

    device.abort();
    state.open_count -= 1;

    if state.open_count > 0 {
        info!("launcher{}: open_count = {}", device.minor(), state.open_count);
        if let Err(e) = device.start_polling(&transport) {
            warn!("launcher{}: re-arming status polling failed: {}", device.minor(), e);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usb::mock::MockTransport;

    fn attached() -> (Arc<MockTransport>, Registry, Minor) {
        let mock = Arc::new(MockTransport::new());
        let registry = Registry::new();
        let minor = registry.attach(mock.clone()).unwrap();
        (mock, registry, minor)
    }

    #[test]
    fn test_open_unknown_minor() {
        let registry = Registry::new();
        let err = Session::open(&registry, Minor(3), Interrupt::new()).unwrap_err();
        assert_eq!(err, DriverError::NoDevice);
    }

    #[test]
    fn test_open_arms_polling_once() {
        let (mock, registry, minor) = attached();
        let a = Session::open(&registry, minor, Interrupt::new()).unwrap();
        let b = Session::open(&registry, minor, Interrupt::new()).unwrap();

        assert_eq!(a.device().open_count(), 2);
        assert_eq!(mock.status_submissions(), 1);
        assert!(b.device().is_polling());
    }

    #[test]
    fn test_open_rolls_back_on_submit_failure() {
        let (mock, registry, minor) = attached();
        mock.fail_next_submit(crate::error::TransportError::Io);

        let err = Session::open(&registry, minor, Interrupt::new()).unwrap_err();
        assert_eq!(err.code(), -5);
        let device = registry.get(minor).unwrap();
        assert_eq!(device.open_count(), 0);
        assert!(!device.is_polling());
    }

    #[test]
    fn test_close_last_session_stops_polling() {
        let (mock, registry, minor) = attached();
        let mut session = Session::open(&registry, minor, Interrupt::new()).unwrap();

        session.close().unwrap();

        assert!(!session.device().is_polling());
        assert!(!mock.pending_status());
        assert_eq!(session.close(), Err(DriverError::NoDevice));
    }

    #[test]
    fn test_close_keeps_polling_for_remaining_sessions() {
        let (mock, registry, minor) = attached();
        let mut a = Session::open(&registry, minor, Interrupt::new()).unwrap();
        let b = Session::open(&registry, minor, Interrupt::new()).unwrap();

        a.close().unwrap();

        assert_eq!(b.device().open_count(), 1);
        assert!(b.device().is_polling());
        assert!(mock.pending_status());
    }

    #[test]
    fn test_read_always_faults() {
        let (_mock, registry, minor) = attached();
        let session = Session::open(&registry, minor, Interrupt::new()).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(session.read(&mut buf), Err(DriverError::Fault));
    }

    #[test]
    fn test_drop_closes() {
        let (_mock, registry, minor) = attached();
        let session = Session::open(&registry, minor, Interrupt::new()).unwrap();
        let device = session.device().clone();

        drop(session);
        assert_eq!(device.open_count(), 0);
    }

    #[test]
    fn test_write_after_close() {
        let (_mock, registry, minor) = attached();
        let mut session = Session::open(&registry, minor, Interrupt::new()).unwrap();
        session.close().unwrap();
        assert_eq!(session.write(&[0x20]), Err(DriverError::NoDevice));
    }
}
