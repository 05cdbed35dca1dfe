//! Command channel
//!
//! User writes go out as blocking control transfers under the session lock.
//! Limit corrections go out through the reusable control request from the
//! completion context and never block.

use crate::error::{DriverError, TransportError};
use crate::launcher::device::LauncherDevice;
use crate::launcher::lock::Interrupt;
use crate::usb::urb::UrbResult;
use protocol::{COMMAND_TIMEOUT, Command, CommandFrame, ControlSetup};
use tracing::{debug, error, info};

impl LauncherDevice {
    /// Store the first byte of `buf` as the command and send it.
    ///
    /// Bytes past the first are ignored. Returns the number of bytes
    /// accepted, which is always 1.
    pub(crate) fn write_command(&self, buf: &[u8], interrupt: &Interrupt) -> Result<usize, DriverError> {
        let state = self.session.lock_interruptible(interrupt)?;

        let Some(transport) = state.transport.clone() else {
            error!("launcher{}: no device or device unplugged", self.minor());
            return Err(DriverError::NoDevice);
        };

        let (&byte, rest) = buf.split_first().ok_or(DriverError::Fault)?;
        if !rest.is_empty() {
            debug!(
                "launcher{}: write of {} bytes truncated to 1",
                self.minor(),
                buf.len()
            );
        }

        let command = Command::from_bits(byte);
        info!("launcher{}: received command {:#04x} ({})", self.minor(), byte, command);

        self.command.lock().command = command;

        let frame = CommandFrame::new(command);
        transport
            .control_msg(ControlSetup::COMMAND, frame.as_bytes(), COMMAND_TIMEOUT)
            .map_err(|e| {
                error!("launcher{}: control message failed: {}", self.minor(), e);
                DriverError::Transport(e)
            })?;

        drop(state);
        Ok(1)
    }

    /// Send `command` through the asynchronous control request
    pub(crate) fn submit_correction(&self, command: Command) {
        let Some(transport) = self.status_urb.transport() else {
            debug!("launcher{}: no transport for correction", self.minor());
            return;
        };

        let frame = CommandFrame::new(command);
        let result = self.ctrl_urb.submit_with(&transport, |buf| {
            let len = buf.len().min(frame.as_bytes().len());
            buf[..len].copy_from_slice(&frame.as_bytes()[..len]);
        });

        match result {
            Ok(()) => debug!("launcher{}: correction {} submitted", self.minor(), command),
            Err(TransportError::Busy | TransportError::Rejected) => {
                debug!("launcher{}: correction request in flight, not resubmitted", self.minor());
            }
            Err(e) => error!("launcher{}: submitting correction control request failed: {}", self.minor(), e),
        }
    }

    /// Completion handler of the correction request.
    ///
    /// The pending flag clears only once the current command state reached
    /// the device. A frame that went out stale is followed by the current
    /// state; a failed one is retried by the next status report.
    pub(crate) fn command_complete(&self, result: UrbResult) {
        let sent = CommandFrame::from_bytes(&self.ctrl_urb.transfer_buffer()).map(|frame| frame.command());

        let reissue = {
            let mut state = self.command.lock();
            match &result {
                _ if !state.correction_required => None,
                Err(e) => {
                    if !e.is_terminal() {
                        error!("launcher{}: correction transfer failed: {}", self.minor(), e);
                    }
                    None
                }
                Ok(_) if sent == Ok(state.command) => {
                    state.correction_required = false;
                    debug!("launcher{}: correction acknowledged", self.minor());
                    None
                }
                Ok(_) => Some(state.command),
            }
        };

        if let Some(command) = reissue {
            debug!("launcher{}: correction outdated, sending {}", self.minor(), command);
            self.submit_correction(command);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::error::{DriverError, TransportError};
    use crate::usb::mock::MockTransport;
    use crate::{Interrupt, Registry, Session};
    use protocol::Command;
    use std::sync::Arc;

    fn open() -> (Arc<MockTransport>, Registry, Session) {
        let mock = Arc::new(MockTransport::new());
        let registry = Registry::new();
        let minor = registry.attach(mock.clone()).unwrap();
        let session = Session::open(&registry, minor, Interrupt::new()).unwrap();
        (mock, registry, session)
    }

    #[test]
    fn test_write_sends_frame() {
        let (mock, _registry, session) = open();

        assert_eq!(session.write(&[0x04]), Ok(1));
        assert_eq!(mock.control_frames(), vec![vec![0x02, 0x04, 0, 0, 0, 0, 0, 0]]);
        assert_eq!(session.device().command(), Command::LEFT);
    }

    #[test]
    fn test_write_truncates_to_first_byte() {
        let (mock, _registry, session) = open();

        assert_eq!(session.write(&[0x10, 0x20, 0x01]), Ok(1));
        assert_eq!(mock.control_frames(), vec![vec![0x02, 0x10, 0, 0, 0, 0, 0, 0]]);
    }

    #[test]
    fn test_empty_write_is_fault() {
        let (mock, _registry, session) = open();

        assert_eq!(session.write(&[]), Err(DriverError::Fault));
        assert!(mock.control_frames().is_empty());
    }

    #[test]
    fn test_transport_error_passes_through() {
        let (mock, _registry, session) = open();
        mock.fail_next_control(TransportError::Timeout);

        let err = session.write(&[0x08]).unwrap_err();
        assert_eq!(err, DriverError::Transport(TransportError::Timeout));
        assert_eq!(err.code(), -110);
        // The command is stored even though the transfer failed.
        assert_eq!(session.device().command(), Command::RIGHT);
    }

    #[test]
    fn test_correction_acknowledged_on_completion() {
        let (mock, _registry, session) = open();
        session.write(&[Command::UP.bits()]).unwrap();

        assert!(mock.complete_status(&[0x80, 0x00]));
        assert!(session.device().correction_pending());
        assert!(mock.pending_control());

        assert!(mock.complete_control());
        assert!(!session.device().correction_pending());
    }

    #[test]
    fn test_write_during_correction_is_followed_up() {
        let (mock, _registry, session) = open();
        session.write(&[(Command::UP | Command::LEFT).bits()]).unwrap();

        // First correction clears UP and is left in flight.
        assert!(mock.complete_status(&[0x80, 0x00]));
        assert_eq!(session.device().command(), Command::LEFT);

        // The user moves on before the correction completes.
        session.write(&[Command::RIGHT.bits()]).unwrap();
        assert!(mock.complete_control());
        assert!(session.device().correction_pending());
        assert_eq!(
            mock.submitted_frames(),
            vec![
                vec![0x02, 0x04, 0, 0, 0, 0, 0, 0],
                vec![0x02, 0x08, 0, 0, 0, 0, 0, 0],
            ]
        );

        assert!(mock.complete_control());
        assert!(!session.device().correction_pending());
        assert!(!mock.pending_control());
    }

    #[test]
    fn test_second_limit_during_correction_reaches_device() {
        let (mock, _registry, session) = open();
        session.write(&[(Command::UP | Command::LEFT).bits()]).unwrap();

        assert!(mock.complete_status(&[0x80, 0x00]));
        // The left limit arrives while the UP correction is still in flight.
        assert!(mock.complete_status(&[0x80, 0x04]));
        assert_eq!(session.device().command(), Command::from_bits(0));

        assert!(mock.complete_control());
        assert!(mock.complete_control());

        for _ in 0..5 {
            assert!(mock.complete_status(&[0x80, 0x04]));
        }

        assert_eq!(
            mock.submitted_frames(),
            vec![
                vec![0x02, 0x04, 0, 0, 0, 0, 0, 0],
                vec![0x02, 0x00, 0, 0, 0, 0, 0, 0],
            ]
        );
        assert!(!session.device().correction_pending());
        assert!(!mock.pending_control());
    }

    #[test]
    fn test_failed_correction_retried_on_next_report() {
        let (mock, _registry, session) = open();
        session.write(&[Command::DOWN.bits()]).unwrap();

        assert!(mock.complete_status(&[0x40, 0x00]));
        assert!(mock.fail_control(TransportError::Pipe));
        assert!(session.device().correction_pending());
        assert!(!mock.pending_control());

        // No limit in this report, the pending correction still goes out.
        assert!(mock.complete_status(&[0x00, 0x00]));
        assert!(mock.complete_control());

        assert_eq!(
            mock.submitted_frames(),
            vec![
                vec![0x02, 0x00, 0, 0, 0, 0, 0, 0],
                vec![0x02, 0x00, 0, 0, 0, 0, 0, 0],
            ]
        );
        assert!(!session.device().correction_pending());
    }
}
