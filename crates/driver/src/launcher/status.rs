//! Status polling and limit correction
//!
//! The status request runs from the transport's completion context. Every
//! completion with data is checked against the limit bits, and a command that
//! still drives into a reported limit has that direction cleared and is sent
//! again without blocking.

use crate::error::TransportError;
use crate::launcher::device::LauncherDevice;
use crate::usb::transport::Transport;
use crate::usb::urb::UrbResult;
use protocol::{Command, StatusReport};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::{debug, error, trace};

/// Command with every direction that runs into a reported limit removed.
///
/// Vertical first, then horizontal; at most one direction per axis. Returns
/// `None` when nothing needs to change.
pub fn limit_correction(report: StatusReport, command: Command) -> Option<Command> {
    let mut corrected = command;

    if report.at_max_up() && corrected.contains(Command::UP) {
        corrected.remove(Command::UP);
    } else if report.at_max_down() && corrected.contains(Command::DOWN) {
        corrected.remove(Command::DOWN);
    }

    if report.at_max_left() && corrected.contains(Command::LEFT) {
        corrected.remove(Command::LEFT);
    } else if report.at_max_right() && corrected.contains(Command::RIGHT) {
        corrected.remove(Command::RIGHT);
    }

    (corrected != command).then_some(corrected)
}

impl LauncherDevice {
    /// Arm polling and submit the first status request.
    ///
    /// A request still in flight from an earlier session keeps polling; that
    /// is not an error.
    pub(crate) fn start_polling(&self, transport: &Arc<dyn Transport>) -> Result<(), TransportError> {
        self.polling.store(true, Ordering::SeqCst);

        match self.status_urb.submit(transport) {
            Ok(()) => {
                debug!("launcher{}: status polling armed", self.minor());
                Ok(())
            }
            Err(TransportError::Busy) => Ok(()),
            Err(e) => {
                self.polling.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    /// Completion handler of the status request
    pub(crate) fn status_complete(&self, result: UrbResult) {
        match result {
            Err(e) if e.is_terminal() => {
                debug!("launcher{}: status request ended: {}", self.minor(), e);
                return;
            }
            Err(e) => {
                error!("launcher{}: nonzero status received: {}", self.minor(), e);
            }
            Ok(0) => {}
            Ok(len) => {
                let data = {
                    let buffer = self.status_urb.transfer_buffer();
                    buffer[..len.min(buffer.len())].to_vec()
                };
                trace!("launcher{}: status bytes {:02x?}", self.minor(), data);

                if let Some(report) = StatusReport::from_bytes(&data) {
                    self.apply_limits(report);
                }
            }
        }

        self.resubmit_status();
    }

    /// Clear directions that run into a reported limit and send the
    /// corrected command.
    ///
    /// While a correction is pending the current state is sent on every
    /// report, so a correction that could not go out is retried.
    pub(crate) fn apply_limits(&self, report: StatusReport) {
        let pending = {
            let mut state = self.command.lock();
            if let Some(corrected) = limit_correction(report, state.command) {
                debug!(
                    "launcher{}: limit reached, {} -> {}",
                    self.minor(),
                    state.command,
                    corrected
                );
                state.command = corrected;
                state.correction_required = true;
            }
            state.correction_required.then_some(state.command)
        };

        if let Some(command) = pending {
            self.submit_correction(command);
        }
    }

    fn resubmit_status(&self) {
        if !self.polling.load(Ordering::SeqCst) || !self.present.load(Ordering::SeqCst) {
            return;
        }

        match self.status_urb.resubmit() {
            Ok(()) => {}
            Err(TransportError::Rejected) => {
                debug!("launcher{}: status resubmission rejected, polling stopped", self.minor());
            }
            // A new session re-armed polling between give-back and here.
            Err(TransportError::Busy) => {}
            Err(e) => {
                self.polling.store(false, Ordering::SeqCst);
                error!("launcher{}: resubmitting status request failed: {}", self.minor(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(vertical: u8, horizontal: u8) -> StatusReport {
        StatusReport::from_bytes(&[vertical, horizontal]).unwrap()
    }

    #[test]
    fn test_up_limit_clears_up_only() {
        let cmd = Command::UP | Command::LEFT | Command::FIRE;
        assert_eq!(
            limit_correction(report(0x80, 0x00), cmd),
            Some(Command::LEFT | Command::FIRE)
        );
    }

    #[test]
    fn test_no_correction_when_moving_away() {
        assert_eq!(limit_correction(report(0x80, 0x00), Command::DOWN), None);
        assert_eq!(limit_correction(report(0x00, 0x04), Command::RIGHT), None);
        assert_eq!(limit_correction(report(0x00, 0x00), Command::UP), None);
    }

    #[test]
    fn test_both_axes_corrected_in_one_pass() {
        let cmd = Command::DOWN | Command::RIGHT;
        assert_eq!(
            limit_correction(report(0x40, 0x08), cmd),
            Some(Command::from_bits(0))
        );
    }

    #[test]
    fn test_up_checked_before_down() {
        // Both limits reported and both bits set: only UP is cleared.
        let cmd = Command::from_bits(0x03);
        assert_eq!(
            limit_correction(report(0xc0, 0x00), cmd),
            Some(Command::DOWN)
        );
    }

    #[test]
    fn test_left_checked_before_right() {
        let cmd = Command::LEFT | Command::RIGHT;
        assert_eq!(
            limit_correction(report(0x00, 0x0c), cmd),
            Some(Command::RIGHT)
        );
    }

    #[test]
    fn test_stop_is_never_corrected() {
        assert_eq!(limit_correction(report(0xff, 0xff), Command::STOP), None);
    }
}
