//! Command frames and their control setup packet

use crate::command::Command;
use crate::error::{ProtocolError, Result};
use std::time::Duration;

/// Size of every command frame on the wire
pub const FRAME_SIZE: usize = 8;

/// Constant first byte of a command frame
pub const COMMAND_PREFIX: u8 = 0x02;

/// Timeout for the blocking command transfer
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// USB setup packet fields for a control transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlSetup {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
}

impl ControlSetup {
    /// Class-specific, interface-directed SET_REPORT carrying a command frame
    pub const COMMAND: ControlSetup = ControlSetup {
        request_type: 0x21,
        request: 0x09,
        value: 0,
        index: 0,
    };
}

/// `[prefix, command, 0, 0, 0, 0, 0, 0]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandFrame([u8; FRAME_SIZE]);

impl CommandFrame {
    pub fn new(command: Command) -> Self {
        let mut bytes = [0u8; FRAME_SIZE];
        bytes[0] = COMMAND_PREFIX;
        bytes[1] = command.bits();
        CommandFrame(bytes)
    }

    /// Parse a frame captured from the wire
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let frame: [u8; FRAME_SIZE] =
            bytes
                .try_into()
                .map_err(|_| ProtocolError::InvalidFrameLength {
                    expected: FRAME_SIZE,
                    actual: bytes.len(),
                })?;

        if frame[0] != COMMAND_PREFIX {
            return Err(ProtocolError::InvalidPrefix(frame[0]));
        }
        if let Some(pos) = frame[2..].iter().position(|b| *b != 0) {
            return Err(ProtocolError::NonZeroPadding { offset: pos + 2 });
        }

        Ok(CommandFrame(frame))
    }

    pub fn command(&self) -> Command {
        Command::from_bits(self.0[1])
    }

    pub fn as_bytes(&self) -> &[u8; FRAME_SIZE] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_layout() {
        let frame = CommandFrame::new(Command::FIRE);
        assert_eq!(frame.as_bytes(), &[0x02, 0x10, 0, 0, 0, 0, 0, 0]);
        assert_eq!(frame.command(), Command::FIRE);
    }

    #[test]
    fn test_frame_parse_rejects_bad_input() {
        assert!(matches!(
            CommandFrame::from_bytes(&[0x02, 0x01]),
            Err(ProtocolError::InvalidFrameLength {
                expected: 8,
                actual: 2
            })
        ));
        assert!(matches!(
            CommandFrame::from_bytes(&[0x10, 0x02, 0, 0, 0, 0, 0, 0]),
            Err(ProtocolError::InvalidPrefix(0x10))
        ));
        assert!(matches!(
            CommandFrame::from_bytes(&[0x02, 0x02, 0, 0, 0, 1, 0, 0]),
            Err(ProtocolError::NonZeroPadding { offset: 5 })
        ));
    }

    #[test]
    fn test_command_setup_packet() {
        let setup = ControlSetup::COMMAND;
        assert_eq!(setup.request_type, 0x21);
        assert_eq!(setup.request, 0x09);
        assert_eq!((setup.value, setup.index), (0, 0));
    }
}
