//! Wire protocol for the Dream Cheeky Thunder USB launcher
//!
//! This crate defines everything that crosses the USB cable or the
//! byte-oriented device node:
//! - the command bitmask written by callers ([`Command`])
//! - the 8-byte control frame carrying a command ([`CommandFrame`])
//! - the setup packet that frame is sent with ([`ControlSetup`])
//! - the limit-switch report read from the interrupt endpoint ([`StatusReport`])
//!
//! # Example
//!
//! ```
//! use protocol::{Command, CommandFrame};
//!
//! let frame = CommandFrame::new(Command::UP | Command::LEFT);
//! assert_eq!(frame.as_bytes(), &[0x02, 0x06, 0, 0, 0, 0, 0, 0]);
//! ```

pub mod command;
pub mod error;
pub mod frame;
pub mod status;
pub mod types;

pub use command::Command;
pub use error::{ProtocolError, Result};
pub use frame::{COMMAND_PREFIX, COMMAND_TIMEOUT, CommandFrame, ControlSetup, FRAME_SIZE};
pub use status::StatusReport;
pub use types::Minor;

/// USB vendor ID of the launcher
pub const VENDOR_ID: u16 = 0x2123;

/// USB product ID of the launcher
pub const PRODUCT_ID: u16 = 0x1010;

/// Default device node written by command sources
pub const DEFAULT_NODE: &str = "/dev/launcher0";
