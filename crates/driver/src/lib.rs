//! Dream Cheeky USB launcher driver
//!
//! The launcher core keeps one [`LauncherDevice`] per attached launcher and
//! lets any number of [`Session`]s send it single command bytes. While a
//! session is open the device's limit-switch status is polled, and commands
//! that would drive the turret past a travel limit are corrected on the fly.
//!
//! The USB stack sits behind the [`usb::Transport`] trait: [`usb::RusbTransport`]
//! talks to real hardware through libusb and [`usb::mock::MockTransport`]
//! stands in for it in tests.
//!
//! # Example
//!
//! ```
//! use driver::usb::mock::MockTransport;
//! use driver::{Interrupt, Registry, Session};
//! use protocol::Command;
//! use std::sync::Arc;
//!
//! let mock = Arc::new(MockTransport::new());
//! let registry = Registry::new();
//! let minor = registry.attach(mock.clone()).unwrap();
//!
//! let mut session = Session::open(&registry, minor, Interrupt::new()).unwrap();
//! session.write(&[Command::UP.bits()]).unwrap();
//!
//! // The turret reports it reached the top; UP is cleared and re-sent.
//! mock.complete_status(&[0x80, 0x00]);
//! assert_eq!(session.device().command(), Command::from_bits(0));
//! assert_eq!(mock.submitted_frames(), vec![vec![0x02, 0, 0, 0, 0, 0, 0, 0]]);
//!
//! session.close().unwrap();
//! ```

pub mod config;
pub mod error;
pub mod launcher;
pub mod manager;
pub mod node;
pub mod usb;

pub use config::DriverConfig;
pub use error::{DriverError, TransportError};
pub use launcher::{Interrupt, LauncherDevice, Registry, Session, limit_correction};
