//! Common utilities for the launcher driver and its command source
//!
//! This crate provides shared functionality between the driver daemon and
//! the control tool: error handling, logging setup, and the async channel
//! bridge between the USB thread and the Tokio runtime.

pub mod channel;
pub mod error;
pub mod logging;

pub use channel::{DriverBridge, DriverCommand, DriverEvent, DriverWorker, create_driver_bridge};
pub use error::{Error, Result};
pub use logging::setup_logging;
