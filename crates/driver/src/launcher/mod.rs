//! Launcher device core
//!
//! Lock order, everywhere: the registry lock, then a device's session lock,
//! then its command lock.

mod command;
pub mod device;
pub mod lock;
pub mod registry;
pub mod session;
pub mod status;

pub use device::LauncherDevice;
pub use lock::{Interrupt, SessionLock};
pub use registry::Registry;
pub use session::Session;
pub use status::limit_correction;
