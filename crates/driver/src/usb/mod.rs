//! USB transport layer

pub mod mock;
pub mod rusb_transport;
pub mod transport;
pub mod urb;

pub use rusb_transport::{RusbTransport, map_rusb_error};
pub use transport::{EndpointDescriptor, Transport};
pub use urb::{Urb, UrbKind, UrbResult};
