//! Transport abstraction
//!
//! Everything the launcher core needs from the USB stack: the endpoint list
//! of the bound interface, the serial string, blocking control transfers,
//! and asynchronous submission of [`Urb`]s whose completion is delivered by
//! calling [`Urb::give_back`].

use crate::error::TransportError;
use crate::usb::urb::Urb;
use protocol::ControlSetup;
use std::sync::Arc;
use std::time::Duration;

/// Direction bit of an endpoint address
pub const USB_DIR_IN: u8 = 0x80;

/// Transfer type bits of bmAttributes
pub const USB_ENDPOINT_XFERTYPE_MASK: u8 = 0x03;
pub const USB_ENDPOINT_XFER_CONTROL: u8 = 0x00;
pub const USB_ENDPOINT_XFER_ISOC: u8 = 0x01;
pub const USB_ENDPOINT_XFER_BULK: u8 = 0x02;
pub const USB_ENDPOINT_XFER_INT: u8 = 0x03;

/// The fields of an endpoint descriptor the driver looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointDescriptor {
    /// bEndpointAddress, direction in bit 7
    pub address: u8,
    /// bmAttributes
    pub attributes: u8,
    /// wMaxPacketSize
    pub max_packet_size: u16,
    /// bInterval
    pub interval: u8,
}

impl EndpointDescriptor {
    pub fn is_in(&self) -> bool {
        self.address & USB_DIR_IN != 0
    }

    pub fn is_interrupt(&self) -> bool {
        self.attributes & USB_ENDPOINT_XFERTYPE_MASK == USB_ENDPOINT_XFER_INT
    }

    /// Status reports arrive on an interrupt IN endpoint
    pub fn is_interrupt_in(&self) -> bool {
        self.is_in() && self.is_interrupt()
    }
}

/// USB transport bound to one launcher interface
///
/// Implementations must deliver exactly one [`Urb::give_back`] per accepted
/// [`Transport::submit`], from any thread, and must not hold internal locks
/// while doing so: completion handlers may resubmit.
pub trait Transport: Send + Sync {
    /// Endpoints of the interface's current alternate setting
    fn endpoints(&self) -> Vec<EndpointDescriptor>;

    /// Read the serial number string descriptor
    fn serial_number(&self) -> Result<String, TransportError>;

    /// Blocking control OUT transfer on endpoint 0
    fn control_msg(
        &self,
        setup: ControlSetup,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, TransportError>;

    /// Queue an asynchronous request; never blocks
    fn submit(&self, urb: Arc<Urb>) -> Result<(), TransportError>;

    /// Ask for `urb` to be completed early with [`TransportError::Canceled`].
    ///
    /// Does not wait. Unknown or already completed requests are ignored.
    fn cancel(&self, urb: &Urb);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupt_in_detection() {
        let ep = EndpointDescriptor {
            address: 0x81,
            attributes: USB_ENDPOINT_XFER_INT,
            max_packet_size: 8,
            interval: 10,
        };
        assert!(ep.is_interrupt_in());

        let out = EndpointDescriptor {
            address: 0x01,
            ..ep
        };
        assert!(!out.is_interrupt_in());

        let bulk = EndpointDescriptor {
            attributes: USB_ENDPOINT_XFER_BULK,
            ..ep
        };
        assert!(!bulk.is_interrupt_in());
    }
}
