//! Limit-switch status reports
//!
//! The interrupt IN endpoint reports which mechanical travel limits the
//! turret currently sits at:
//!
//! ```text
//! byte0: 0x80 at max up, 0x40 at max down
//! byte1: 0x04 at max left, 0x08 at max right
//! ```

const MAX_UP: u8 = 0x80;
const MAX_DOWN: u8 = 0x40;
const MAX_LEFT: u8 = 0x04;
const MAX_RIGHT: u8 = 0x08;

/// Decoded limit bits of one status report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusReport {
    vertical: u8,
    horizontal: u8,
}

impl StatusReport {
    /// Decode the received part of a report.
    ///
    /// Returns `None` for an empty transfer. A one-byte transfer carries no
    /// horizontal limits.
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        let (&vertical, rest) = data.split_first()?;
        Some(StatusReport {
            vertical,
            horizontal: rest.first().copied().unwrap_or(0),
        })
    }

    pub fn at_max_up(&self) -> bool {
        self.vertical & MAX_UP != 0
    }

    pub fn at_max_down(&self) -> bool {
        self.vertical & MAX_DOWN != 0
    }

    pub fn at_max_left(&self) -> bool {
        self.horizontal & MAX_LEFT != 0
    }

    pub fn at_max_right(&self) -> bool {
        self.horizontal & MAX_RIGHT != 0
    }

    /// True if any travel limit is reported
    pub fn any_limit(&self) -> bool {
        self.at_max_up() || self.at_max_down() || self.at_max_left() || self.at_max_right()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_vertical_limits() {
        let report = StatusReport::from_bytes(&[0x80, 0x00]).unwrap();
        assert!(report.at_max_up());
        assert!(!report.at_max_down());

        let report = StatusReport::from_bytes(&[0x40, 0x00, 0, 0, 0, 0, 0, 0]).unwrap();
        assert!(report.at_max_down());
        assert!(!report.at_max_up());
    }

    #[test]
    fn test_decode_horizontal_limits() {
        let report = StatusReport::from_bytes(&[0x00, 0x04]).unwrap();
        assert!(report.at_max_left());
        assert!(!report.at_max_right());

        let report = StatusReport::from_bytes(&[0x00, 0x08]).unwrap();
        assert!(report.at_max_right());
        assert!(report.any_limit());
    }

    #[test]
    fn test_short_reports() {
        assert!(StatusReport::from_bytes(&[]).is_none());

        let report = StatusReport::from_bytes(&[0x80]).unwrap();
        assert!(report.at_max_up());
        assert!(!report.at_max_left());
        assert!(!report.at_max_right());
    }

    #[test]
    fn test_idle_report() {
        let report = StatusReport::from_bytes(&[0; 8]).unwrap();
        assert!(!report.any_limit());
    }
}
