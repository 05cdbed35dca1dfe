//! Protocol error types

use thiserror::Error;

/// Errors decoding frames captured from the wire
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame is not exactly eight bytes
    #[error("Invalid frame length: expected {expected} bytes, got {actual}")]
    InvalidFrameLength { expected: usize, actual: usize },

    /// First byte is not the command prefix
    #[error("Invalid command prefix: {0:#04x}")]
    InvalidPrefix(u8),

    /// Trailing bytes must be zero
    #[error("Non-zero padding at offset {offset}")]
    NonZeroPadding { offset: usize },
}

/// Type alias for protocol results
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProtocolError::InvalidFrameLength {
            expected: 8,
            actual: 3,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("expected 8"));
        assert!(msg.contains("got 3"));

        let err = ProtocolError::InvalidPrefix(0x10);
        assert_eq!(err.to_string(), "Invalid command prefix: 0x10");
    }
}
