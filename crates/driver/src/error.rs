//! Driver error types
//!
//! [`DriverError`] is what callers of the device node see. [`TransportError`]
//! is what the USB transport reports for a single transfer; it is passed
//! through to callers unchanged when a synchronous command fails.

use thiserror::Error;

// errno values used at the device-node boundary
const EPERM: i32 = 1;
const ENOENT: i32 = 2;
const EIO: i32 = 5;
const ENOMEM: i32 = 12;
const EACCES: i32 = 13;
const EFAULT: i32 = 14;
const EBUSY: i32 = 16;
const ENODEV: i32 = 19;
const EINVAL: i32 = 22;
const EPIPE: i32 = 32;
const EPROTO: i32 = 71;
const EOVERFLOW: i32 = 75;
const ECONNRESET: i32 = 104;
const ESHUTDOWN: i32 = 108;
const ETIMEDOUT: i32 = 110;
const ERESTARTSYS: i32 = 512;

/// Failure of a single transfer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("transfer timed out")]
    Timeout,

    #[error("endpoint stalled")]
    Pipe,

    #[error("device is gone")]
    NoDevice,

    #[error("entity not found")]
    NotFound,

    #[error("request already in flight")]
    Busy,

    #[error("device sent more data than requested")]
    Overflow,

    #[error("input/output error")]
    Io,

    #[error("invalid parameter")]
    InvalidParam,

    #[error("access denied")]
    Access,

    /// Request was cancelled before it completed
    #[error("request cancelled")]
    Canceled,

    /// Request was unlinked by the host side
    #[error("connection reset")]
    ConnectionReset,

    /// Host side is shutting the device down
    #[error("shutdown in progress")]
    Shutdown,

    /// Request is being killed and may not be resubmitted
    #[error("submission rejected")]
    Rejected,

    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Statuses after which a polling request must not be resubmitted
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransportError::Canceled | TransportError::ConnectionReset | TransportError::Shutdown
        )
    }

    /// Negative errno equivalent
    pub fn code(&self) -> i32 {
        let errno = match self {
            TransportError::Timeout => ETIMEDOUT,
            TransportError::Pipe => EPIPE,
            TransportError::NoDevice => ENODEV,
            TransportError::NotFound => ENOENT,
            TransportError::Busy => EBUSY,
            TransportError::Overflow => EOVERFLOW,
            TransportError::Io => EIO,
            TransportError::InvalidParam => EINVAL,
            TransportError::Access => EACCES,
            TransportError::Canceled => ENOENT,
            TransportError::ConnectionReset => ECONNRESET,
            TransportError::Shutdown => ESHUTDOWN,
            TransportError::Rejected => EPERM,
            TransportError::Other(_) => EPROTO,
        };
        -errno
    }
}

/// Errors returned by attach, open, close, read and write
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    /// Instance or transport missing or detached
    #[error("no such device")]
    NoDevice,

    /// Interrupted while waiting for the session lock; retry
    #[error("interrupted, restart the call")]
    Restart,

    /// Caller-supplied buffer is unusable
    #[error("bad address")]
    Fault,

    /// Buffer allocation failed during attach
    #[error("out of memory")]
    NoMemory,

    /// Interface has no interrupt IN endpoint to poll status from
    #[error("could not find interrupt in endpoint")]
    NoEndpoint,

    /// Serial string descriptor could not be read at attach
    #[error("could not retrieve serial number: {0}")]
    Serial(TransportError),

    #[error("transfer failed: {0}")]
    Transport(#[from] TransportError),
}

impl DriverError {
    /// Negative errno equivalent, as a device node would return it
    pub fn code(&self) -> i32 {
        match self {
            DriverError::NoDevice | DriverError::NoEndpoint | DriverError::Serial(_) => -ENODEV,
            DriverError::Restart => -ERESTARTSYS,
            DriverError::Fault => -EFAULT,
            DriverError::NoMemory => -ENOMEM,
            DriverError::Transport(e) => e.code(),
        }
    }
}
