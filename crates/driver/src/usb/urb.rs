//! Asynchronous transfer requests
//!
//! A [`Urb`] is allocated once per device and reused for every submission.
//! It is in flight at most once at a time: a second submission while the
//! first has not been given back fails with [`TransportError::Busy`].
//!
//! The completion handler runs on whatever thread the transport gives the
//! request back on. It may resubmit the same request. [`Urb::kill`] rejects
//! such resubmissions while it waits for the in-flight request and its
//! handler to finish, so once `kill` returns nothing references the request
//! until it is submitted again.

use crate::error::TransportError;
use crate::usb::transport::Transport;
use parking_lot::{Condvar, Mutex, MutexGuard};
use protocol::ControlSetup;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// What a request transfers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrbKind {
    /// Interrupt IN from `endpoint`
    Interrupt { endpoint: u8 },
    /// Control OUT on endpoint 0
    Control { setup: ControlSetup },
}

/// Bytes transferred, or why the transfer failed
pub type UrbResult = Result<usize, TransportError>;

/// Completion handler; must not block
pub type CompletionFn = Box<dyn Fn(UrbResult) + Send + Sync>;

#[derive(Default)]
struct UrbState {
    /// Handed to the transport, give-back pending
    submitted: bool,
    /// Submissions plus completion handlers currently running
    use_count: usize,
    /// Number of `kill` calls in progress
    reject: usize,
    released: bool,
    /// Transport of the last submission
    transport: Option<Arc<dyn Transport>>,
}

/// Reusable asynchronous transfer request
pub struct Urb {
    kind: UrbKind,
    buffer: Mutex<Vec<u8>>,
    complete: CompletionFn,
    state: Mutex<UrbState>,
    idle: Condvar,
}

impl Urb {
    pub fn new(kind: UrbKind, buffer: Vec<u8>, complete: CompletionFn) -> Self {
        Self {
            kind,
            buffer: Mutex::new(buffer),
            complete,
            state: Mutex::new(UrbState::default()),
            idle: Condvar::new(),
        }
    }

    pub fn kind(&self) -> UrbKind {
        self.kind
    }

    /// Transfer buffer. Transports fill it before giving an IN request back.
    pub fn transfer_buffer(&self) -> MutexGuard<'_, Vec<u8>> {
        self.buffer.lock()
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Transport the request was last submitted on
    pub fn transport(&self) -> Option<Arc<dyn Transport>> {
        self.state.lock().transport.clone()
    }

    /// True while submitted or while its completion handler runs
    pub fn is_pending(&self) -> bool {
        self.state.lock().use_count > 0
    }

    pub fn is_released(&self) -> bool {
        self.state.lock().released
    }

    pub fn submit(self: &Arc<Self>, transport: &Arc<dyn Transport>) -> Result<(), TransportError> {
        self.submit_with(transport, |_| {})
    }

    /// Claim the request, let `fill` write the transfer buffer, then hand it
    /// to the transport
    pub fn submit_with<F>(
        self: &Arc<Self>,
        transport: &Arc<dyn Transport>,
        fill: F,
    ) -> Result<(), TransportError>
    where
        F: FnOnce(&mut [u8]),
    {
        {
            let mut state = self.state.lock();
            if state.released {
                return Err(TransportError::NoDevice);
            }
            if state.reject > 0 {
                return Err(TransportError::Rejected);
            }
            if state.submitted {
                return Err(TransportError::Busy);
            }
            state.submitted = true;
            state.use_count += 1;
            state.transport = Some(Arc::clone(transport));
        }

        fill(self.buffer.lock().as_mut_slice());

        if let Err(e) = transport.submit(Arc::clone(self)) {
            let mut state = self.state.lock();
            state.submitted = false;
            self.put(&mut state);
            return Err(e);
        }

        // A kill that started after we claimed the request may have asked
        // the transport to cancel before it knew about it.
        if self.state.lock().reject > 0 {
            transport.cancel(self);
        }
        Ok(())
    }

    /// Submit again on the transport of the last submission
    pub fn resubmit(self: &Arc<Self>) -> Result<(), TransportError> {
        let transport = self.transport().ok_or(TransportError::NoDevice)?;
        self.submit(&transport)
    }

    /// Called by the transport exactly once per accepted submission
    pub fn give_back(&self, result: UrbResult) {
        self.state.lock().submitted = false;
        trace!("urb {:?} given back: {:?}", self.kind, result);

        (self.complete)(result);

        let mut state = self.state.lock();
        self.put(&mut state);
    }

    /// Cancel the request if it is in flight and wait until it and its
    /// completion handler are done. Resubmissions are rejected meanwhile.
    ///
    /// Must not be called from this request's own completion handler.
    pub fn kill(&self) {
        let transport = {
            let mut state = self.state.lock();
            state.reject += 1;
            if state.submitted {
                state.transport.clone()
            } else {
                None
            }
        };

        if let Some(transport) = transport {
            transport.cancel(self);
        }

        let mut state = self.state.lock();
        while state.use_count > 0 {
            self.idle.wait(&mut state);
        }
        state.reject -= 1;
    }

    /// Drop the transfer buffer and the transport reference. Further
    /// submissions fail with [`TransportError::NoDevice`].
    pub fn release(&self) {
        let transport = {
            let mut state = self.state.lock();
            state.released = true;
            state.transport.take()
        };
        drop(transport);

        let mut buffer = self.buffer.lock();
        buffer.clear();
        buffer.shrink_to_fit();
    }

    fn put(&self, state: &mut UrbState) {
        state.use_count = state.use_count.saturating_sub(1);
        if state.use_count == 0 {
            self.idle.notify_all();
        }
    }
}

impl fmt::Debug for Urb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Urb")
            .field("kind", &self.kind)
            .field("pending", &self.is_pending())
            .finish()
    }
}
