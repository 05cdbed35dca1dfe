//! Session lock and caller interruption
//!
//! Lock order, everywhere: registry (disconnect) lock, then a device's
//! session lock, then its command lock. The command lock is never held
//! across a call that may block.

use crate::error::DriverError;
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// How often a blocked interruptible acquisition rechecks its interrupt
const INTERRUPT_POLL: Duration = Duration::from_millis(20);

/// Pending-signal flag of one caller
///
/// Raising it makes a blocked [`SessionLock::lock_interruptible`] give up
/// with [`DriverError::Restart`].
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Blocking per-device lock whose acquisition can be interrupted
pub struct SessionLock<T> {
    inner: Mutex<T>,
}

impl<T> SessionLock<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    /// Wait for the lock; cannot be interrupted
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock()
    }

    /// Wait for the lock until it is free or `interrupt` is raised.
    ///
    /// A free lock is taken even if the interrupt is already raised.
    pub fn lock_interruptible(&self, interrupt: &Interrupt) -> Result<MutexGuard<'_, T>, DriverError> {
        loop {
            if let Some(guard) = self.inner.try_lock_for(INTERRUPT_POLL) {
                return Ok(guard);
            }
            if interrupt.is_raised() {
                return Err(DriverError::Restart);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;

    #[test]
    fn test_free_lock_ignores_raised_interrupt() {
        let lock = SessionLock::new(5u32);
        let interrupt = Interrupt::new();
        interrupt.raise();

        let guard = lock.lock_interruptible(&interrupt).unwrap();
        assert_eq!(*guard, 5);
    }

    #[test]
    fn test_raised_interrupt_aborts_wait() {
        let lock = Arc::new(SessionLock::new(()));
        let interrupt = Interrupt::new();
        let (locked_tx, locked_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel::<()>();

        let holder = {
            let lock = lock.clone();
            thread::spawn(move || {
                let _guard = lock.lock();
                locked_tx.send(()).unwrap();
                let _ = done_rx.recv();
            })
        };
        locked_rx.recv().unwrap();

        let waiter = {
            let lock = lock.clone();
            let interrupt = interrupt.clone();
            thread::spawn(move || lock.lock_interruptible(&interrupt).map(|_| ()))
        };
        thread::sleep(Duration::from_millis(50));
        interrupt.raise();

        assert_eq!(waiter.join().unwrap(), Err(DriverError::Restart));
        done_tx.send(()).unwrap();
        holder.join().unwrap();
    }

    #[test]
    fn test_interrupt_clear() {
        let interrupt = Interrupt::new();
        let clone = interrupt.clone();
        clone.raise();
        assert!(interrupt.is_raised());
        interrupt.clear();
        assert!(!clone.is_raised());
    }
}
