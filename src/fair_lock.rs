//! Ticket-based fair lock guarding per-channel wake decisions.
//!
//! Waiters are served strictly in arrival order through a ticket/serving
//! counter pair (both wrap around safely). The scanner and the shutdown
//! sweep only ever use [`FairLock::try_acquire`], which makes a single
//! bounded attempt and never spins.
//!
//! The lock is never held across a task suspension point.

use spin::mutex::{TicketMutex, TicketMutexGuard};

/// A fair (FIFO) mutual-exclusion primitive without protected data.
pub struct FairLock {
    inner: TicketMutex<()>,
}

/// Proof of ownership of a [`FairLock`]. Dropping it releases the lock and
/// admits the next ticket holder.
pub struct FairLockGuard<'a> {
    _inner: TicketMutexGuard<'a, ()>,
}

impl FairLock {
    /// Creates a new, unlocked fair lock.
    pub const fn new() -> Self {
        Self {
            inner: TicketMutex::new(()),
        }
    }

    /// Blocks until the lock is granted, in ticket order.
    #[inline]
    pub fn acquire(&self) -> FairLockGuard<'_> {
        FairLockGuard {
            _inner: self.inner.lock(),
        }
    }

    /// Makes one attempt to take the lock.
    ///
    /// Returns `None` if the lock is held or other tickets are queued.
    #[inline]
    pub fn try_acquire(&self) -> Option<FairLockGuard<'_>> {
        self.inner.try_lock().map(|guard| FairLockGuard { _inner: guard })
    }

    /// Returns `true` if someone currently owns the lock.
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }
}

impl FairLockGuard<'_> {
    /// Releases the lock explicitly.
    #[inline]
    pub fn release(self) {}
}

impl Default for FairLock {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for FairLock {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FairLock")
            .field("locked", &self.is_locked())
            .finish()
    }
}
