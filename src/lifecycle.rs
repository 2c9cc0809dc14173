//! Worker lifecycle tracking and the global shutdown flag.
//!
//! Both are plain atomics so they can be read from every execution context
//! (workers, scanner, notifier) without taking any lock.

use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Phases of a device worker's wait protocol.
///
/// ```text
///            CAS ok            recheck unchanged
/// ┌─────────┐ ────> ┌────────────┐ ────> ┌──────────┐
/// │ Running │       │ Announcing │       │ Sleeping │
/// └─────────┘ <──── └────────────┘       └──────────┘
///      │ ▲   counter moved (self-skip)         │
///      │ └─────────────────────────────────────┘
///      │                  external wake
///      ▼ shutdown
/// ┌──────┐
/// │ Done │
/// └──────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerPhase {
    /// Checking the counter and delivering pending events.
    Running = 0,
    /// Intent to sleep has been published; re-checking the counter.
    Announcing = 1,
    /// Parked until an external wake.
    Sleeping = 2,
    /// Exited after shutdown. Terminal.
    Done = 3,
}

impl WorkerPhase {
    const fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Running,
            1 => Self::Announcing,
            2 => Self::Sleeping,
            _ => Self::Done,
        }
    }
}

/// Atomic cell holding a [`WorkerPhase`].
///
/// Written only by the owning worker; read by anyone for diagnostics.
#[derive(Debug)]
pub struct PhaseCell(AtomicU8);

impl PhaseCell {
    /// Creates a cell in the `Running` phase.
    pub const fn new() -> Self {
        Self(AtomicU8::new(WorkerPhase::Running as u8))
    }

    /// Gets the current phase.
    #[inline]
    pub fn get(&self) -> WorkerPhase {
        WorkerPhase::from_raw(self.0.load(Ordering::SeqCst))
    }

    /// Moves to `phase`. `Done` is sticky.
    #[inline]
    pub fn set(&self, phase: WorkerPhase) {
        let _ = self
            .0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |raw| {
                (raw != WorkerPhase::Done as u8).then_some(phase as u8)
            });
    }
}

impl Default for PhaseCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Monotonic shutdown flag: false until [`ShutdownFlag::raise`], then true
/// for the rest of the process lifetime.
#[derive(Debug, Default)]
pub struct ShutdownFlag(AtomicBool);

impl ShutdownFlag {
    /// Creates a lowered flag.
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Raises the flag.
    ///
    /// Returns `true` only for the call that performed the transition.
    #[inline]
    pub fn raise(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }

    /// Checks whether shutdown has been requested.
    #[inline]
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
