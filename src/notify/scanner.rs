//! Wakeup scanner.
//!
//! Invoked by the scheduler whenever it has nothing else to run. For every
//! channel it tries the channel's fair lock once; a busy lock means another
//! context is already deciding for that channel, so the channel is left for
//! the next pass. Under the lock the wake predicate is evaluated and, if it
//! holds, the worker is resumed.
//!
//! Holding the lock across "evaluate predicate, wake" ensures two concurrent
//! passes never both wake the same worker for the same generation: the
//! second one sees the task no longer sleeping.

use crate::lifecycle::ShutdownFlag;
use crate::registry::{ChannelRegistry, DeviceChannel};
use crate::task::TaskScheduler;

/// Runs one scan over all channels.
///
/// Returns `true` if any worker was woken, so the caller can run it instead
/// of idling.
pub fn scan_and_wake(
    registry: &ChannelRegistry,
    scheduler: &dyn TaskScheduler,
    shutdown: &ShutdownFlag,
) -> bool {
    let draining = shutdown.is_raised();
    let mut woke = false;

    for channel in registry.iter() {
        let Some(guard) = channel.lock().try_acquire() else {
            trace!("vio-{}: scan skipped, lock busy", channel.id());
            continue;
        };
        woke |= wake_if_needed(channel, scheduler, draining);
        guard.release();
    }

    woke
}

/// Wakes every parked worker regardless of pending events.
///
/// Used by shutdown. Busy channels are skipped like in [`scan_and_wake`];
/// once shutdown is raised every later scan drains them. Returns the number
/// of workers woken.
pub fn wake_all_parked(registry: &ChannelRegistry, scheduler: &dyn TaskScheduler) -> usize {
    let mut woken = 0;
    for channel in registry.iter() {
        let Some(guard) = channel.lock().try_acquire() else {
            trace!("vio-{}: shutdown sweep skipped, lock busy", channel.id());
            continue;
        };
        if wake_if_needed(channel, scheduler, true) {
            woken += 1;
        }
        guard.release();
    }
    woken
}

fn wake_if_needed(channel: &DeviceChannel, scheduler: &dyn TaskScheduler, draining: bool) -> bool {
    if !channel.should_wake(scheduler, draining) {
        return false;
    }

    trace!(
        "vio-{}: waking worker (counter {:#x}, processed {:#x})",
        channel.id(),
        channel.state().shared().host_events(),
        channel.state().processed()
    );
    scheduler.wakeup(channel.task());
    channel.state().stats().record_scan_wakeup();
    true
}
