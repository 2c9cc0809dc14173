//! Per-device worker task.
//!
//! Each device gets one cooperative worker that waits for the host to bump
//! the channel's host-to-enclave counter and forwards new generations to the
//! interrupt sink.
//!
//! # Wait protocol
//!
//! 1. Load the counter. If it moved since the last pass there is work: go
//!    straight to delivery.
//! 2. Otherwise CAS `cur -> cur + 1`, publishing the intent to sleep in the
//!    low bit. A failed CAS means the host raced in; reload and start over
//!    (a bounded number of times per pass).
//! 3. Re-check the counter. If it is no longer `cur + 1`, the host bumped it
//!    after the CAS: clear the bit and deliver instead of sleeping.
//! 4. Park. The wakeup scanner resumes the task once the counter moves past
//!    the announced value.
//! 5. On resume, clear the intent bit; the result is the generation to
//!    deliver.
//!
//! Step 3 is what makes it safe to park without holding a lock: any host
//! increment either lands before the re-check (and is seen) or after it (and
//! makes the counter exceed `processed + 1`, which the scanner acts on).

use alloc::sync::Arc;

use crate::channel::ChannelState;
use crate::host::IrqSink;
use crate::lifecycle::{ShutdownFlag, WorkerPhase};
use crate::task::{CooperativeTask, TaskStep};

/// CAS attempts per pass before yielding back to the scheduler.
const MAX_ANNOUNCE_ATTEMPTS: usize = 64;

/// Result of one pass over the wait protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wait {
    /// The counter holds this value and may carry new work.
    Ready(u64),
    /// Intent published and unchanged; the task must park.
    Park,
}

/// Cooperative worker bound to one device channel.
pub struct VioWorker {
    channel: Arc<ChannelState>,
    shutdown: Arc<ShutdownFlag>,
    irq: Arc<dyn IrqSink>,
    /// Counter value the previous pass ended on.
    last_seen: u64,
}

impl VioWorker {
    /// Creates a worker for `channel`. It starts in the `Running` phase.
    pub fn new(
        channel: Arc<ChannelState>,
        shutdown: Arc<ShutdownFlag>,
        irq: Arc<dyn IrqSink>,
    ) -> Self {
        Self {
            channel,
            shutdown,
            irq,
            last_seen: 0,
        }
    }

    /// Gets the channel this worker serves.
    pub fn channel(&self) -> &Arc<ChannelState> {
        &self.channel
    }

    fn wait_for_host_event(&mut self) -> Wait {
        self.wait_with_budget(MAX_ANNOUNCE_ATTEMPTS)
    }

    fn wait_with_budget(&mut self, attempts: usize) -> Wait {
        let shared = self.channel.shared();
        let mut target = self.last_seen;

        for _ in 0..attempts {
            let cur = shared.host_events();
            if cur != target {
                return Wait::Ready(cur);
            }

            target = cur.wrapping_add(1);
            if let Some(wait) = self.try_announce(cur) {
                return wait;
            }
        }

        // Give up for this pass; the scheduler resumes us right away.
        Wait::Ready(shared.host_events())
    }

    /// Publishes the intent to sleep on top of `cur`, the value just loaded.
    ///
    /// Returns `None` if the host moved the counter since it was loaded.
    fn try_announce(&mut self, cur: u64) -> Option<Wait> {
        match self.channel.shared().announce_sleep(cur) {
            Ok(_) => Some(self.recheck_before_park(cur.wrapping_add(1))),
            Err(found) => {
                trace!(
                    "vio-{}: counter moved {:#x} -> {:#x} during announce",
                    self.channel.id(),
                    cur,
                    found
                );
                None
            }
        }
    }

    fn recheck_before_park(&mut self, announced: u64) -> Wait {
        self.channel.set_phase(WorkerPhase::Announcing);

        let now = self.channel.shared().host_events();
        if now != announced || self.shutdown.is_raised() {
            trace!(
                "vio-{}: skipping sleep, counter {:#x} announced {:#x}",
                self.channel.id(),
                now,
                announced
            );
            let cur = self.channel.shared().clear_sleep_intent();
            self.channel.set_phase(WorkerPhase::Running);
            return Wait::Ready(cur);
        }

        self.channel.set_phase(WorkerPhase::Sleeping);
        self.channel.stats().record_park();
        Wait::Park
    }

    /// Delivers an interrupt if `cur` is a generation not yet handed out.
    fn process(&mut self, cur: u64) {
        self.last_seen = cur;
        if cur > self.channel.processed() {
            self.irq.deliver_irq(self.channel.id());
            self.channel.set_processed(cur);
            self.channel.stats().record_irq();
        }
    }
}

impl CooperativeTask for VioWorker {
    fn resume(&mut self) -> TaskStep {
        if self.channel.phase() == WorkerPhase::Sleeping {
            let cur = self.channel.shared().clear_sleep_intent();
            debug!("vio-{}: woken at {:#x}", self.channel.id(), cur);
            self.channel.set_phase(WorkerPhase::Running);
            self.process(cur);
        }

        if self.shutdown.is_raised() {
            debug!("vio-{}: shutdown, exiting", self.channel.id());
            self.channel.set_phase(WorkerPhase::Done);
            return TaskStep::Exit;
        }

        match self.wait_for_host_event() {
            Wait::Ready(cur) => {
                self.process(cur);
                TaskStep::Yield
            }
            Wait::Park => TaskStep::Park,
        }
    }
}

impl core::fmt::Debug for VioWorker {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("VioWorker")
            .field("channel", &self.channel)
            .field("last_seen", &self.last_seen)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{DeviceId, SharedEventChannel};
    use alloc::boxed::Box;
    use alloc::vec::Vec;
    use core::sync::atomic::AtomicU32;
    use spin::Mutex;

    #[derive(Default)]
    struct RecordingIrq {
        delivered: Mutex<Vec<DeviceId>>,
    }

    impl IrqSink for RecordingIrq {
        fn deliver_irq(&self, device: DeviceId) {
            self.delivered.lock().push(device);
        }
    }

    fn make_worker(id: usize) -> (VioWorker, Arc<RecordingIrq>, Arc<ShutdownFlag>) {
        make_worker_at(id, 0)
    }

    fn make_worker_at(
        id: usize,
        host_to_enclave: u64,
    ) -> (VioWorker, Arc<RecordingIrq>, Arc<ShutdownFlag>) {
        let shared: &'static SharedEventChannel =
            Box::leak(Box::new(SharedEventChannel::with_counters(host_to_enclave, 0)));
        let slot: &'static AtomicU32 = Box::leak(Box::new(AtomicU32::new(0)));
        let channel = ChannelState::new(DeviceId(id), shared, slot);
        let irq = Arc::new(RecordingIrq::default());
        let shutdown = Arc::new(ShutdownFlag::new());
        let worker = VioWorker::new(channel, Arc::clone(&shutdown), irq.clone());
        (worker, irq, shutdown)
    }

    #[test]
    fn test_idle_worker_parks_with_intent_bit() {
        let (mut worker, irq, _) = make_worker(0);

        assert_eq!(worker.resume(), TaskStep::Park);
        assert_eq!(worker.channel().phase(), WorkerPhase::Sleeping);
        assert_eq!(worker.channel().shared().host_events(), 1);
        assert!(irq.delivered.lock().is_empty());
        assert_eq!(worker.channel().stats().parks(), 1);
    }

    #[test]
    fn test_event_before_first_run_skips_sleep() {
        // Host bumped the counter before the worker ever ran
        let (mut worker, irq, _) = make_worker_at(3, 1);

        assert_eq!(worker.resume(), TaskStep::Yield);
        assert_eq!(worker.channel().processed(), 1);
        assert_eq!(irq.delivered.lock().as_slice(), &[DeviceId(3)]);
        assert_eq!(worker.channel().stats().parks(), 0);
        assert_eq!(worker.channel().phase(), WorkerPhase::Running);
    }

    #[test]
    fn test_wake_clears_intent_and_delivers() {
        let (mut worker, irq, _) = make_worker(1);
        let shared = worker.channel().shared();

        assert_eq!(worker.resume(), TaskStep::Park);

        // Host adds two generations while the worker sleeps
        shared.signal_enclave();
        shared.signal_enclave();
        assert!(worker.channel().has_unseen_events());

        // Resumed by the scanner: delivers once, then parks again
        assert_eq!(worker.resume(), TaskStep::Park);
        assert_eq!(worker.channel().processed(), 4);
        assert_eq!(irq.delivered.lock().len(), 1);
        assert_eq!(shared.host_events(), 5);
        assert!(!worker.channel().has_unseen_events());
    }

    #[test]
    fn test_steady_state_without_new_events_does_not_redeliver() {
        let (mut worker, irq, _) = make_worker(2);
        let shared = worker.channel().shared();

        shared.signal_enclave();
        assert_eq!(worker.resume(), TaskStep::Yield);
        assert_eq!(irq.delivered.lock().len(), 1);

        // Nothing new: the next pass announces and parks
        assert_eq!(worker.resume(), TaskStep::Park);
        assert_eq!(shared.host_events(), 3);
        assert_eq!(irq.delivered.lock().len(), 1);
    }

    #[test]
    fn test_shutdown_exits_without_touching_counter() {
        let (mut worker, irq, shutdown) = make_worker(4);

        shutdown.raise();
        assert_eq!(worker.resume(), TaskStep::Exit);
        assert_eq!(worker.channel().phase(), WorkerPhase::Done);
        assert_eq!(worker.channel().shared().host_events(), 0);
        assert!(irq.delivered.lock().is_empty());
    }

    #[test]
    fn test_host_bump_after_announce_skips_sleep() {
        let (mut worker, _, _) = make_worker(0);
        let shared = worker.channel().shared();

        // Host bumps between the CAS and the re-check
        assert!(shared.announce_sleep(0).is_ok());
        shared.signal_enclave();

        assert_eq!(worker.recheck_before_park(1), Wait::Ready(2));
        assert_eq!(shared.host_events(), 2);
        assert_eq!(worker.channel().phase(), WorkerPhase::Running);
        assert_eq!(worker.channel().stats().parks(), 0);
    }

    #[test]
    fn test_shutdown_during_announce_skips_sleep() {
        let (mut worker, _, shutdown) = make_worker(1);
        let shared = worker.channel().shared();

        assert!(shared.announce_sleep(0).is_ok());
        shutdown.raise();

        assert_eq!(worker.recheck_before_park(1), Wait::Ready(0));
        assert_eq!(shared.host_events(), 0);
        assert_eq!(worker.channel().phase(), WorkerPhase::Running);

        // Next pass exits instead of parking
        assert_eq!(worker.resume(), TaskStep::Exit);
        assert_eq!(shared.host_events(), 0);
    }

    #[test]
    fn test_failed_announce_leaves_counter_alone() {
        let (mut worker, _, _) = make_worker(2);
        let shared = worker.channel().shared();

        // Loaded 0, but the host got to 2 before the CAS
        shared.signal_enclave();
        assert_eq!(worker.try_announce(0), None);
        assert_eq!(shared.host_events(), 2);
        assert_eq!(worker.channel().phase(), WorkerPhase::Running);

        // The retry sees the new generation
        assert_eq!(worker.wait_with_budget(1), Wait::Ready(2));
    }

    #[test]
    fn test_exhausted_announce_budget_yields() {
        let (mut worker, irq, _) = make_worker(3);
        let shared = worker.channel().shared();

        assert_eq!(worker.wait_with_budget(0), Wait::Ready(0));
        assert_eq!(shared.host_events(), 0);

        // Unchanged counter carries nothing to deliver
        worker.process(0);
        assert!(irq.delivered.lock().is_empty());
        assert_eq!(worker.channel().processed(), 0);
    }

    #[test]
    fn test_shutdown_while_parked() {
        let (mut worker, _, shutdown) = make_worker(5);
        let shared = worker.channel().shared();

        assert_eq!(worker.resume(), TaskStep::Park);
        shutdown.raise();

        // Forced wake: clears the intent bit, then exits
        assert_eq!(worker.resume(), TaskStep::Exit);
        assert_eq!(shared.host_events(), 0);
        assert_eq!(worker.channel().phase(), WorkerPhase::Done);
    }
}
