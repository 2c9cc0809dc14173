//! Shared event-channel records and per-device channel state.

use alloc::sync::Arc;
use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::lifecycle::{PhaseCell, WorkerPhase};

/// Identifier of a virtio device, as assigned by the device table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceId(pub usize);

impl core::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Event-channel record living in memory shared with the untrusted host.
///
/// Layout: `[host_to_enclave: u64 | enclave_to_host: u64]`
///
/// - `host_to_enclave` is a generation counter the host bumps by 2 for every
///   batch of work. Its low bit belongs to the enclave worker and means
///   "worker intends to sleep".
/// - `enclave_to_host` is bumped by 2 by the enclave notifier. Its low bit
///   belongs to the host and means "host is parked".
///
/// Every access is sequentially consistent: the two sides share no scheduler
/// and no other synchronization.
#[repr(C)]
#[derive(Debug, Default)]
pub struct SharedEventChannel {
    host_to_enclave: AtomicU64,
    enclave_to_host: AtomicU64,
}

const _: () = assert!(core::mem::size_of::<SharedEventChannel>() == 16);

impl SharedEventChannel {
    /// Generation step of both counters. The low bit is the parked flag.
    pub const GENERATION_STEP: u64 = 2;

    /// Creates a zeroed record, usable in `static` context.
    pub const fn new() -> Self {
        Self {
            host_to_enclave: AtomicU64::new(0),
            enclave_to_host: AtomicU64::new(0),
        }
    }

    /// Creates a record with explicit starting counter values.
    pub const fn with_counters(host_to_enclave: u64, enclave_to_host: u64) -> Self {
        Self {
            host_to_enclave: AtomicU64::new(host_to_enclave),
            enclave_to_host: AtomicU64::new(enclave_to_host),
        }
    }

    /// Current value of the host-to-enclave counter.
    #[inline]
    pub fn host_events(&self) -> u64 {
        self.host_to_enclave.load(Ordering::SeqCst)
    }

    /// Current value of the enclave-to-host counter.
    #[inline]
    pub fn enclave_events(&self) -> u64 {
        self.enclave_to_host.load(Ordering::SeqCst)
    }

    /// Publishes the worker's intent to sleep by moving the counter from
    /// `observed` to `observed + 1`.
    ///
    /// On failure returns the value actually found.
    #[inline]
    pub(crate) fn announce_sleep(&self, observed: u64) -> Result<u64, u64> {
        self.host_to_enclave.compare_exchange(
            observed,
            observed.wrapping_add(1),
            Ordering::SeqCst,
            Ordering::SeqCst,
        )
    }

    /// Clears the intent-to-sleep bit, returning the resulting counter value.
    #[inline]
    pub(crate) fn clear_sleep_intent(&self) -> u64 {
        self.host_to_enclave
            .fetch_sub(1, Ordering::SeqCst)
            .wrapping_sub(1)
    }

    /// Advances the enclave-to-host generation, returning the previous value.
    #[inline]
    pub(crate) fn post_to_host(&self) -> u64 {
        self.enclave_to_host
            .fetch_add(Self::GENERATION_STEP, Ordering::SeqCst)
    }

    /// Host side: announces a new batch of work to the enclave worker.
    ///
    /// Returns the new counter value.
    pub fn signal_enclave(&self) -> u64 {
        self.host_to_enclave
            .fetch_add(Self::GENERATION_STEP, Ordering::SeqCst)
            .wrapping_add(Self::GENERATION_STEP)
    }

    /// Host side: sets or clears the "host is parked" bit.
    pub fn set_host_parked(&self, parked: bool) {
        if parked {
            self.enclave_to_host.fetch_or(1, Ordering::SeqCst);
        } else {
            self.enclave_to_host.fetch_and(!1, Ordering::SeqCst);
        }
    }
}

/// Per-channel operation counters.
#[derive(Debug, Default)]
pub struct ChannelStats {
    irqs_delivered: AtomicU64,
    parks: AtomicU64,
    scan_wakeups: AtomicU64,
    notifications: AtomicU64,
    host_wakeups: AtomicU64,
}

impl ChannelStats {
    /// Creates zeroed statistics.
    pub const fn new() -> Self {
        Self {
            irqs_delivered: AtomicU64::new(0),
            parks: AtomicU64::new(0),
            scan_wakeups: AtomicU64::new(0),
            notifications: AtomicU64::new(0),
            host_wakeups: AtomicU64::new(0),
        }
    }

    #[inline]
    pub(crate) fn record_irq(&self) {
        self.irqs_delivered.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_park(&self) {
        self.parks.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_scan_wakeup(&self) {
        self.scan_wakeups.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_notification(&self, woke_host: bool) {
        self.notifications.fetch_add(1, Ordering::Relaxed);
        if woke_host {
            self.host_wakeups.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Interrupts delivered by the worker.
    pub fn irqs_delivered(&self) -> u64 {
        self.irqs_delivered.load(Ordering::Relaxed)
    }

    /// Times the worker parked.
    pub fn parks(&self) -> u64 {
        self.parks.load(Ordering::Relaxed)
    }

    /// Wakes issued to the worker by the scanner or the shutdown sweep.
    pub fn scan_wakeups(&self) -> u64 {
        self.scan_wakeups.load(Ordering::Relaxed)
    }

    /// Calls to `notify` for this device.
    pub fn notifications(&self) -> u64 {
        self.notifications.load(Ordering::Relaxed)
    }

    /// Cross-boundary host wakes issued by `notify`.
    pub fn host_wakeups(&self) -> u64 {
        self.host_wakeups.load(Ordering::Relaxed)
    }
}

/// State of one device channel, shared by its worker, the scanner and the
/// notifier.
pub struct ChannelState {
    id: DeviceId,
    shared: &'static SharedEventChannel,
    queue_index: &'static AtomicU32,
    /// Last host generation handed to the interrupt sink.
    /// Single writer: the device's worker.
    processed: AtomicU64,
    phase: PhaseCell,
    stats: ChannelStats,
}

impl ChannelState {
    pub(crate) fn new(
        id: DeviceId,
        shared: &'static SharedEventChannel,
        queue_index: &'static AtomicU32,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            shared,
            queue_index,
            processed: AtomicU64::new(0),
            phase: PhaseCell::new(),
            stats: ChannelStats::new(),
        })
    }

    /// Gets the device ID.
    #[inline]
    pub fn id(&self) -> DeviceId {
        self.id
    }

    /// Gets the shared record.
    #[inline]
    pub fn shared(&self) -> &'static SharedEventChannel {
        self.shared
    }

    /// Last queue index published by `notify`.
    #[inline]
    pub fn queue_index(&self) -> u32 {
        self.queue_index.load(Ordering::SeqCst)
    }

    #[inline]
    pub(crate) fn publish_queue_index(&self, queue_index: u32) {
        self.queue_index.store(queue_index, Ordering::SeqCst);
    }

    /// Last host generation the worker has processed.
    #[inline]
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::SeqCst)
    }

    #[inline]
    pub(crate) fn set_processed(&self, value: u64) {
        self.processed.store(value, Ordering::SeqCst);
    }

    /// Current wait-protocol phase of the worker.
    #[inline]
    pub fn phase(&self) -> WorkerPhase {
        self.phase.get()
    }

    #[inline]
    pub(crate) fn set_phase(&self, phase: WorkerPhase) {
        self.phase.set(phase);
    }

    /// Gets the channel statistics.
    #[inline]
    pub fn stats(&self) -> &ChannelStats {
        &self.stats
    }

    /// Whether the host has moved past the generation the worker slept on.
    ///
    /// The counter must carry the intent bit (odd) and exceed
    /// `processed + 1`: the `+ 1` is the intent bit itself, anything beyond
    /// it arrived after the worker committed to sleep.
    #[inline]
    pub fn has_unseen_events(&self) -> bool {
        let cur = self.shared.host_events();
        cur & 1 == 1 && cur > self.processed().wrapping_add(1)
    }
}

impl core::fmt::Debug for ChannelState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ChannelState")
            .field("id", &self.id)
            .field("host_to_enclave", &self.shared.host_events())
            .field("enclave_to_host", &self.shared.enclave_events())
            .field("processed", &self.processed())
            .field("phase", &self.phase())
            .finish()
    }
}
