use alloc::sync::Arc;

use axerrno::{AxResult, ax_err};

use crate::channel::DeviceId;
use crate::config::EventChannelConfig;
use crate::host::{HostDoorbell, IrqSink};
use crate::lifecycle::ShutdownFlag;
use crate::notify::scanner;
use crate::notify::ChannelNotifier;
use crate::registry::{ChannelRegistry, DeviceChannel};
use crate::task::TaskScheduler;

/// External services the event channels are wired to.
#[derive(Clone)]
pub struct EnclaveServices {
    /// Cooperative scheduler hosting the device workers.
    pub scheduler: Arc<dyn TaskScheduler>,
    /// Interrupt delivery into the in-enclave virtio drivers.
    pub irq: Arc<dyn IrqSink>,
    /// Cross-boundary wake of the host device handlers.
    pub doorbell: Arc<dyn HostDoorbell>,
}

/// Enclave-side event channels of all virtio devices.
///
/// Constructing one with [`VioEventChannels::initialize`] spawns a worker per
/// device; afterwards the value is the only handle to the subsystem:
///
/// - producers call [`notify`](Self::notify) after queueing outbound work,
/// - the scheduler calls [`scan_and_wake`](Self::scan_and_wake) when idle,
/// - shutdown calls [`terminate`](Self::terminate).
pub struct VioEventChannels {
    registry: ChannelRegistry,
    scheduler: Arc<dyn TaskScheduler>,
    doorbell: Arc<dyn HostDoorbell>,
    shutdown: Arc<ShutdownFlag>,
}

impl VioEventChannels {
    /// Builds the channel of every device in `config` and spawns its worker.
    ///
    /// Initialization is all-or-nothing: on error no channel is usable and
    /// any worker already spawned exits on its first resume.
    ///
    /// # Errors
    ///
    /// - `NoMemory` if channel state cannot be allocated.
    /// - `AlreadyExists` if a device is listed twice.
    /// - The scheduler's error if a worker cannot be spawned.
    pub fn initialize(config: &EventChannelConfig, services: EnclaveServices) -> AxResult<Self> {
        let shutdown = Arc::new(ShutdownFlag::new());
        let registry = ChannelRegistry::build(
            config,
            services.scheduler.as_ref(),
            &shutdown,
            &services.irq,
        )?;

        info!("vio event channels initialized: {} device(s)", registry.len());

        Ok(Self {
            registry,
            scheduler: services.scheduler,
            doorbell: services.doorbell,
            shutdown,
        })
    }

    /// Signals the host handler of `device` that `queue_index` has new work.
    ///
    /// Returns `true` if the host was parked and had to be woken.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if `device` is not in the device table.
    pub fn notify(&self, device: DeviceId, queue_index: u32) -> AxResult<bool> {
        match self.notifier(device) {
            Some(notifier) => Ok(notifier.notify(queue_index)),
            None => ax_err!(NotFound, "Device has no event channel"),
        }
    }

    /// Creates a notifier handle for `device`, for producers that signal
    /// often and want to skip the lookup.
    pub fn notifier(&self, device: DeviceId) -> Option<ChannelNotifier> {
        let channel = self.registry.get(device)?;
        Some(ChannelNotifier::new(
            Arc::clone(channel.state()),
            Arc::clone(&self.doorbell),
        ))
    }

    /// Resumes every parked worker the host has signaled since it parked.
    ///
    /// Returns `true` if any worker was woken. After
    /// [`terminate`](Self::terminate) any worker still parked is woken so it
    /// can exit.
    pub fn scan_and_wake(&self) -> bool {
        scanner::scan_and_wake(&self.registry, self.scheduler.as_ref(), &self.shutdown)
    }

    /// Requests shutdown of all workers.
    ///
    /// Raises the shutdown flag, then wakes every parked worker so it
    /// observes the flag; running workers exit at their next pass. A worker
    /// whose channel is busy during the sweep is woken by the next
    /// [`scan_and_wake`](Self::scan_and_wake). Idempotent.
    pub fn terminate(&self) {
        if self.shutdown.raise() {
            info!("vio event channels terminating");
        }
        let woken = scanner::wake_all_parked(&self.registry, self.scheduler.as_ref());
        debug!("terminate: woke {} parked worker(s)", woken);
    }

    /// Checks whether [`terminate`](Self::terminate) has been called.
    #[inline]
    pub fn is_terminated(&self) -> bool {
        self.shutdown.is_raised()
    }

    /// Gets the channel of `device`.
    #[inline]
    pub fn channel(&self, device: DeviceId) -> Option<&DeviceChannel> {
        self.registry.get(device)
    }

    /// Iterates channels in device-table order.
    #[inline]
    pub fn channels(&self) -> impl Iterator<Item = &DeviceChannel> {
        self.registry.iter()
    }

    /// Gets the number of channels.
    #[inline]
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    /// Checks whether there are no channels.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }
}

impl core::fmt::Debug for VioEventChannels {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("VioEventChannels")
            .field("channels", &self.registry)
            .field("terminated", &self.is_terminated())
            .finish()
    }
}
