//! Device channel registry.
//!
//! Built once from the device table. For every entry it creates the channel
//! state, the channel's fair lock and the channel's worker task. The set of
//! devices is fixed afterwards.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;

use axerrno::{AxResult, ax_err};

use crate::channel::{ChannelState, DeviceId};
use crate::config::{DeviceChannelConfig, EventChannelConfig};
use crate::fair_lock::FairLock;
use crate::host::IrqSink;
use crate::lifecycle::ShutdownFlag;
use crate::task::{TaskId, TaskScheduler, TaskState, worker_name};
use crate::worker::VioWorker;

/// A registered device channel together with its lock and worker.
pub struct DeviceChannel {
    state: Arc<ChannelState>,
    /// Serializes wake decisions for this channel.
    lock: FairLock,
    task: TaskId,
}

impl DeviceChannel {
    /// Gets the device ID.
    #[inline]
    pub fn id(&self) -> DeviceId {
        self.state.id()
    }

    /// Gets the channel state shared with the worker.
    #[inline]
    pub fn state(&self) -> &Arc<ChannelState> {
        &self.state
    }

    /// Gets the fair lock guarding wake decisions.
    #[inline]
    pub fn lock(&self) -> &FairLock {
        &self.lock
    }

    /// Gets the worker task handle.
    #[inline]
    pub fn task(&self) -> TaskId {
        self.task
    }

    /// Evaluates the wake predicate. Caller must hold [`Self::lock`].
    ///
    /// Normally a worker is woken only when the host moved past the
    /// generation it slept on. While `draining` (shutdown requested) any
    /// parked worker is woken so it can observe the flag and exit.
    pub(crate) fn should_wake(&self, scheduler: &dyn TaskScheduler, draining: bool) -> bool {
        if !draining && !self.state.has_unseen_events() {
            return false;
        }
        scheduler.state(self.task) == TaskState::Sleeping
    }
}

impl core::fmt::Debug for DeviceChannel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DeviceChannel")
            .field("state", &self.state)
            .field("lock", &self.lock)
            .field("task", &self.task)
            .finish()
    }
}

/// Fixed set of device channels in device-table order.
pub struct ChannelRegistry {
    channels: Vec<DeviceChannel>,
    /// Maps device IDs to positions in `channels`.
    index: BTreeMap<DeviceId, usize>,
}

impl ChannelRegistry {
    /// Builds every channel described by `config` and spawns its worker.
    ///
    /// Workers observe `shutdown`; if building fails part way, `shutdown` is
    /// raised and every worker spawned so far is woken, so they exit on
    /// their first resume without touching shared memory.
    ///
    /// # Errors
    ///
    /// - `NoMemory` if channel storage cannot be reserved.
    /// - `AlreadyExists` if the table lists a device twice.
    /// - Whatever the scheduler reports if a worker cannot be spawned.
    pub fn build(
        config: &EventChannelConfig,
        scheduler: &dyn TaskScheduler,
        shutdown: &Arc<ShutdownFlag>,
        irq: &Arc<dyn IrqSink>,
    ) -> AxResult<Self> {
        let mut registry = Self {
            channels: Vec::new(),
            index: BTreeMap::new(),
        };

        if registry
            .channels
            .try_reserve_exact(config.devices.len())
            .is_err()
        {
            return ax_err!(NoMemory, "Could not allocate event channel table");
        }

        for entry in &config.devices {
            if let Err(err) = registry.add(entry, scheduler, shutdown, irq) {
                registry.abandon(scheduler, shutdown);
                return Err(err);
            }
        }

        Ok(registry)
    }

    fn add(
        &mut self,
        entry: &DeviceChannelConfig,
        scheduler: &dyn TaskScheduler,
        shutdown: &Arc<ShutdownFlag>,
        irq: &Arc<dyn IrqSink>,
    ) -> AxResult {
        let id = entry.dev_id;
        if self.index.contains_key(&id) {
            return ax_err!(AlreadyExists, "Device event channel already registered");
        }

        let state = ChannelState::new(id, entry.channel, entry.queue_index);
        let worker = VioWorker::new(Arc::clone(&state), Arc::clone(shutdown), Arc::clone(irq));
        let task = scheduler.spawn(worker_name(id), Box::new(worker))?;

        debug!("vio-{}: worker spawned as {:?}", id, task);

        self.index.insert(id, self.channels.len());
        self.channels.push(DeviceChannel {
            state,
            lock: FairLock::new(),
            task,
        });
        Ok(())
    }

    /// Releases the workers of a registry that failed to build.
    fn abandon(&self, scheduler: &dyn TaskScheduler, shutdown: &ShutdownFlag) {
        shutdown.raise();
        for channel in &self.channels {
            scheduler.wakeup(channel.task);
        }
        warn!(
            "event channel setup aborted, released {} worker(s)",
            self.channels.len()
        );
    }

    /// Gets a channel by device ID.
    #[inline]
    pub fn get(&self, id: DeviceId) -> Option<&DeviceChannel> {
        self.index.get(&id).map(|&pos| &self.channels[pos])
    }

    /// Iterates channels in device-table order.
    #[inline]
    pub fn iter(&self) -> core::slice::Iter<'_, DeviceChannel> {
        self.channels.iter()
    }

    /// Lists all registered device IDs in table order.
    pub fn ids(&self) -> Vec<DeviceId> {
        self.channels.iter().map(DeviceChannel::id).collect()
    }

    /// Gets the number of registered channels.
    #[inline]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Checks whether the registry is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

impl core::fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.channels.iter()).finish()
    }
}
