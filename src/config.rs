use alloc::vec::Vec;
use core::sync::atomic::AtomicU32;

use crate::channel::{DeviceId, SharedEventChannel};

/// One entry of the device table handed over by the bootstrap code.
///
/// The referenced memory is allocated and owned by the bootstrap and stays
/// mapped for the lifetime of the process.
#[derive(Debug, Clone, Copy)]
pub struct DeviceChannelConfig {
    /// Device identifier.
    pub dev_id: DeviceId,
    /// Event-channel record shared with the host.
    pub channel: &'static SharedEventChannel,
    /// Slot the notifier publishes the last kicked queue index into.
    pub queue_index: &'static AtomicU32,
}

impl DeviceChannelConfig {
    /// Creates a device table entry.
    pub const fn new(
        dev_id: DeviceId,
        channel: &'static SharedEventChannel,
        queue_index: &'static AtomicU32,
    ) -> Self {
        Self {
            dev_id,
            channel,
            queue_index,
        }
    }
}

/// The ordered device table
#[derive(Debug, Clone, Default)]
pub struct EventChannelConfig {
    /// The vector of DeviceChannelConfig
    pub devices: Vec<DeviceChannelConfig>,
}

impl EventChannelConfig {
    /// Creates a configuration from a device table.
    pub fn new(devices: Vec<DeviceChannelConfig>) -> Self {
        Self { devices }
    }

    /// Appends a device, keeping table order.
    pub fn with_device(mut self, device: DeviceChannelConfig) -> Self {
        self.devices.push(device);
        self
    }
}
