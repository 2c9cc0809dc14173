//! Collaborators on either side of the event channel.

use crate::channel::DeviceId;

/// Delivers a virtio interrupt to the in-enclave device driver.
pub trait IrqSink: Send + Sync {
    /// Signals that the host produced work for `device`.
    fn deliver_irq(&self, device: DeviceId);
}

/// Cross-boundary call asking the host to resume its device handler.
///
/// Expensive: every call leaves the enclave.
pub trait HostDoorbell: Send + Sync {
    /// Wakes the parked host handler of `device`.
    fn wake_host(&self, device: DeviceId);
}
