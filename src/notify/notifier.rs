//! Enclave-to-host notifier.
//!
//! A producer that queued outbound work on a virtqueue calls
//! [`ChannelNotifier::notify`]. The notifier bumps the enclave-to-host
//! counter by 2 and, if the host had parked (low bit set before the bump),
//! issues exactly one cross-boundary wake.
//!
//! There is no queueing and no retry: once woken, the host drains every
//! pending queue itself.
//!
//! The queue-index slot is a plain last-writer-wins store. Two notifications
//! racing before the host reads the slot leave only the later index visible;
//! the host is expected to rescan all queues of the device anyway.

use alloc::sync::Arc;

use crate::channel::{ChannelState, DeviceId};
use crate::host::HostDoorbell;

/// Producer-side handle for signaling one device's host handler.
///
/// Cheap to clone; distinct devices can be notified concurrently.
#[derive(Clone)]
pub struct ChannelNotifier {
    channel: Arc<ChannelState>,
    doorbell: Arc<dyn HostDoorbell>,
}

impl ChannelNotifier {
    /// Creates a notifier for `channel` ringing `doorbell`.
    pub fn new(channel: Arc<ChannelState>, doorbell: Arc<dyn HostDoorbell>) -> Self {
        Self { channel, doorbell }
    }

    /// Gets the device ID for this notifier.
    pub fn device_id(&self) -> DeviceId {
        self.channel.id()
    }

    /// Signals the host that `queue_index` has new work.
    ///
    /// Returns `true` if the host was parked and a cross-boundary wake was
    /// issued.
    pub fn notify(&self, queue_index: u32) -> bool {
        let prev = self.channel.shared().post_to_host();
        self.channel.publish_queue_index(queue_index);

        let host_parked = prev & 1 == 1;
        if host_parked {
            self.doorbell.wake_host(self.channel.id());
        }
        self.channel.stats().record_notification(host_parked);

        trace!(
            "vio-{}: notify queue {} (counter {:#x}, host parked: {})",
            self.channel.id(),
            queue_index,
            prev,
            host_parked
        );
        host_parked
    }
}

impl core::fmt::Debug for ChannelNotifier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ChannelNotifier")
            .field("device_id", &self.channel.id())
            .finish()
    }
}
