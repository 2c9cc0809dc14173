#![no_std]

//! # Enclave virtio event channels
//!
//! This crate implements the enclave side of the event channels that carry
//! virtio device notifications between an enclave-resident kernel and the
//! untrusted host process. It is designed for `no_std` environments and uses
//! the `alloc` crate for dynamic memory allocation.
//!
//! Every device owns a pair of generation counters in shared memory. The
//! host bumps one to hand work to the enclave; a per-device cooperative
//! worker waits on it without busy-polling. The enclave bumps the other to
//! hand work to the host and crosses the boundary only if the host is
//! parked.
//!
//! ## Architecture
//!
//! ### Building blocks
//! - [`FairLock`]: Ticket lock arbitrating wake decisions per channel
//! - [`ShutdownFlag`] / [`WorkerPhase`]: Monotonic shutdown and worker phases
//! - [`SharedEventChannel`]: Fixed-layout record shared with the host
//! - [`ChannelRegistry`]: Per-device state, lock and worker, built once
//!
//! ### Protocol
//! - [`VioWorker`]: Publish-intent-then-recheck wait loop per device
//! - [`ChannelNotifier`]: Enclave-to-host signaling
//! - [`notify::scanner`]: Scheduler-invoked sweep resuming signaled workers
//!
//! ### High-Level API
//! - [`EventChannelConfig`]: The device table
//! - [`VioEventChannels`]: initialize / notify / scan_and_wake / terminate
//!
//! ## Collaborators
//!
//! The scheduler ([`TaskScheduler`]), interrupt delivery ([`IrqSink`]) and the
//! cross-boundary call ([`HostDoorbell`]) are supplied by the embedding
//! runtime.
//!
//! ## Examples
//!
//! ```rust,ignore
//! use vio_evtchn::{EnclaveServices, EventChannelConfig, VioEventChannels, DeviceId};
//!
//! let channels = VioEventChannels::initialize(&config, EnclaveServices {
//!     scheduler,
//!     irq,
//!     doorbell,
//! })?;
//!
//! // Driver queued a request on queue 0 of device 1
//! channels.notify(DeviceId(1), 0)?;
//!
//! // Scheduler idle loop
//! loop {
//!     if !run_ready_tasks() && !channels.scan_and_wake() {
//!         idle();
//!     }
//! }
//!
//! // Shutdown
//! channels.terminate();
//! ```

extern crate alloc;
#[macro_use]
extern crate log;

mod channel;
mod config;
mod event_channels;
mod fair_lock;
mod host;
mod lifecycle;
mod registry;
mod task;
mod worker;
pub mod notify;

#[cfg(test)]
mod test_support;

pub use channel::{ChannelState, ChannelStats, DeviceId, SharedEventChannel};
pub use config::{DeviceChannelConfig, EventChannelConfig};
pub use event_channels::{EnclaveServices, VioEventChannels};
pub use fair_lock::{FairLock, FairLockGuard};
pub use host::{HostDoorbell, IrqSink};
pub use lifecycle::{PhaseCell, ShutdownFlag, WorkerPhase};
pub use notify::ChannelNotifier;
pub use registry::{ChannelRegistry, DeviceChannel};
pub use task::{CooperativeTask, TaskId, TaskName, TaskScheduler, TaskState, TaskStep, worker_name};
pub use worker::VioWorker;
