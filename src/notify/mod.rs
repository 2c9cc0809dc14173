//! Signaling in both directions across the enclave boundary.
//!
//! ```text
//!        enclave                          shared memory                host
//!
//!  producer --notify()------> enclave_to_host (+2) ---------> host handler
//!               |             low bit: host parked                 ^
//!               +------ wake_host() only if parked ----------------+
//!
//!  worker <--scan_and_wake()-- host_to_enclave (+2) <-------- host handler
//!                              low bit: worker intends to sleep
//! ```
//!
//! - [`notifier`]: enclave-to-host path, used by producers of outbound work.
//! - [`scanner`]: host-to-enclave path, invoked by the scheduler when idle to
//!   resume workers the host has signaled.

pub mod notifier;
pub mod scanner;

pub use notifier::ChannelNotifier;
