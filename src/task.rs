//! Interface to the enclave's cooperative task scheduler.
//!
//! The scheduler itself lives elsewhere; this crate only needs to spawn one
//! task per device, let that task park itself, wake it from outside, and
//! observe whether it is currently parked.

use alloc::boxed::Box;
use core::fmt::Write;

use arrayvec::ArrayString;
use axerrno::AxResult;

use crate::channel::DeviceId;

/// Handle to a task owned by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub usize);

/// Fixed-capacity task name.
pub type TaskName = ArrayString<16>;

/// Device ids wider than this keep only their low-order digits in the name.
const MAX_NAME_ID_DIGITS: u32 = 12;

/// Builds the conventional worker name `vio-<id>`.
///
/// The name holds at most `MAX_NAME_ID_DIGITS` digits of the id, so very
/// large ids are shown modulo 10^12. Names are for diagnostics only.
pub fn worker_name(id: DeviceId) -> TaskName {
    let shown = id.0 as u64 % 10u64.pow(MAX_NAME_ID_DIGITS);
    let mut name = TaskName::new();
    // "vio-" plus 12 digits fills the 16 bytes exactly.
    let _ = write!(name, "vio-{}", shown);
    name
}

/// Scheduler-visible state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Ready to run or running.
    Runnable,
    /// Parked until [`TaskScheduler::wakeup`].
    Sleeping,
    /// Returned [`TaskStep::Exit`]; never resumed again.
    Done,
}

/// Outcome of one [`CooperativeTask::resume`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStep {
    /// Still runnable; resume again at the scheduler's convenience.
    Yield,
    /// Park until someone calls [`TaskScheduler::wakeup`].
    Park,
    /// Finished.
    Exit,
}

/// A unit of cooperative work.
///
/// `resume` runs until the next voluntary suspension point and reports how
/// the scheduler should treat the task afterwards.
pub trait CooperativeTask: Send {
    /// Runs the task up to its next suspension point.
    fn resume(&mut self) -> TaskStep;
}

/// Cooperative scheduler primitives.
pub trait TaskScheduler: Send + Sync {
    /// Creates a new runnable task.
    ///
    /// # Errors
    ///
    /// Returns an error if the scheduler cannot accept another task.
    fn spawn(&self, name: TaskName, task: Box<dyn CooperativeTask>) -> AxResult<TaskId>;

    /// Makes a parked task runnable again. No effect on other states.
    fn wakeup(&self, task: TaskId);

    /// Reports the current state of a task.
    fn state(&self, task: TaskId) -> TaskState;
}
