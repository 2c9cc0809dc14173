//! Deterministic stand-ins for the scheduler and host used by unit tests.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::sync::atomic::AtomicU32;

use axerrno::{AxResult, ax_err};
use spin::Mutex;

use crate::channel::{DeviceId, SharedEventChannel};
use crate::config::DeviceChannelConfig;
use crate::host::{HostDoorbell, IrqSink};
use crate::task::{CooperativeTask, TaskId, TaskName, TaskScheduler, TaskState, TaskStep};

/// Device table entry backed by leaked (process-lifetime) memory.
pub fn leak_entry(id: usize) -> DeviceChannelConfig {
    DeviceChannelConfig::new(
        DeviceId(id),
        Box::leak(Box::new(SharedEventChannel::new())),
        Box::leak(Box::new(AtomicU32::new(0))),
    )
}

struct MockTask {
    name: TaskName,
    body: Option<Box<dyn CooperativeTask>>,
    state: TaskState,
}

/// Single-context cooperative scheduler driven explicitly by the test.
#[derive(Default)]
pub struct MockScheduler {
    tasks: Mutex<Vec<MockTask>>,
    spawn_limit: Option<usize>,
}

impl MockScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails every spawn after the first `limit`.
    pub fn with_spawn_limit(limit: usize) -> Self {
        Self {
            tasks: Mutex::new(Vec::new()),
            spawn_limit: Some(limit),
        }
    }

    pub fn spawned(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn name(&self, task: TaskId) -> TaskName {
        self.tasks.lock()[task.0].name
    }

    /// Resumes `task` once if it is runnable.
    pub fn run(&self, task: TaskId) -> Option<TaskStep> {
        let mut body = {
            let mut tasks = self.tasks.lock();
            let slot = &mut tasks[task.0];
            if slot.state != TaskState::Runnable {
                return None;
            }
            slot.body.take()?
        };

        let step = body.resume();

        let mut tasks = self.tasks.lock();
        let slot = &mut tasks[task.0];
        slot.state = match step {
            TaskStep::Yield => TaskState::Runnable,
            TaskStep::Park => TaskState::Sleeping,
            TaskStep::Exit => TaskState::Done,
        };
        if slot.state != TaskState::Done {
            slot.body = Some(body);
        }
        Some(step)
    }

    /// Round-robins runnable tasks until none is left.
    pub fn run_until_idle(&self) {
        for _ in 0..1024 {
            let count = self.spawned();
            let mut ran = false;
            for id in 0..count {
                ran |= self.run(TaskId(id)).is_some();
            }
            if !ran {
                return;
            }
        }
        panic!("tasks never went idle");
    }
}

impl TaskScheduler for MockScheduler {
    fn spawn(&self, name: TaskName, task: Box<dyn CooperativeTask>) -> AxResult<TaskId> {
        let mut tasks = self.tasks.lock();
        if self.spawn_limit.is_some_and(|limit| tasks.len() >= limit) {
            return ax_err!(NoMemory, "task table full");
        }
        tasks.push(MockTask {
            name,
            body: Some(task),
            state: TaskState::Runnable,
        });
        Ok(TaskId(tasks.len() - 1))
    }

    fn wakeup(&self, task: TaskId) {
        let mut tasks = self.tasks.lock();
        if let Some(slot) = tasks.get_mut(task.0) {
            if slot.state == TaskState::Sleeping {
                slot.state = TaskState::Runnable;
            }
        }
    }

    fn state(&self, task: TaskId) -> TaskState {
        self.tasks.lock()[task.0].state
    }
}

/// Records interrupt deliveries and host wakes.
#[derive(Default)]
pub struct RecordingHost {
    irqs: Mutex<Vec<DeviceId>>,
    host_wakes: Mutex<Vec<DeviceId>>,
}

impl RecordingHost {
    pub fn irqs(&self) -> Vec<DeviceId> {
        self.irqs.lock().clone()
    }

    pub fn host_wakes(&self) -> Vec<DeviceId> {
        self.host_wakes.lock().clone()
    }
}

impl IrqSink for RecordingHost {
    fn deliver_irq(&self, device: DeviceId) {
        self.irqs.lock().push(device);
    }
}

impl HostDoorbell for RecordingHost {
    fn wake_host(&self, device: DeviceId) {
        self.host_wakes.lock().push(device);
    }
}
