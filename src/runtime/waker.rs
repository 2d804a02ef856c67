//! Task ids and the ready queue fed by task wakers.
//!
//! Every task of a [`LocalRuntime`](super::LocalRuntime) polls with a waker
//! that pushes its id onto a shared [`ReadyQueue`]. The `block_on` future is
//! tracked by a flag of its own so the runtime can poll it first; spawned
//! tasks queue in wake order, each at most once per cycle.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::task::{Wake, Waker};

/// Identifier of a task inside a [`LocalRuntime`](super::LocalRuntime).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

impl TaskId {
    /// The future driven by `block_on`.
    pub const MAIN: Self = Self(0);

    /// The id handed to the next spawned task.
    #[must_use]
    pub(crate) fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns true for the `block_on` future.
    #[must_use]
    pub fn is_main(self) -> bool {
        self == Self::MAIN
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_main() {
            f.write_str("main")
        } else {
            write!(f, "task-{}", self.0)
        }
    }
}

/// Tasks woken since the last drain.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Woken {
    /// The `block_on` future was woken.
    pub main: bool,
    /// Spawned tasks, in wake order.
    pub spawned: Vec<TaskId>,
}

impl Woken {
    /// Returns true if nothing was woken.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.main && self.spawned.is_empty()
    }
}

#[derive(Debug, Default)]
struct Pending {
    main: bool,
    spawned: VecDeque<TaskId>,
}

/// Shared queue of tasks ready to poll.
#[derive(Debug, Default)]
pub struct ReadyQueue {
    pending: Mutex<Pending>,
}

impl ReadyQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a waker that schedules `task` on this queue.
    #[must_use]
    pub fn waker_for(self: &Arc<Self>, task: TaskId) -> Waker {
        Waker::from(Arc::new(TaskWaker {
            queue: Arc::clone(self),
            task,
        }))
    }

    /// Marks `task` ready; repeated wakes before a drain collapse into one.
    pub fn schedule(&self, task: TaskId) {
        let mut pending = self.pending.lock();
        if task.is_main() {
            pending.main = true;
        } else if !pending.spawned.contains(&task) {
            pending.spawned.push_back(task);
        }
    }

    /// Takes everything woken so far.
    pub fn drain(&self) -> Woken {
        let mut pending = self.pending.lock();
        Woken {
            main: std::mem::take(&mut pending.main),
            spawned: pending.spawned.drain(..).collect(),
        }
    }

    /// Returns true if a drain would yield anything.
    #[must_use]
    pub fn has_ready(&self) -> bool {
        let pending = self.pending.lock();
        pending.main || !pending.spawned.is_empty()
    }
}

struct TaskWaker {
    queue: Arc<ReadyQueue>,
    task: TaskId,
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        self.queue.schedule(self.task);
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.queue.schedule(self.task);
    }
}
