//! Single-threaded cooperative runtime.
//!
//! [`LocalRuntime`] drives one main future plus any spawned `!Send` tasks on
//! the current thread, turning its [`Reactor`] between poll cycles so that
//! rendezvous replies get posted. Tasks are only polled after their waker
//! fired, so a task parked on a rendezvous receiver costs nothing until the
//! reactor answers it.
//!
//! ```text
//! loop:
//!   poll every woken task (main first)
//!   reactor.turn()            posts ready replies, wakes receivers
//!   nothing woken, nothing delivered?
//!     count an idle cycle; after `poll_budget` of them park the thread
//!     until the next timer deadline (capped by `idle_park`)
//! ```

use super::reactor::Reactor;
use super::scheduler::SchedulerHandle;
use super::waker::{ReadyQueue, TaskId};
use crate::config::RuntimeConfig;
use crate::tracing_compat::trace;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::{pin, Pin};
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::time::Instant;

type LocalTask = Pin<Box<dyn Future<Output = ()>>>;

struct Shared {
    reactor: Arc<Reactor>,
    config: RuntimeConfig,
    ready: Arc<ReadyQueue>,
    tasks: RefCell<BTreeMap<TaskId, LocalTask>>,
    next_id: Cell<TaskId>,
}

/// Cloneable handle to a [`LocalRuntime`].
///
/// Handles are `!Send`; they can spawn tasks and hand out the scheduler from
/// inside futures running on the runtime.
#[derive(Clone)]
pub struct LocalHandle {
    shared: Rc<Shared>,
}

impl fmt::Debug for LocalHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalHandle")
            .field("config", &self.shared.config)
            .field("tasks", &self.shared.tasks.borrow().len())
            .finish_non_exhaustive()
    }
}

impl LocalHandle {
    /// The scheduler streams on this runtime should register with.
    #[must_use]
    pub fn scheduler(&self) -> SchedulerHandle {
        Arc::clone(&self.shared.reactor) as SchedulerHandle
    }

    /// The reactor backing [`scheduler`](Self::scheduler).
    #[must_use]
    pub fn reactor(&self) -> &Arc<Reactor> {
        &self.shared.reactor
    }

    /// The runtime configuration.
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.shared.config
    }

    /// Spawns a task onto the runtime.
    ///
    /// The task first runs on the next poll cycle of an active `block_on`.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        let id = self.shared.next_id.get();
        self.shared.next_id.set(id.next());

        let join = Rc::new(RefCell::new(JoinState {
            result: None,
            waker: None,
        }));
        let completion = Rc::clone(&join);
        let task = async move {
            let output = future.await;
            let waker = {
                let mut state = completion.borrow_mut();
                state.result = Some(output);
                state.waker.take()
            };
            if let Some(waker) = waker {
                waker.wake();
            }
        };
        self.shared.tasks.borrow_mut().insert(id, Box::pin(task));
        self.shared.ready.schedule(id);
        trace!(task = %id, "spawned local task");
        JoinHandle { state: join }
    }

    /// Number of spawned tasks that have not completed.
    #[must_use]
    pub fn active_tasks(&self) -> usize {
        self.shared.tasks.borrow().len()
    }

    fn poll_task(&self, id: TaskId) -> bool {
        let Some(mut task) = self.shared.tasks.borrow_mut().remove(&id) else {
            return false;
        };
        let waker = self.shared.ready.waker_for(id);
        let mut cx = Context::from_waker(&waker);
        match task.as_mut().poll(&mut cx) {
            Poll::Ready(()) => trace!(task = %id, "local task completed"),
            Poll::Pending => {
                self.shared.tasks.borrow_mut().insert(id, task);
            }
        }
        true
    }

    fn park(&self) {
        let cap = self.shared.config.idle_park;
        let park = match self.shared.reactor.next_deadline() {
            Some(deadline) => deadline.saturating_duration_since(Instant::now()).min(cap),
            None => cap,
        };
        if park.is_zero() {
            std::thread::yield_now();
        } else {
            std::thread::sleep(park);
        }
    }
}

/// Single-threaded runtime owning a [`Reactor`].
#[derive(Debug)]
pub struct LocalRuntime {
    handle: LocalHandle,
}

impl Default for LocalRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalRuntime {
    /// Creates a runtime with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Creates a runtime with the given configuration.
    #[must_use]
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            handle: LocalHandle {
                shared: Rc::new(Shared {
                    reactor: Arc::new(Reactor::new()),
                    config: config.normalize(),
                    ready: Arc::new(ReadyQueue::new()),
                    tasks: RefCell::new(BTreeMap::new()),
                    next_id: Cell::new(TaskId::MAIN.next()),
                }),
            },
        }
    }

    /// Returns a cloneable handle.
    #[must_use]
    pub fn handle(&self) -> LocalHandle {
        self.handle.clone()
    }

    /// The scheduler streams on this runtime should register with.
    #[must_use]
    pub fn scheduler(&self) -> SchedulerHandle {
        self.handle.scheduler()
    }

    /// Spawns a task onto the runtime.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        self.handle.spawn(future)
    }

    /// Runs `future` to completion, driving spawned tasks and the reactor.
    ///
    /// Spawned tasks still pending when `future` completes stay queued for
    /// the next `block_on`. Must not be called from inside a task running on
    /// the same runtime.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        let handle = &self.handle;
        let shared = &handle.shared;
        let main_waker: Waker = shared.ready.waker_for(TaskId::MAIN);
        let mut cx = Context::from_waker(&main_waker);
        let mut main = pin!(future);
        let budget = shared.config.poll_budget;
        let mut idle = 0u32;

        shared.ready.schedule(TaskId::MAIN);
        loop {
            let woken = shared.ready.drain();
            let mut progressed = woken.main;
            if woken.main {
                if let Poll::Ready(output) = main.as_mut().poll(&mut cx) {
                    return output;
                }
            }
            for id in woken.spawned {
                progressed |= handle.poll_task(id);
            }

            if shared.reactor.turn() > 0 || shared.ready.has_ready() {
                progressed = true;
            }

            if progressed {
                idle = 0;
                continue;
            }
            idle = idle.saturating_add(1);
            if idle >= budget {
                handle.park();
                idle = 0;
            }
        }
    }
}

struct JoinState<T> {
    result: Option<T>,
    waker: Option<Waker>,
}

/// Handle awaiting the output of a spawned task.
#[must_use = "dropping a JoinHandle detaches the task"]
pub struct JoinHandle<T> {
    state: Rc<RefCell<JoinState<T>>>,
}

impl<T> fmt::Debug for JoinHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinHandle")
            .field("finished", &self.is_finished())
            .finish()
    }
}

impl<T> JoinHandle<T> {
    /// Returns true once the task produced its output.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.state.borrow().result.is_some()
    }
}

impl<T> Future for JoinHandle<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let mut state = self.state.borrow_mut();
        if let Some(output) = state.result.take() {
            return Poll::Ready(output);
        }
        state.waker = Some(cx.waker().clone());
        Poll::Pending
    }
}

/// Yields once to the runtime, letting other tasks and the reactor run.
pub async fn yield_now() {
    YieldNow { yielded: false }.await;
}

struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            return Poll::Ready(());
        }
        self.yielded = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}
