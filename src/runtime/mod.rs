//! Scheduler contract and the reference cooperative runtime.
//!
//! Streams only depend on the [`Scheduler`] trait. The rest of this module is
//! a small single-threaded runtime satisfying it:
//!
//! - [`Reactor`]: holds read and timer registrations and answers them
//! - [`LocalRuntime`]: polls tasks and turns the reactor
//! - [`ReadyQueue`]: task ids woken since the last poll cycle
//!
//! # Example
//!
//! ```ignore
//! use fdstream::runtime::LocalRuntime;
//!
//! let rt = LocalRuntime::new();
//! let scheduler = rt.scheduler();
//! let line = rt.block_on(async move {
//!     let mut stream = Stream::open(descriptor, None, scheduler)?;
//!     stream.gets_line().await
//! })?;
//! ```

pub mod local;
pub mod reactor;
pub mod scheduler;
pub mod waker;

pub use local::{yield_now, JoinHandle, LocalHandle, LocalRuntime};
pub use reactor::Reactor;
pub use scheduler::{read_once, wait_for, Notification, Scheduler, SchedulerHandle};
pub use waker::{ReadyQueue, TaskId, Woken};
