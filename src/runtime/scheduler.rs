//! The scheduler contract streams suspend through.
//!
//! A stream never blocks on its descriptor. When it needs bytes it registers a
//! request with a [`Scheduler`], passing the sending half of a rendezvous
//! channel, and awaits the receiving half. The scheduler replies with exactly
//! one [`Notification`] per registration.
//!
//! Transient inability to read (`WouldBlock`, `Interrupted`) is never a reply;
//! the registration simply stays pending.

use crate::channel::rendezvous::{self, Sender};
use crate::error::{Error, Result};
use crate::fd::{Descriptor, RawFd};
use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

/// Reply delivered for one registration.
#[derive(Debug)]
pub enum Notification {
    /// Bytes read on behalf of a fill or direct-read registration.
    Data(Vec<u8>),
    /// The descriptor became readable (readiness-only registration).
    Readable(RawFd),
    /// The source reported end of data.
    Exhausted,
    /// The read failed.
    Failed(io::Error),
    /// A timer registration fired, carrying its payload.
    Elapsed(u64),
}

/// Accepts readiness and timer registrations.
pub trait Scheduler: Send + Sync + fmt::Debug {
    /// Registers interest in `source`.
    ///
    /// With `max_bytes == Some(n)` the scheduler performs the read itself once
    /// the source is ready and replies with at most `n` bytes. With `None` it
    /// only reports readiness via [`Notification::Readable`].
    fn notify_on_readable(
        &self,
        reply: Sender<Notification>,
        source: Arc<dyn Descriptor>,
        max_bytes: Option<usize>,
    );

    /// Replies with [`Notification::Elapsed`] once `after` has passed.
    fn notify_after_duration(&self, reply: Sender<Notification>, after: Duration, payload: u64);
}

/// Shared handle to a scheduler.
pub type SchedulerHandle = Arc<dyn Scheduler>;

/// Registers a read request and suspends until its reply arrives.
pub async fn wait_for(
    scheduler: &dyn Scheduler,
    source: &Arc<dyn Descriptor>,
    max_bytes: Option<usize>,
) -> Result<Notification> {
    let (tx, rx) = rendezvous::channel();
    scheduler.notify_on_readable(tx, Arc::clone(source), max_bytes);
    Ok(rx.recv().await?)
}

/// Performs one direct read of up to `max_bytes` through the scheduler.
///
/// Returns `None` when the source is exhausted.
pub async fn read_once(
    scheduler: &dyn Scheduler,
    source: &Arc<dyn Descriptor>,
    max_bytes: usize,
) -> Result<Option<Vec<u8>>> {
    match wait_for(scheduler, source, Some(max_bytes)).await? {
        Notification::Data(mut bytes) => {
            bytes.truncate(max_bytes);
            Ok(Some(bytes))
        }
        Notification::Exhausted => Ok(None),
        Notification::Failed(err) => Err(Error::from_io(err, "read")),
        other => Err(unexpected(&other)),
    }
}

pub(crate) fn unexpected(reply: &Notification) -> Error {
    Error::internal(format!("unexpected scheduler reply {reply:?}"))
}
