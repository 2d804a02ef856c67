//! Waiting for the first readable stream.

use super::stream::Stream;
use crate::channel::rendezvous;
use crate::error::{Error, Result};
use crate::fd::Descriptor;
use crate::runtime::scheduler::{self, Notification, Scheduler};
use crate::tracing_compat::trace;
use std::sync::Arc;
use std::time::Duration;

const TIMEOUT_PAYLOAD: u64 = 1;

/// Returns the index of the first stream that has data to read.
///
/// A stream with buffered bytes wins immediately without suspending.
/// Otherwise every stream gets a readiness registration on one shared reply
/// channel, raced against an optional timer; the first reply decides. `None`
/// means the timeout elapsed. Losing registrations are left to the scheduler,
/// which discards them once this call returns.
///
/// Readiness belongs to the descriptor: streams wrapping the same descriptor
/// share one registration and the lowest of their indices is reported.
pub async fn select(
    scheduler: &dyn Scheduler,
    streams: &[&Stream],
    timeout: Option<Duration>,
) -> Result<Option<usize>> {
    if let Some(ready) = streams.iter().position(|s| s.buffered() > 0) {
        return Ok(Some(ready));
    }
    let sources = streams
        .iter()
        .map(|s| s.descriptor().cloned().ok_or_else(Error::closed_stream))
        .collect::<Result<Vec<Arc<dyn Descriptor>>>>()?;
    if sources.is_empty() && timeout.is_none() {
        return Err(Error::invalid_argument(
            "select needs at least one stream or a timeout",
        ));
    }

    let (tx, rx) = rendezvous::channel();
    for (index, source) in sources.iter().enumerate() {
        if sources[..index].iter().any(|s| s.fd() == source.fd()) {
            continue;
        }
        scheduler.notify_on_readable(tx.clone(), Arc::clone(source), None);
    }
    if let Some(after) = timeout {
        scheduler.notify_after_duration(tx.clone(), after, TIMEOUT_PAYLOAD);
    }
    drop(tx);

    match rx.recv().await? {
        Notification::Readable(fd) => {
            let index = sources.iter().position(|s| s.fd() == fd);
            trace!(fd, ?index, "select ready");
            Ok(index)
        }
        Notification::Elapsed(_) => {
            trace!("select timed out");
            Ok(None)
        }
        Notification::Failed(err) => Err(Error::from_io(err, "select")),
        other => Err(scheduler::unexpected(&other)),
    }
}

/// Waits until `stream` is readable or `timeout` elapses.
///
/// Returns true if the stream became readable.
pub async fn wait(stream: &Stream, timeout: Option<Duration>) -> Result<bool> {
    let scheduler = Arc::clone(stream.scheduler());
    Ok(select(scheduler.as_ref(), &[stream], timeout)
        .await?
        .is_some())
}
