//! Reference reactor servicing scheduler registrations.
//!
//! The [`Reactor`] holds pending read and timer registrations. Each call to
//! [`Reactor::turn`] tries every read registration once against its
//! descriptor, fires every timer whose deadline passed, and posts the replies
//! on the registrations' rendezvous channels.
//!
//! Registrations whose receiver is gone (for example the losers of a
//! `select`) are discarded on the next turn without touching the descriptor.
//!
//! # Example
//!
//! ```ignore
//! use fdstream::runtime::{Reactor, Scheduler};
//!
//! let reactor = Reactor::new();
//! let (tx, rx) = fdstream::channel::channel();
//! reactor.notify_on_readable(tx, source, Some(64));
//! reactor.turn();
//! assert!(rx.try_recv().is_ok());
//! ```

use super::scheduler::{Notification, Scheduler};
use crate::channel::rendezvous::Sender;
use crate::fd::Descriptor;
use crate::tracing_compat::{trace, warn};
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct ReadRegistration {
    reply: Sender<Notification>,
    source: Arc<dyn Descriptor>,
    max_bytes: Option<usize>,
}

/// A pending timer.
///
/// Ordered by deadline, with the sequence number breaking ties so timers
/// registered for the same instant fire in registration order.
#[derive(Debug)]
struct TimerRegistration {
    deadline: Instant,
    sequence: u64,
    payload: u64,
    reply: Sender<Notification>,
}

impl PartialEq for TimerRegistration {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.sequence == other.sequence
    }
}

impl Eq for TimerRegistration {}

impl PartialOrd for TimerRegistration {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerRegistration {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap: earliest deadline first, then by sequence
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

#[derive(Debug, Default)]
struct ReactorState {
    readers: Vec<ReadRegistration>,
    timers: BinaryHeap<TimerRegistration>,
    next_sequence: u64,
}

/// Outcome of trying one read registration.
enum Attempt {
    Reply(Notification),
    Pending,
}

/// Cooperative reactor implementing [`Scheduler`].
#[derive(Debug, Default)]
pub struct Reactor {
    state: Mutex<ReactorState>,
}

impl Reactor {
    /// Creates an empty reactor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers every reply that is ready now.
    ///
    /// Returns the number of notifications posted.
    pub fn turn(&self) -> usize {
        let (readers, due) = {
            let mut state = self.state.lock();
            let readers = std::mem::take(&mut state.readers);
            state.timers.retain(|t| !t.reply.is_closed());
            let now = Instant::now();
            let mut due = Vec::new();
            while state.timers.peek().is_some_and(|t| t.deadline <= now) {
                if let Some(timer) = state.timers.pop() {
                    due.push(timer);
                }
            }
            (readers, due)
        };

        let mut delivered = 0;
        let mut kept = Vec::with_capacity(readers.len());
        for registration in readers {
            if registration.reply.is_closed() {
                trace!(
                    fd = registration.source.fd(),
                    "discarding registration with no receiver"
                );
                continue;
            }
            match attempt(&registration) {
                Attempt::Pending => kept.push(registration),
                Attempt::Reply(reply) => {
                    trace!(fd = registration.source.fd(), ?reply, "delivering readiness reply");
                    if registration.reply.send(reply).is_ok() {
                        delivered += 1;
                    } else {
                        warn!(
                            fd = registration.source.fd(),
                            "receiver vanished before reply, dropping registration"
                        );
                    }
                }
            }
        }

        for timer in due {
            if timer.reply.send(Notification::Elapsed(timer.payload)).is_ok() {
                trace!(payload = timer.payload, "timer elapsed");
                delivered += 1;
            }
        }

        let mut state = self.state.lock();
        kept.append(&mut state.readers);
        state.readers = kept;
        delivered
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        let state = self.state.lock();
        state.readers.is_empty() && state.timers.is_empty()
    }

    /// Number of pending registrations of either kind.
    #[must_use]
    pub fn pending(&self) -> usize {
        let state = self.state.lock();
        state.readers.len() + state.timers.len()
    }

    /// Earliest pending timer deadline.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.state.lock().timers.peek().map(|t| t.deadline)
    }
}

fn attempt(registration: &ReadRegistration) -> Attempt {
    let source = &registration.source;
    let Some(max_bytes) = registration.max_bytes else {
        return match source.readable() {
            Ok(true) => Attempt::Reply(Notification::Readable(source.fd())),
            Ok(false) => Attempt::Pending,
            Err(err) => Attempt::Reply(Notification::Failed(err)),
        };
    };
    if max_bytes == 0 {
        return Attempt::Reply(Notification::Data(Vec::new()));
    }
    let mut buf = vec![0u8; max_bytes];
    match source.read_nonblocking(&mut buf) {
        Ok(0) => Attempt::Reply(Notification::Exhausted),
        Ok(n) => {
            buf.truncate(n);
            Attempt::Reply(Notification::Data(buf))
        }
        Err(err)
            if matches!(
                err.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
            ) =>
        {
            Attempt::Pending
        }
        Err(err) => Attempt::Reply(Notification::Failed(err)),
    }
}

impl Scheduler for Reactor {
    fn notify_on_readable(
        &self,
        reply: Sender<Notification>,
        source: Arc<dyn Descriptor>,
        max_bytes: Option<usize>,
    ) {
        trace!(fd = source.fd(), ?max_bytes, "registering read interest");
        self.state.lock().readers.push(ReadRegistration {
            reply,
            source,
            max_bytes,
        });
    }

    fn notify_after_duration(&self, reply: Sender<Notification>, after: Duration, payload: u64) {
        let deadline = Instant::now() + after;
        let mut state = self.state.lock();
        let sequence = state.next_sequence;
        state.next_sequence += 1;
        state.timers.push(TimerRegistration {
            deadline,
            sequence,
            payload,
            reply,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::rendezvous::{channel, TryRecvError};
    use crate::fd::{pipe, AccessMode, MemoryFile};

    fn init_test(name: &str) {
        crate::test_utils::init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn data_reply_is_truncated_to_request() {
        init_test("data_reply_is_truncated_to_request");
        let reactor = Reactor::new();
        let file: Arc<dyn Descriptor> =
            Arc::new(MemoryFile::new(b"abcdef".to_vec(), AccessMode::ReadOnly));
        let (tx, rx) = channel();
        reactor.notify_on_readable(tx, file, Some(4));
        assert_eq!(reactor.turn(), 1);
        match rx.try_recv() {
            Ok(Notification::Data(bytes)) => assert_eq!(bytes, b"abcd"),
            other => panic!("unexpected reply {other:?}"),
        }
        assert!(reactor.is_idle());
        crate::test_complete!("data_reply_is_truncated_to_request");
    }

    #[test]
    fn exhausted_source_replies_exhausted() {
        init_test("exhausted_source_replies_exhausted");
        let reactor = Reactor::new();
        let file: Arc<dyn Descriptor> = Arc::new(MemoryFile::new(Vec::new(), AccessMode::ReadOnly));
        let (tx, rx) = channel();
        reactor.notify_on_readable(tx, file, Some(8));
        reactor.turn();
        assert!(matches!(rx.try_recv(), Ok(Notification::Exhausted)));
        crate::test_complete!("exhausted_source_replies_exhausted");
    }

    #[test]
    fn would_block_keeps_registration_pending() {
        init_test("would_block_keeps_registration_pending");
        let reactor = Reactor::new();
        let (reader, writer) = pipe();
        let reader: Arc<dyn Descriptor> = Arc::new(reader);
        let (tx, rx) = channel();
        reactor.notify_on_readable(tx, reader, Some(8));

        assert_eq!(reactor.turn(), 0);
        assert_eq!(rx.try_recv().err(), Some(TryRecvError::Empty));
        assert_eq!(reactor.pending(), 1);

        writer.write_all(b"late").expect("write");
        assert_eq!(reactor.turn(), 1);
        match rx.try_recv() {
            Ok(Notification::Data(bytes)) => assert_eq!(bytes, b"late"),
            other => panic!("unexpected reply {other:?}"),
        }
        crate::test_complete!("would_block_keeps_registration_pending");
    }

    #[test]
    fn readiness_only_reports_fd() {
        init_test("readiness_only_reports_fd");
        let reactor = Reactor::new();
        let file = MemoryFile::new(b"x".to_vec(), AccessMode::ReadOnly);
        let fd = file.fd();
        let (tx, rx) = channel();
        reactor.notify_on_readable(tx, Arc::new(file.clone()), None);
        reactor.turn();
        assert!(matches!(rx.try_recv(), Ok(Notification::Readable(got)) if got == fd));
        assert_eq!(file.read_calls(), 0);
        crate::test_complete!("readiness_only_reports_fd");
    }

    #[test]
    fn failure_is_reported() {
        init_test("failure_is_reported");
        let reactor = Reactor::new();
        let file = MemoryFile::new(b"x".to_vec(), AccessMode::ReadOnly);
        file.close().expect("close");
        let (tx, rx) = channel();
        reactor.notify_on_readable(tx, Arc::new(file), Some(1));
        reactor.turn();
        assert!(matches!(rx.try_recv(), Ok(Notification::Failed(_))));
        crate::test_complete!("failure_is_reported");
    }

    #[test]
    fn dropped_receiver_is_discarded_without_reading() {
        init_test("dropped_receiver_is_discarded_without_reading");
        let reactor = Reactor::new();
        let file = MemoryFile::new(b"abc".to_vec(), AccessMode::ReadOnly);
        let (tx, rx) = channel();
        reactor.notify_on_readable(tx, Arc::new(file.clone()), Some(3));
        drop(rx);
        assert_eq!(reactor.turn(), 0);
        assert!(reactor.is_idle());
        assert_eq!(file.read_calls(), 0);
        crate::test_complete!("dropped_receiver_is_discarded_without_reading");
    }

    #[test]
    fn timers_fire_in_deadline_order() {
        init_test("timers_fire_in_deadline_order");
        let reactor = Reactor::new();
        let (tx, rx) = channel();
        reactor.notify_after_duration(tx.clone(), Duration::from_millis(2), 2);
        reactor.notify_after_duration(tx, Duration::ZERO, 1);
        assert!(reactor.next_deadline().is_some());
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(reactor.turn(), 2);
        assert!(matches!(rx.try_recv(), Ok(Notification::Elapsed(1))));
        assert!(matches!(rx.try_recv(), Ok(Notification::Elapsed(2))));
        assert!(reactor.next_deadline().is_none());
        crate::test_complete!("timers_fire_in_deadline_order");
    }
}
