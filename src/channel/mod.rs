//! Channel primitives for suspension points.
//!
//! Every place a stream waits for data hands the scheduler the sending half of
//! a rendezvous channel and awaits the receiving half. The scheduler answers
//! each registration with exactly one message.
//!
//! # Example
//!
//! ```ignore
//! use fdstream::channel::rendezvous;
//!
//! let (tx, rx) = rendezvous::channel::<Notification>();
//! scheduler.notify_on_readable(tx, source, Some(512));
//! let reply = rx.recv().await?;
//! ```
//!
//! # Module Contents
//!
//! - [`rendezvous`]: one-value-per-receive channel with cloneable senders

pub mod rendezvous;

pub use rendezvous::{channel, Receiver, RecvError, SendError, Sender, TryRecvError};
