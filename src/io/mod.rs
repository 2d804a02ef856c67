//! Buffered stream I/O.
//!
//! This module contains the stream layer:
//!
//! - [`Buffer`]: fixed-capacity byte region filled through the scheduler
//! - [`Stream`]: `read`/`gets`/`readpartial`/seek/write over a descriptor
//! - [`Separator`] and [`Terminator`]: line splitting
//! - [`Lines`]: lazy line sequence
//! - [`DuplexStream`]: reader/writer pair with capability checks
//! - [`select`](select::select) and [`wait`](select::wait): first readable stream
//!
//! # Example
//!
//! ```ignore
//! use fdstream::io::Stream;
//!
//! let mut stream = Stream::open(descriptor, None, scheduler)?;
//! let header = stream.gets("\r\n").await?;
//! let body = stream.read(Some(128)).await?;
//! ```

mod buffer;
mod duplex;
mod lines;
pub mod select;
mod separator;
mod stream;

pub use buffer::Buffer;
pub use duplex::{Direction, DuplexStream, Operation};
pub use lines::Lines;
pub use select::{select, wait};
pub use separator::{Separator, Terminator, PARAGRAPH_TERMINATOR};
pub use stream::Stream;
