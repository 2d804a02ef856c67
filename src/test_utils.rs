//! Test utilities for fdstream.
//!
//! This module provides shared helpers for unit tests:
//! - Consistent tracing-based logging initialization
//! - Phase/section macros for readable test output
//! - A runner that drives async test bodies on a [`LocalRuntime`]
//! - Memory-backed stream constructors
//!
//! # Example
//! ```ignore
//! use fdstream::test_utils::{init_test_logging, run_test};
//!
//! fn my_async_test() {
//!     init_test_logging();
//!     run_test(|handle| async move {
//!         // async test code
//!     });
//! }
//! ```

use crate::config::StreamConfig;
use crate::fd::{AccessMode, MemoryFile};
use crate::io::Stream;
use crate::runtime::{LocalHandle, LocalRuntime};
use std::future::Future;
use std::sync::{Arc, Mutex, Once};
use tracing_subscriber::fmt::format::FmtSpan;

static INIT_LOGGING: Once = Once::new();
static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Initialize test logging with trace-level output.
///
/// Safe to call multiple times; only initializes once.
pub fn init_test_logging() {
    init_test_logging_with_level(tracing::Level::TRACE);
}

/// Initialize test logging with a custom level.
///
/// The first call wins; later calls are no-ops.
pub fn init_test_logging_with_level(level: tracing::Level) {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_test_writer()
            .with_file(true)
            .with_line_number(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_ansi(false)
            .try_init();
    });
}

/// Acquire the global environment lock for tests that mutate env vars.
pub fn env_lock() -> std::sync::MutexGuard<'static, ()> {
    ENV_LOCK
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Run an async test body on a fresh [`LocalRuntime`].
///
/// The body receives a handle for spawning tasks and opening streams.
pub fn run_test<F, Fut>(f: F)
where
    F: FnOnce(LocalHandle) -> Fut,
    Fut: Future<Output = ()>,
{
    init_test_logging();
    let runtime = LocalRuntime::new();
    let body = f(runtime.handle());
    runtime.block_on(body);
}

/// Open a read-write stream over an in-memory file holding `contents`.
///
/// Returns the backing file too so tests can inspect read counters.
pub fn memory_stream(
    handle: &LocalHandle,
    contents: &[u8],
    capacity: usize,
) -> (Stream, MemoryFile) {
    let file = MemoryFile::new(contents.to_vec(), AccessMode::ReadWrite);
    let config = StreamConfig::default().buffer_capacity(capacity);
    let stream = Stream::open_with_config(
        Arc::new(file.clone()),
        None,
        handle.scheduler(),
        config,
    )
    .expect("memory stream must open");
    (stream, file)
}

/// Log a test phase transition with a visual separator.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        tracing::info!(phase = %$name, "========================================");
        tracing::info!(phase = %$name, "TEST PHASE: {}", $name);
        tracing::info!(phase = %$name, "========================================");
    };
}

/// Log a section within a test phase.
#[macro_export]
macro_rules! test_section {
    ($name:expr) => {
        tracing::debug!(section = %$name, "--- {} ---", $name);
    };
}

/// Log test completion with summary.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        tracing::info!(test = %$name, "test completed successfully: {}", $name);
    };
    ($name:expr, $($key:ident = $value:expr),* $(,)?) => {
        tracing::info!(
            test = %$name,
            $($key = %$value,)*
            "test completed successfully: {}",
            $name
        );
    };
}

/// Log before assertions for context.
#[macro_export]
macro_rules! assert_with_log {
    ($cond:expr, $msg:expr, $expected:expr, $actual:expr) => {
        tracing::debug!(
            expected = ?$expected,
            actual = ?$actual,
            "Asserting: {}",
            $msg
        );
        assert!($cond, "{}: expected {:?}, got {:?}", $msg, $expected, $actual);
    };
}
