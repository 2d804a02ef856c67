//! Stream and runtime configuration.
//!
//! # Configuration Precedence
//!
//! Settings are resolved in this order (highest priority first):
//!
//! 1. **Programmatic**: values set via setters (`buffer_capacity(64)`)
//! 2. **Environment variables**: values from `FDSTREAM_*` env vars
//! 3. **Config file**: values loaded from a TOML file (requires `config-file` feature)
//! 4. **Defaults**: built-in defaults
//!
//! # Supported Environment Variables
//!
//! | Variable | Type | Maps to |
//! |----------|------|---------|
//! | `FDSTREAM_BUFFER_CAPACITY` | `usize` | `StreamConfig::buffer_capacity` |
//! | `FDSTREAM_LINE_SEPARATOR` | escaped `String` | `StreamConfig::line_separator` |
//! | `FDSTREAM_POLL_BUDGET` | `u32` | `RuntimeConfig::poll_budget` |
//! | `FDSTREAM_IDLE_PARK_MS` | `u64` | `RuntimeConfig::idle_park` |
//!
//! The separator variable understands `\n`, `\r`, `\t` and `\\` escapes; an
//! empty value selects paragraph mode.

use crate::error::{Error, Result};
use std::time::Duration;

/// Default buffer capacity in bytes.
pub const DEFAULT_BUFFER_CAPACITY: usize = 8096;

/// Default cooperative poll budget before the runtime yields the thread.
pub const DEFAULT_POLL_BUDGET: u32 = 128;

/// Default park duration when the runtime has nothing to do.
pub const DEFAULT_IDLE_PARK: Duration = Duration::from_millis(1);

/// Environment variable name for buffer capacity.
pub const ENV_BUFFER_CAPACITY: &str = "FDSTREAM_BUFFER_CAPACITY";
/// Environment variable name for the default line separator.
pub const ENV_LINE_SEPARATOR: &str = "FDSTREAM_LINE_SEPARATOR";
/// Environment variable name for the cooperative poll budget.
pub const ENV_POLL_BUDGET: &str = "FDSTREAM_POLL_BUDGET";
/// Environment variable name for the idle park duration in milliseconds.
pub const ENV_IDLE_PARK_MS: &str = "FDSTREAM_IDLE_PARK_MS";

/// Per-stream settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Capacity of the stream's buffer in bytes.
    pub buffer_capacity: usize,
    /// Separator used by `gets_line`, `readline_default` and friends.
    ///
    /// Empty selects paragraph mode.
    pub line_separator: Vec<u8>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            line_separator: b"\n".to_vec(),
        }
    }
}

impl StreamConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        apply_stream_env_overrides(&mut config)?;
        Ok(config.normalize())
    }

    /// Sets the buffer capacity.
    #[must_use]
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    /// Sets the default line separator.
    #[must_use]
    pub fn line_separator(mut self, separator: impl Into<Vec<u8>>) -> Self {
        self.line_separator = separator.into();
        self
    }

    /// Clamps values into their valid ranges.
    #[must_use]
    pub fn normalize(mut self) -> Self {
        self.buffer_capacity = self.buffer_capacity.max(1);
        self
    }
}

/// Settings for [`LocalRuntime`](crate::runtime::LocalRuntime).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Fruitless poll cycles tolerated before the thread parks.
    pub poll_budget: u32,
    /// Longest single park when nothing is ready.
    pub idle_park: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            poll_budget: DEFAULT_POLL_BUDGET,
            idle_park: DEFAULT_IDLE_PARK,
        }
    }
}

impl RuntimeConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        apply_runtime_env_overrides(&mut config)?;
        Ok(config.normalize())
    }

    /// Sets the poll budget.
    #[must_use]
    pub fn poll_budget(mut self, budget: u32) -> Self {
        self.poll_budget = budget;
        self
    }

    /// Sets the idle park duration.
    #[must_use]
    pub fn idle_park(mut self, park: Duration) -> Self {
        self.idle_park = park;
        self
    }

    /// Clamps values into their valid ranges.
    #[must_use]
    pub fn normalize(mut self) -> Self {
        self.poll_budget = self.poll_budget.max(1);
        self
    }
}

/// Apply environment variable overrides to a [`StreamConfig`].
///
/// Only variables that are set are applied. A set but unparseable variable
/// is an `InvalidArgument` error.
pub fn apply_stream_env_overrides(config: &mut StreamConfig) -> Result<()> {
    if let Some(val) = read_env(ENV_BUFFER_CAPACITY) {
        config.buffer_capacity = parse_usize(ENV_BUFFER_CAPACITY, &val)?;
    }
    if let Some(val) = read_env(ENV_LINE_SEPARATOR) {
        config.line_separator = unescape(ENV_LINE_SEPARATOR, &val)?;
    }
    Ok(())
}

/// Apply environment variable overrides to a [`RuntimeConfig`].
pub fn apply_runtime_env_overrides(config: &mut RuntimeConfig) -> Result<()> {
    if let Some(val) = read_env(ENV_POLL_BUDGET) {
        config.poll_budget = parse_u32(ENV_POLL_BUDGET, &val)?;
    }
    if let Some(val) = read_env(ENV_IDLE_PARK_MS) {
        config.idle_park = Duration::from_millis(parse_u64(ENV_IDLE_PARK_MS, &val)?);
    }
    Ok(())
}

fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn parse_usize(var_name: &str, val: &str) -> Result<usize> {
    val.trim().parse::<usize>().map_err(|e| {
        Error::invalid_argument(format!(
            "invalid value for {var_name}: expected unsigned integer, got {val:?} ({e})"
        ))
    })
}

fn parse_u32(var_name: &str, val: &str) -> Result<u32> {
    val.trim().parse::<u32>().map_err(|e| {
        Error::invalid_argument(format!(
            "invalid value for {var_name}: expected u32, got {val:?} ({e})"
        ))
    })
}

fn parse_u64(var_name: &str, val: &str) -> Result<u64> {
    val.trim().parse::<u64>().map_err(|e| {
        Error::invalid_argument(format!(
            "invalid value for {var_name}: expected u64, got {val:?} ({e})"
        ))
    })
}

fn unescape(var_name: &str, val: &str) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(val.len());
    let mut chars = val.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut utf8 = [0u8; 4];
            out.extend_from_slice(c.encode_utf8(&mut utf8).as_bytes());
            continue;
        }
        let byte = match chars.next() {
            Some('n') => b'\n',
            Some('r') => b'\r',
            Some('t') => b'\t',
            Some('\\') => b'\\',
            other => {
                return Err(Error::invalid_argument(format!(
                    "invalid value for {var_name}: unsupported escape \\{}",
                    other.map(String::from).unwrap_or_default()
                )))
            }
        };
        out.push(byte);
    }
    Ok(out)
}

// =========================================================================
// TOML config file support (feature-gated)
// =========================================================================

/// TOML-deserializable configuration.
///
/// ```toml
/// [stream]
/// buffer_capacity = 8096
/// line_separator = "\n"
///
/// [runtime]
/// poll_budget = 128
/// idle_park_ms = 1
/// ```
#[cfg(feature = "config-file")]
#[derive(serde::Deserialize, Default, Debug)]
pub struct TomlConfig {
    /// Stream settings.
    #[serde(default)]
    pub stream: StreamToml,
    /// Runtime settings.
    #[serde(default)]
    pub runtime: RuntimeToml,
}

/// Stream section of the TOML config.
#[cfg(feature = "config-file")]
#[derive(serde::Deserialize, Default, Debug)]
pub struct StreamToml {
    /// Buffer capacity in bytes.
    pub buffer_capacity: Option<usize>,
    /// Default line separator.
    pub line_separator: Option<String>,
}

/// Runtime section of the TOML config.
#[cfg(feature = "config-file")]
#[derive(serde::Deserialize, Default, Debug)]
pub struct RuntimeToml {
    /// Cooperative poll budget.
    pub poll_budget: Option<u32>,
    /// Idle park duration in milliseconds.
    pub idle_park_ms: Option<u64>,
}

#[cfg(feature = "config-file")]
impl TomlConfig {
    /// Parse a TOML string.
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| {
            Error::invalid_argument(format!("failed to parse TOML config: {e}")).with_source(e)
        })
    }

    /// Read and parse a TOML file.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::from_io(e, &format!("failed to read config file {}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Stream config: defaults, then this file, then the environment.
    pub fn stream_config(&self) -> Result<StreamConfig> {
        let mut config = StreamConfig::default();
        if let Some(v) = self.stream.buffer_capacity {
            config.buffer_capacity = v;
        }
        if let Some(ref v) = self.stream.line_separator {
            config.line_separator = v.as_bytes().to_vec();
        }
        apply_stream_env_overrides(&mut config)?;
        Ok(config.normalize())
    }

    /// Runtime config: defaults, then this file, then the environment.
    pub fn runtime_config(&self) -> Result<RuntimeConfig> {
        let mut config = RuntimeConfig::default();
        if let Some(v) = self.runtime.poll_budget {
            config.poll_budget = v;
        }
        if let Some(v) = self.runtime.idle_park_ms {
            config.idle_park = Duration::from_millis(v);
        }
        apply_runtime_env_overrides(&mut config)?;
        Ok(config.normalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn with_envs<F, R>(vars: &[(&str, &str)], f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let _guard = crate::test_utils::env_lock();
        clean_env_locked();
        for (k, v) in vars {
            std::env::set_var(k, v);
        }
        let result = f();
        clean_env_locked();
        result
    }

    fn clean_env_locked() {
        for var in &[
            ENV_BUFFER_CAPACITY,
            ENV_LINE_SEPARATOR,
            ENV_POLL_BUDGET,
            ENV_IDLE_PARK_MS,
        ] {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn defaults() {
        let stream = StreamConfig::default();
        assert_eq!(stream.buffer_capacity, 8096);
        assert_eq!(stream.line_separator, b"\n");
        let runtime = RuntimeConfig::default();
        assert_eq!(runtime.poll_budget, DEFAULT_POLL_BUDGET);
        assert_eq!(runtime.idle_park, DEFAULT_IDLE_PARK);
    }

    #[test]
    fn normalize_clamps_zero() {
        let stream = StreamConfig::default().buffer_capacity(0).normalize();
        assert_eq!(stream.buffer_capacity, 1);
        let runtime = RuntimeConfig::default().poll_budget(0).normalize();
        assert_eq!(runtime.poll_budget, 1);
    }

    #[test]
    fn env_overrides_apply() {
        let (stream, runtime) = with_envs(
            &[
                (ENV_BUFFER_CAPACITY, " 64 "),
                (ENV_LINE_SEPARATOR, "\\r\\n"),
                (ENV_POLL_BUDGET, "7"),
                (ENV_IDLE_PARK_MS, "5"),
            ],
            || {
                (
                    StreamConfig::from_env().expect("stream env"),
                    RuntimeConfig::from_env().expect("runtime env"),
                )
            },
        );
        assert_eq!(stream.buffer_capacity, 64);
        assert_eq!(stream.line_separator, b"\r\n");
        assert_eq!(runtime.poll_budget, 7);
        assert_eq!(runtime.idle_park, Duration::from_millis(5));
    }

    #[test]
    fn empty_separator_env_selects_paragraph_mode() {
        let stream = with_envs(&[(ENV_LINE_SEPARATOR, "")], StreamConfig::from_env)
            .expect("stream env");
        assert!(stream.line_separator.is_empty());
    }

    #[test]
    fn invalid_env_value_is_invalid_argument() {
        let err = with_envs(&[(ENV_BUFFER_CAPACITY, "lots")], StreamConfig::from_env)
            .expect_err("must fail");
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(err.to_string().contains(ENV_BUFFER_CAPACITY));

        let err = with_envs(&[(ENV_LINE_SEPARATOR, "\\q")], StreamConfig::from_env)
            .expect_err("must fail");
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn programmatic_setters_override_env() {
        let stream = with_envs(&[(ENV_BUFFER_CAPACITY, "64")], || {
            StreamConfig::from_env()
                .expect("stream env")
                .buffer_capacity(16)
                .line_separator(";")
        });
        assert_eq!(stream.buffer_capacity, 16);
        assert_eq!(stream.line_separator, b";");
    }

    #[cfg(feature = "config-file")]
    #[test]
    fn toml_then_env_precedence() {
        let toml = TomlConfig::from_toml_str(
            "[stream]\nbuffer_capacity = 32\nline_separator = \";\"\n[runtime]\npoll_budget = 9\n",
        )
        .expect("parse");
        let (stream, runtime) = with_envs(&[(ENV_BUFFER_CAPACITY, "48")], || {
            (
                toml.stream_config().expect("stream"),
                toml.runtime_config().expect("runtime"),
            )
        });
        assert_eq!(stream.buffer_capacity, 48);
        assert_eq!(stream.line_separator, b";");
        assert_eq!(runtime.poll_budget, 9);
    }

    #[cfg(feature = "config-file")]
    #[test]
    fn toml_parse_error_is_invalid_argument() {
        let err = TomlConfig::from_toml_str("[stream\n").expect_err("bad toml");
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}
