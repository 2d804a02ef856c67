//! Line separators and compiled terminator patterns.

use crate::error::{Error, Result};
use regex::bytes::{Regex, RegexBuilder};
use std::fmt::Write as _;

/// Terminator used in paragraph mode.
pub const PARAGRAPH_TERMINATOR: &[u8] = b"\n\n";

/// How `gets`-style operations split their input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Separator {
    /// No separator: read everything that remains.
    All,
    /// Paragraph mode: split on blank lines, skipping runs of newlines.
    Paragraph,
    /// Split after each occurrence of these bytes.
    Literal(Vec<u8>),
}

impl Separator {
    /// A literal separator; empty bytes select paragraph mode.
    #[must_use]
    pub fn literal(bytes: impl Into<Vec<u8>>) -> Self {
        let bytes = bytes.into();
        if bytes.is_empty() {
            Self::Paragraph
        } else {
            Self::Literal(bytes)
        }
    }
}

impl From<&str> for Separator {
    fn from(s: &str) -> Self {
        Self::literal(s.as_bytes())
    }
}

impl From<&[u8]> for Separator {
    fn from(bytes: &[u8]) -> Self {
        Self::literal(bytes)
    }
}

impl<const N: usize> From<&[u8; N]> for Separator {
    fn from(bytes: &[u8; N]) -> Self {
        Self::literal(bytes.as_slice())
    }
}

impl From<Vec<u8>> for Separator {
    fn from(bytes: Vec<u8>) -> Self {
        Self::literal(bytes)
    }
}

impl<T: Into<Separator>> From<Option<T>> for Separator {
    fn from(sep: Option<T>) -> Self {
        sep.map_or(Self::All, Into::into)
    }
}

/// A separator compiled into a byte pattern.
///
/// Every byte is escaped, so the pattern matches the separator literally;
/// dot-matches-newline is on so multi-line separators behave.
#[derive(Debug, Clone)]
pub struct Terminator {
    bytes: Vec<u8>,
    regex: Regex,
}

impl Terminator {
    /// Compiles `bytes` into a terminator.
    pub fn new(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(Error::invalid_argument("empty separator"));
        }
        let mut pattern = String::with_capacity(bytes.len() * 4);
        for byte in bytes {
            let _ = write!(pattern, "\\x{byte:02X}");
        }
        let regex = RegexBuilder::new(&pattern)
            .unicode(false)
            .dot_matches_new_line(true)
            .build()
            .map_err(|e| Error::invalid_argument(format!("bad separator: {e}")).with_source(e))?;
        Ok(Self {
            bytes: bytes.to_vec(),
            regex,
        })
    }

    /// Compiles the paragraph-mode terminator.
    pub fn paragraph() -> Result<Self> {
        Self::new(PARAGRAPH_TERMINATOR)
    }

    /// The separator bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Separator length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always false; terminators are never empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Offset just past the first match in `haystack`.
    #[must_use]
    pub fn find_end(&self, haystack: &[u8]) -> Option<usize> {
        self.regex.find(haystack).map(|m| m.end())
    }
}
