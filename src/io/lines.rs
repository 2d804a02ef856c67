//! Lazy line sequence over a [`Stream`].

use super::separator::Separator;
use super::stream::Stream;
use crate::error::Result;

/// Lines of a stream, produced one `next_line` call at a time.
///
/// Finite iff the source is finite. Iterating does not advance the stream's
/// line counter; restarting requires rewinding the stream.
#[derive(Debug)]
pub struct Lines<'a> {
    stream: &'a mut Stream,
    separator: Separator,
}

impl<'a> Lines<'a> {
    pub(crate) fn new(stream: &'a mut Stream, separator: Separator) -> Self {
        Self { stream, separator }
    }

    /// The next line, or `None` once the stream is exhausted.
    pub async fn next_line(&mut self) -> Result<Option<Vec<u8>>> {
        self.stream.next_line(&self.separator).await
    }

    /// Collects every remaining line.
    pub async fn collect_all(mut self) -> Result<Vec<Vec<u8>>> {
        let mut lines = Vec::new();
        while let Some(line) = self.next_line().await? {
            lines.push(line);
        }
        Ok(lines)
    }

    /// The separator lines are split on.
    #[must_use]
    pub fn separator(&self) -> &Separator {
        &self.separator
    }
}

#[cfg(test)]
mod tests {
    use crate::test_utils::{memory_stream, run_test};

    #[test]
    fn collect_all_yields_unterminated_tail() {
        crate::test_utils::init_test_logging();
        crate::test_phase!("collect_all_yields_unterminated_tail");
        run_test(|handle| async move {
            let (mut stream, _) = memory_stream(&handle, b"one\ntwo\nthree", 5);
            let lines = stream.lines("\n").collect_all().await.expect("lines");
            assert_eq!(
                lines,
                vec![b"one\n".to_vec(), b"two\n".to_vec(), b"three".to_vec()]
            );
            assert!(stream.lines("\n").next_line().await.expect("next").is_none());
        });
        crate::test_complete!("collect_all_yields_unterminated_tail");
    }
}
