//! Byte offset to line/column mapping, used to annotate error messages with
//! a human-readable location instead of a raw byte index.

use once_cell::unsync::OnceCell;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
/// A 1-based line/column pair.
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl Display for Position {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// Wraps an input byte slice and lazily indexes its newline offsets so that
/// repeated `position_at` calls (e.g. while reporting several errors against
/// the same input) don't re-scan the buffer each time.
pub struct Source<'s> {
    pub bytes: &'s [u8],
    line_breaks: OnceCell<Vec<usize>>,
}

impl<'s> From<&'s [u8]> for Source<'s> {
    fn from(bytes: &'s [u8]) -> Self {
        Source::new(bytes)
    }
}

impl<'s> From<&'s str> for Source<'s> {
    fn from(s: &'s str) -> Self {
        Source::new(s.as_bytes())
    }
}

impl<'s> Source<'s> {
    pub fn new(bytes: &'s [u8]) -> Self {
        Self {
            bytes,
            line_breaks: OnceCell::new(),
        }
    }

    fn line_breaks(&self) -> &Vec<usize> {
        self.line_breaks.get_or_init(|| {
            self.bytes
                .iter()
                .enumerate()
                .filter_map(|(i, b)| if *b == b'\n' { Some(i) } else { None })
                .collect()
        })
    }

    /// Maps an absolute byte offset into the source to a 1-based line/column.
    pub fn position_at(&self, offset: usize) -> Position {
        let breaks = self.line_breaks();
        let index = match breaks.binary_search(&offset) {
            Ok(i) | Err(i) => i,
        };

        let line_start = if index == 0 { 0 } else { breaks[index - 1] + 1 };
        let column = String::from_utf8_lossy(&self.bytes[line_start..offset.min(self.bytes.len())])
            .chars()
            .count()
            + 1;
        Position::new(index + 1, column)
    }
}

#[cfg(test)]
mod __tests__ {
    use super::*;

    #[test]
    fn first_line_first_column() {
        let src = Source::from("abc");
        assert_eq!(src.position_at(0), Position::new(1, 1));
    }

    #[test]
    fn tracks_across_newlines() {
        let src = Source::from("ab\ncd\nef");
        assert_eq!(src.position_at(0), Position::new(1, 1));
        assert_eq!(src.position_at(3), Position::new(2, 1));
        assert_eq!(src.position_at(6), Position::new(3, 1));
        assert_eq!(src.position_at(7), Position::new(3, 2));
    }
}
