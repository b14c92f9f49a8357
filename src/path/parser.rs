//! Tokenizes a path expression into an ordered list of `Root | Key |
//! Index` segments (§4.4). Identifier runs are matched with a regex,
//! the same way terminal tokens elsewhere in this crate are recognized,
//! but the grammar itself is a flat token sequence rather than a tree of
//! nonterminal productions.

use crate::error::PathParseError;
use once_cell::sync::Lazy;
use regex::bytes::Regex;

static IDENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Root,
    Key(Vec<u8>),
    Index(i64),
}

pub fn parse(path: &[u8]) -> Result<Vec<Segment>, PathParseError> {
    if path == b"." {
        return Ok(vec![Segment::Root]);
    }

    let mut p = Cursor { bytes: path, pos: 0 };
    let mut segments = Vec::new();

    if p.pos < p.bytes.len() && p.bytes[p.pos] == b'.' {
        p.pos += 1;
    }

    while p.pos < p.bytes.len() {
        match p.bytes[p.pos] {
            b'.' => {
                p.pos += 1;
                segments.push(p.parse_ident()?);
            }
            b'[' => {
                p.pos += 1;
                segments.push(p.parse_subscript()?);
            }
            _ if segments.is_empty() => segments.push(p.parse_ident()?),
            _ => return Err(PathParseError::new("expected '.' or '[' to start a segment", p.pos)),
        }
    }

    Ok(segments)
}

struct Cursor<'p> {
    bytes: &'p [u8],
    pos: usize,
}

impl<'p> Cursor<'p> {
    fn parse_ident(&mut self) -> Result<Segment, PathParseError> {
        let rest = &self.bytes[self.pos..];
        match IDENT.find(rest) {
            Some(m) if m.start() == 0 => {
                let end = self.pos + m.end();
                if end < self.bytes.len() && !matches!(self.bytes[end], b'.' | b'[') {
                    return Err(PathParseError::new(
                        "identifier may only contain letters, digits, '$', or '_'",
                        end,
                    ));
                }
                let key = self.bytes[self.pos..end].to_vec();
                self.pos = end;
                Ok(Segment::Key(key))
            }
            _ => Err(PathParseError::new("identifier must start with a letter, '$', or '_'", self.pos)),
        }
    }

    fn parse_subscript(&mut self) -> Result<Segment, PathParseError> {
        if self.pos >= self.bytes.len() {
            return Err(PathParseError::new("expected integer or quoted key inside '['", self.pos));
        }
        match self.bytes[self.pos] {
            b'"' => self.parse_quoted(b'"'),
            b'\'' => self.parse_quoted(b'\''),
            b'-' | b'0'..=b'9' => self.parse_index(),
            _ => Err(PathParseError::new(
                "expected an integer, a double-quoted key, or a single-quoted key inside '['",
                self.pos,
            )),
        }
    }

    fn parse_index(&mut self) -> Result<Segment, PathParseError> {
        let start = self.pos;
        let mut i = start;
        if self.bytes[i] == b'-' {
            i += 1;
        }
        let digits_start = i;
        while i < self.bytes.len() && self.bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i == digits_start {
            return Err(PathParseError::new("negative integer subscript must have at least one digit", i));
        }
        if i >= self.bytes.len() || self.bytes[i] != b']' {
            return Err(PathParseError::new("expected ']' after integer subscript", i));
        }
        let text = std::str::from_utf8(&self.bytes[start..i]).expect("ascii digits and '-' are valid utf-8");
        let value: i64 = text
            .parse()
            .map_err(|_| PathParseError::new("integer subscript out of range", start))?;
        self.pos = i + 1;
        Ok(Segment::Index(value))
    }

    fn parse_quoted(&mut self, quote: u8) -> Result<Segment, PathParseError> {
        let open = self.pos;
        self.pos += 1;
        let start = self.pos;
        while self.pos < self.bytes.len() && self.bytes[self.pos] != quote {
            self.pos += 1;
        }
        if self.pos >= self.bytes.len() {
            return Err(PathParseError::new("unterminated quoted key inside '['", open));
        }
        let key = self.bytes[start..self.pos].to_vec();
        self.pos += 1;
        if self.pos >= self.bytes.len() || self.bytes[self.pos] != b']' {
            return Err(PathParseError::new("']' must immediately follow the closing quote", self.pos));
        }
        self.pos += 1;
        Ok(Segment::Key(key))
    }
}

#[cfg(test)]
mod __tests__ {
    use super::*;

    #[test]
    fn root_alone() {
        assert_eq!(parse(b".").unwrap(), vec![Segment::Root]);
    }

    #[test]
    fn mixed_segments() {
        let got = parse(br#"foo.bar[3]["baz"][-1].$name_9"#).unwrap();
        assert_eq!(
            got,
            vec![
                Segment::Key(b"foo".to_vec()),
                Segment::Key(b"bar".to_vec()),
                Segment::Index(3),
                Segment::Key(b"baz".to_vec()),
                Segment::Index(-1),
                Segment::Key(b"$name_9".to_vec()),
            ]
        );
    }

    #[test]
    fn bare_digit_is_a_parse_error_at_zero() {
        let err = parse(b"3").unwrap_err();
        assert_eq!(err.offset, 0);
    }

    #[test]
    fn double_dot_errors_at_second_dot() {
        let err = parse(b"foo..bar").unwrap_err();
        assert_eq!(err.offset, 4);
    }

    #[test]
    fn single_quoted_key() {
        assert_eq!(parse(b"['a b']").unwrap(), vec![Segment::Key(b"a b".to_vec())]);
    }
}
