//! The Document Builder (§4.6): a [`lexer::Sink`] that assembles a
//! [`Node`] tree from lexer events instead of re-scanning the source
//! itself. String and number bodies are decoded lazily, only once the
//! lexer reports a complete token's `[begin, end)` byte range.

use crate::config::LexerLimits;
use crate::error::{JsonParseError, LexError};
use crate::lexer::{EventKind, Lexer, ScalarFlags, Sink};
use crate::node::{KeyVal, Node};

enum Frame {
    Array(Vec<Node>),
    Dict(Vec<KeyVal>, Option<Vec<u8>>),
}

struct Builder<'s> {
    source: &'s [u8],
    stack: Vec<Frame>,
    result: Option<Node>,
    error: Option<JsonParseError>,
}

impl<'s> Builder<'s> {
    fn new(source: &'s [u8]) -> Self {
        Self { source, stack: Vec::new(), result: None, error: None }
    }

    fn emit_value(&mut self, node: Node) {
        match self.stack.last_mut() {
            None => self.result = Some(node),
            Some(Frame::Array(items)) => items.push(node),
            Some(Frame::Dict(entries, pending_key)) => {
                let key = pending_key.take().expect("a value always follows a key in object context");
                entries.push(KeyVal { key, value: node });
            }
        }
    }

    fn close_container(&mut self, is_array: bool) {
        let frame = self.stack.pop().expect("on_pop only fires for a container we pushed");
        let node = match (frame, is_array) {
            (Frame::Array(items), true) => Node::Array(items),
            (Frame::Dict(entries, _), false) => Node::Dict(entries),
            _ => unreachable!("container kind must match the frame we pushed for it"),
        };
        self.emit_value(node);
    }

    fn handle_key(&mut self, begin: usize, end: usize) -> Result<(), JsonParseError> {
        let key = unescape(&self.source[begin + 1..end - 1], begin + 1)?;
        match self.stack.last_mut() {
            Some(Frame::Dict(_, pending_key)) => *pending_key = Some(key),
            _ => unreachable!("hash keys only appear inside an object frame"),
        }
        Ok(())
    }

    fn handle_string(&mut self, begin: usize, end: usize) -> Result<(), JsonParseError> {
        let bytes = unescape(&self.source[begin + 1..end - 1], begin + 1)?;
        self.emit_value(Node::String(bytes));
        Ok(())
    }

    fn handle_special(&mut self, begin: usize, end: usize, flags: ScalarFlags) -> Result<(), JsonParseError> {
        let text = &self.source[begin..end];
        let node = match text[0] {
            b'-' | b'0'..=b'9' => parse_number(text, flags, begin)?,
            b't' => Node::Bool(true),
            b'f' => Node::Bool(false),
            b'n' => Node::Null,
            other => unreachable!("lexer only emits 't'/'f'/'n'/digits for a Special token, got {}", other as char),
        };
        self.emit_value(node);
        Ok(())
    }
}

impl<'s> Sink for Builder<'s> {
    fn on_push(&mut self, kind: EventKind, _begin: usize, _depth: usize) {
        match kind {
            EventKind::Array => self.stack.push(Frame::Array(Vec::new())),
            EventKind::Object => self.stack.push(Frame::Dict(Vec::new(), None)),
            _ => {}
        }
    }

    fn on_pop(&mut self, kind: EventKind, begin: usize, end: usize, _depth: usize, flags: ScalarFlags) {
        if self.error.is_some() {
            return;
        }
        let result = match kind {
            EventKind::HashKey => self.handle_key(begin, end),
            EventKind::String => self.handle_string(begin, end),
            EventKind::Special => self.handle_special(begin, end, flags),
            EventKind::Array => {
                self.close_container(true);
                Ok(())
            }
            EventKind::Object => {
                self.close_container(false);
                Ok(())
            }
        };
        if let Err(e) = result {
            self.error = Some(e);
        }
    }

    fn on_error(&mut self, err: &LexError) {
        if self.error.is_none() {
            self.error = Some(JsonParseError::from(err.clone()));
        }
    }

    fn should_stop(&self) -> bool {
        self.error.is_some()
    }
}

fn parse_number(text: &[u8], flags: ScalarFlags, pos: usize) -> Result<Node, JsonParseError> {
    let s = std::str::from_utf8(text).expect("the lexer only ever accepts ascii digit runs for numbers");
    if flags.float || flags.exponent {
        let d: f64 = s.parse().map_err(|_| JsonParseError::InvalidNumber { pos })?;
        return Ok(Node::Double(d));
    }
    match s.parse::<i64>() {
        Ok(i) => Ok(Node::Int(i)),
        Err(_) => {
            let d: f64 = s.parse().map_err(|_| JsonParseError::InvalidNumber { pos })?;
            Ok(Node::Double(d))
        }
    }
}

/// Decodes a JSON string body (quotes already stripped by the caller).
/// `base_pos` is `raw`'s absolute offset in the source, used to report
/// accurate positions for `\u` and surrogate errors.
fn unescape(raw: &[u8], base_pos: usize) -> Result<Vec<u8>, JsonParseError> {
    if raw.iter().all(|&b| b != b'\\') {
        return Ok(raw.to_vec());
    }

    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] != b'\\' {
            out.push(raw[i]);
            i += 1;
            continue;
        }
        match raw[i + 1] {
            b'"' => {
                out.push(b'"');
                i += 2;
            }
            b'\\' => {
                out.push(b'\\');
                i += 2;
            }
            b'/' => {
                out.push(b'/');
                i += 2;
            }
            b'b' => {
                out.push(0x08);
                i += 2;
            }
            b'f' => {
                out.push(0x0c);
                i += 2;
            }
            b'n' => {
                out.push(b'\n');
                i += 2;
            }
            b'r' => {
                out.push(b'\r');
                i += 2;
            }
            b't' => {
                out.push(b'\t');
                i += 2;
            }
            b'u' => {
                let pos = base_pos + i;
                let mut scalar = read_hex4(raw, i + 2, pos)?;
                i += 6;
                if (0xD800..=0xDBFF).contains(&scalar) {
                    if i + 6 > raw.len() || raw[i] != b'\\' || raw[i + 1] != b'u' {
                        return Err(LexError::InvalidSurrogate { pos }.into());
                    }
                    let low = read_hex4(raw, i + 2, pos)?;
                    if !(0xDC00..=0xDFFF).contains(&low) {
                        return Err(LexError::InvalidSurrogate { pos }.into());
                    }
                    i += 6;
                    scalar = 0x10000 + (scalar - 0xD800) * 0x400 + (low - 0xDC00);
                } else if (0xDC00..=0xDFFF).contains(&scalar) {
                    return Err(LexError::InvalidSurrogate { pos }.into());
                }
                if scalar == 0 {
                    return Err(JsonParseError::InvalidCodePoint { pos });
                }
                let ch = char::from_u32(scalar).ok_or(JsonParseError::InvalidCodePoint { pos })?;
                let mut buf = [0u8; 4];
                out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            }
            other => unreachable!("the lexer already rejected unknown escape '{}'", other as char),
        }
    }
    Ok(out)
}

fn read_hex4(raw: &[u8], at: usize, pos: usize) -> Result<u32, JsonParseError> {
    let hex = std::str::from_utf8(&raw[at..at + 4]).expect("the lexer already validated these are hex digits");
    u32::from_str_radix(hex, 16).map_err(|_| JsonParseError::Lex(LexError::BadUnicodeHex { pos }))
}

/// Parses a complete JSON document, including a bare top-level scalar
/// (`null`, a number, a string, …) — RFC 8259 allows any value at the
/// root, and nothing downstream needs the stricter old object/array-only
/// rule some JSON libraries still enforce.
pub fn parse_json(input: &[u8], limits: LexerLimits) -> Result<Node, JsonParseError> {
    let mut builder = Builder::new(input);
    {
        let mut lexer = Lexer::new(&mut builder, limits);
        lexer.feed(input)?;
        lexer.finish()?;
    }
    if let Some(err) = builder.error {
        return Err(err);
    }
    builder.result.ok_or(JsonParseError::Lex(LexError::EmptyInput))
}

#[cfg(test)]
mod __tests__ {
    use super::*;

    fn parse(s: &str) -> Node {
        parse_json(s.as_bytes(), LexerLimits::default()).unwrap()
    }

    #[test]
    fn parses_null_at_root() {
        assert_eq!(parse("null"), Node::Null);
    }

    #[test]
    fn parses_bool_and_number_scalars() {
        assert_eq!(parse("true"), Node::Bool(true));
        assert_eq!(parse("42"), Node::Int(42));
        assert_eq!(parse("-3.5"), Node::Double(-3.5));
    }

    #[test]
    fn parses_nested_object_and_array() {
        let doc = parse(r#"{"a":[1,2,{"b":null}]}"#);
        let Node::Dict(entries) = doc else { panic!("expected object") };
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, b"a");
        let Node::Array(items) = &entries[0].value else { panic!("expected array") };
        assert_eq!(items.len(), 3);
        assert_eq!(items[0], Node::Int(1));
    }

    #[test]
    fn unescapes_basic_and_unicode_strings() {
        assert_eq!(parse(r#""a\nb""#), Node::String(b"a\nb".to_vec()));
        assert_eq!(parse(r#""é""#), Node::String("é".as_bytes().to_vec()));
    }

    #[test]
    fn combines_surrogate_pairs() {
        // U+1F600 GRINNING FACE, written as a \u-escaped UTF-16 surrogate pair.
        let doc = parse_json(br#""\ud83d\ude00""#, LexerLimits::default()).unwrap();
        assert_eq!(doc, Node::String("\u{1F600}".as_bytes().to_vec()));
    }

    #[test]
    fn rejects_lone_high_surrogate() {
        let err = parse_json(br#""\ud83d""#, LexerLimits::default()).unwrap_err();
        assert!(matches!(err, JsonParseError::Lex(LexError::InvalidSurrogate { .. })));
    }

    #[test]
    fn rejects_zero_code_point() {
        let err = parse_json(b"\"\\u0000\"", LexerLimits::default()).unwrap_err();
        assert!(matches!(err, JsonParseError::InvalidCodePoint { .. }));
    }

    #[test]
    fn large_integer_literal_stays_int() {
        assert_eq!(parse("9223372036854775807"), Node::Int(i64::MAX));
    }

    #[test]
    fn integer_overflowing_i64_promotes_to_double() {
        let Node::Double(_) = parse("99999999999999999999") else { panic!("expected promotion to double") };
    }
}
