//! Incremental, event-driven JSON stream lexer.
//!
//! Bytes are handed in through repeated [`Lexer::feed`] calls; the lexer
//! reports structural boundaries to a [`Sink`] as they close (and, for
//! containers, as they open) instead of building any tree itself — tree
//! construction is [`crate::builder`]'s job. Byte offsets are absolute over
//! the lexer's lifetime since the last [`Lexer::reset`].

use crate::config::LexerLimits;
use crate::error::LexError;
use crate::trace::{Level, Tracer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Object,
    Array,
    String,
    HashKey,
    Special,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScalarFlags {
    pub float: bool,
    pub exponent: bool,
    pub escapes: usize,
}

/// Callbacks a consumer registers with the lexer. Every method has a no-op
/// default so a consumer only implements the events it cares about — the
/// path evaluator, for instance, only needs `on_push`/`on_pop` down to its
/// `max_callback_level`.
pub trait Sink {
    fn on_push(&mut self, _kind: EventKind, _begin: usize, _depth: usize) {}
    fn on_pop(&mut self, _kind: EventKind, _begin: usize, _end: usize, _depth: usize, _flags: ScalarFlags) {}
    fn on_error(&mut self, _err: &LexError) {}

    /// Checked after every event; returning `true` aborts the current feed
    /// cleanly, a stop signal any callback can raise.
    fn should_stop(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    Value,
    ValueOrCloseArray,
    KeyOrCloseObject,
    Key,
    Colon,
    CommaOrCloseArray,
    CommaOrCloseObject,
    Done,
}

enum StepOutcome {
    Advanced,
    NeedMore,
}

pub struct Lexer<'s, S: Sink> {
    sink: &'s mut S,
    limits: LexerLimits,
    buf: Vec<u8>,
    pos: usize,
    stack: Vec<bool>, // true = array frame, false = object frame
    expect: Expect,
    stopped: bool,
    tracer: Tracer,
}

impl<'s, S: Sink> Lexer<'s, S> {
    pub fn new(sink: &'s mut S, limits: LexerLimits) -> Self {
        Self {
            sink,
            limits,
            buf: Vec::new(),
            pos: 0,
            stack: Vec::new(),
            expect: Expect::Value,
            stopped: false,
            tracer: Tracer::new("lexer", Level::Debug),
        }
    }

    pub fn reset(&mut self) {
        self.buf.clear();
        self.pos = 0;
        self.stack.clear();
        self.expect = Expect::Value;
        self.stopped = false;
    }

    /// Feeds another chunk of bytes. May be called repeatedly; offsets
    /// reported to the sink stay absolute over the lexer's whole lifetime.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<(), LexError> {
        self.buf.extend_from_slice(bytes);
        self.run(false)
    }

    /// Signals end of input. Converts any still-pending token or open
    /// container into the appropriate error; checks for trailing garbage.
    pub fn finish(mut self) -> Result<(), LexError> {
        self.run(true)?;
        if self.pos < self.buf.len() && self.buf[self.pos] == b'"' {
            return self.fail(LexError::UnterminatedString { pos: self.pos });
        }
        if self.buf.is_empty() {
            return self.fail(LexError::EmptyInput);
        }
        match self.expect {
            Expect::Done => Ok(()),
            _ => self.fail(LexError::UnterminatedContainer { pos: self.pos }),
        }
    }

    fn fail(&mut self, err: LexError) -> Result<(), LexError> {
        self.tracer.error(&err);
        self.sink.on_error(&err);
        Err(err)
    }

    fn skip_whitespace(&mut self) {
        while self.pos < self.buf.len() && matches!(self.buf[self.pos], b' ' | b'\t' | b'\n' | b'\r') {
            self.pos += 1;
        }
    }

    fn depth(&self) -> usize {
        self.stack.len()
    }

    fn run(&mut self, input_complete: bool) -> Result<(), LexError> {
        loop {
            if self.stopped || self.sink.should_stop() {
                self.stopped = true;
                return Ok(());
            }
            self.skip_whitespace();
            if self.pos >= self.buf.len() {
                return Ok(());
            }
            let outcome = match self.expect {
                Expect::Value => self.step_value(false, input_complete)?,
                Expect::ValueOrCloseArray => self.step_value(true, input_complete)?,
                Expect::KeyOrCloseObject => self.step_key(true, input_complete)?,
                Expect::Key => self.step_key(false, input_complete)?,
                Expect::Colon => self.step_colon()?,
                Expect::CommaOrCloseArray => self.step_comma_or_close(true)?,
                Expect::CommaOrCloseObject => self.step_comma_or_close(false)?,
                Expect::Done => return self.fail(LexError::TrailingGarbage { pos: self.pos }),
            };
            if let StepOutcome::NeedMore = outcome {
                return Ok(());
            }
        }
    }

    fn push_container(&mut self, is_array: bool) -> Result<(), LexError> {
        if self.stack.len() + 1 > self.limits.max_depth {
            return self.fail(LexError::DepthExceeded { pos: self.pos, max_depth: self.limits.max_depth });
        }
        let depth = self.depth();
        let kind = if is_array { EventKind::Array } else { EventKind::Object };
        if depth <= self.limits.max_callback_level {
            self.sink.on_push(kind, self.pos, depth);
        }
        self.stack.push(is_array);
        self.pos += 1;
        self.expect = if is_array { Expect::ValueOrCloseArray } else { Expect::KeyOrCloseObject };
        Ok(())
    }

    fn pop_container(&mut self) -> Result<(), LexError> {
        let depth = self.depth();
        let is_array = self
            .stack
            .pop()
            .expect("comma/close state only reachable with an open container");
        let kind = if is_array { EventKind::Array } else { EventKind::Object };
        self.pos += 1;
        if depth <= self.limits.max_callback_level {
            self.sink.on_pop(kind, 0, self.pos, depth, ScalarFlags::default());
        }
        self.after_value();
        Ok(())
    }

    fn after_value(&mut self) {
        match self.stack.last() {
            None => self.expect = Expect::Done,
            Some(true) => self.expect = Expect::CommaOrCloseArray,
            Some(false) => self.expect = Expect::CommaOrCloseObject,
        }
    }

    fn step_value(&mut self, allow_close: bool, input_complete: bool) -> Result<StepOutcome, LexError> {
        let b = self.buf[self.pos];
        if allow_close && b == b']' {
            return self.pop_container().map(|_| StepOutcome::Advanced);
        }
        match b {
            b'{' => self.push_container(false).map(|_| StepOutcome::Advanced),
            b'[' => self.push_container(true).map(|_| StepOutcome::Advanced),
            b'"' => self.scan_and_emit_string(EventKind::String),
            b'-' | b'0'..=b'9' => self.scan_and_emit_number(input_complete),
            b't' | b'f' | b'n' => self.scan_and_emit_literal(input_complete),
            other => self.fail(LexError::InvalidByte { byte: other, pos: self.pos }).map(|_| StepOutcome::Advanced),
        }
    }

    fn step_key(&mut self, allow_close: bool, _input_complete: bool) -> Result<StepOutcome, LexError> {
        let b = self.buf[self.pos];
        if allow_close && b == b'}' {
            return self.pop_container().map(|_| StepOutcome::Advanced);
        }
        if b != b'"' {
            return self.fail(LexError::InvalidByte { byte: b, pos: self.pos }).map(|_| StepOutcome::Advanced);
        }
        let outcome = self.scan_and_emit_string(EventKind::HashKey)?;
        if let StepOutcome::Advanced = outcome {
            self.expect = Expect::Colon;
        }
        Ok(outcome)
    }

    fn step_colon(&mut self) -> Result<StepOutcome, LexError> {
        if self.buf[self.pos] != b':' {
            return self.fail(LexError::InvalidByte { byte: self.buf[self.pos], pos: self.pos }).map(|_| StepOutcome::Advanced);
        }
        self.pos += 1;
        self.expect = Expect::Value;
        Ok(StepOutcome::Advanced)
    }

    fn step_comma_or_close(&mut self, is_array: bool) -> Result<StepOutcome, LexError> {
        let close = if is_array { b']' } else { b'}' };
        let b = self.buf[self.pos];
        if b == close {
            return self.pop_container().map(|_| StepOutcome::Advanced);
        }
        if b != b',' {
            return self.fail(LexError::InvalidByte { byte: b, pos: self.pos }).map(|_| StepOutcome::Advanced);
        }
        self.pos += 1;
        self.expect = if is_array { Expect::Value } else { Expect::Key };
        Ok(StepOutcome::Advanced)
    }

    fn scan_and_emit_string(&mut self, kind: EventKind) -> Result<StepOutcome, LexError> {
        let begin = self.pos;
        match scan_string(&self.buf, begin)? {
            None => Ok(StepOutcome::NeedMore),
            Some((end, escapes)) => {
                let depth = self.depth();
                if depth <= self.limits.max_callback_level {
                    self.sink.on_push(kind, begin, depth);
                    self.sink.on_pop(kind, begin, end, depth, ScalarFlags { escapes, ..Default::default() });
                }
                self.pos = end;
                if kind != EventKind::HashKey {
                    self.after_value();
                }
                Ok(StepOutcome::Advanced)
            }
        }
    }

    fn scan_and_emit_number(&mut self, input_complete: bool) -> Result<StepOutcome, LexError> {
        let begin = self.pos;
        match scan_number(&self.buf, begin, input_complete)? {
            None => Ok(StepOutcome::NeedMore),
            Some((end, flags)) => {
                let depth = self.depth();
                if depth <= self.limits.max_callback_level {
                    self.sink.on_push(EventKind::Special, begin, depth);
                    self.sink.on_pop(EventKind::Special, begin, end, depth, flags);
                }
                self.pos = end;
                self.after_value();
                Ok(StepOutcome::Advanced)
            }
        }
    }

    fn scan_and_emit_literal(&mut self, input_complete: bool) -> Result<StepOutcome, LexError> {
        let begin = self.pos;
        match scan_literal(&self.buf, begin, input_complete)? {
            None => Ok(StepOutcome::NeedMore),
            Some(end) => {
                let depth = self.depth();
                if depth <= self.limits.max_callback_level {
                    self.sink.on_push(EventKind::Special, begin, depth);
                    self.sink.on_pop(EventKind::Special, begin, end, depth, ScalarFlags::default());
                }
                self.pos = end;
                self.after_value();
                Ok(StepOutcome::Advanced)
            }
        }
    }
}

fn scan_string(buf: &[u8], start: usize) -> Result<Option<(usize, usize)>, LexError> {
    let mut i = start + 1;
    let mut escapes = 0usize;
    loop {
        if i >= buf.len() {
            return Ok(None);
        }
        match buf[i] {
            b'"' => return Ok(Some((i + 1, escapes))),
            b'\\' => {
                escapes += 1;
                if i + 1 >= buf.len() {
                    return Ok(None);
                }
                match buf[i + 1] {
                    b'"' | b'\\' | b'/' | b'b' | b'f' | b'n' | b'r' | b't' => i += 2,
                    b'u' => {
                        if i + 6 > buf.len() {
                            return Ok(None);
                        }
                        for k in 0..4 {
                            if !buf[i + 2 + k].is_ascii_hexdigit() {
                                return Err(LexError::BadUnicodeHex { pos: i });
                            }
                        }
                        i += 6;
                    }
                    _ => return Err(LexError::BadEscape { pos: i }),
                }
            }
            b if b < 0x20 => return Err(LexError::InvalidByte { byte: b, pos: i }),
            _ => i += 1,
        }
    }
}

fn scan_number(buf: &[u8], start: usize, input_complete: bool) -> Result<Option<(usize, ScalarFlags)>, LexError> {
    let n = buf.len();
    let mut i = start;
    let mut flags = ScalarFlags::default();

    if i < n && buf[i] == b'-' {
        i += 1;
    }
    if i >= n {
        return if input_complete { Err(LexError::BadNumber { pos: start }) } else { Ok(None) };
    }
    if buf[i] == b'0' {
        i += 1;
    } else if buf[i].is_ascii_digit() {
        while i < n && buf[i].is_ascii_digit() {
            i += 1;
        }
    } else {
        return Err(LexError::BadNumber { pos: start });
    }
    if i == n {
        return if input_complete { Ok(Some((i, flags))) } else { Ok(None) };
    }
    if buf[i] == b'.' {
        flags.float = true;
        let frac_start = i + 1;
        let mut j = frac_start;
        while j < n && buf[j].is_ascii_digit() {
            j += 1;
        }
        if j == frac_start {
            return if j == n && !input_complete { Ok(None) } else { Err(LexError::BadNumber { pos: start }) };
        }
        i = j;
    }
    if i == n {
        return if input_complete { Ok(Some((i, flags))) } else { Ok(None) };
    }
    if buf[i] == b'e' || buf[i] == b'E' {
        flags.exponent = true;
        let mut j = i + 1;
        if j < n && (buf[j] == b'+' || buf[j] == b'-') {
            j += 1;
        }
        let exp_digits_start = j;
        while j < n && buf[j].is_ascii_digit() {
            j += 1;
        }
        if j == exp_digits_start {
            return if j == n && !input_complete { Ok(None) } else { Err(LexError::BadNumber { pos: start }) };
        }
        i = j;
    }
    if i == n && !input_complete {
        return Ok(None);
    }
    Ok(Some((i, flags)))
}

fn scan_literal(buf: &[u8], start: usize, input_complete: bool) -> Result<Option<usize>, LexError> {
    const LITERALS: [&[u8]; 3] = [b"true", b"false", b"null"];
    let available = &buf[start..];
    for lit in LITERALS {
        if available.len() >= lit.len() {
            if &available[..lit.len()] == lit {
                return Ok(Some(start + lit.len()));
            }
        } else if available == &lit[..available.len()] {
            return if input_complete {
                Err(LexError::InvalidByte { byte: buf[start], pos: start })
            } else {
                Ok(None)
            };
        }
    }
    Err(LexError::InvalidByte { byte: buf[start], pos: start })
}

#[cfg(test)]
mod __tests__ {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        events: Vec<(EventKind, bool, usize)>, // (kind, is_push, depth)
    }

    impl Sink for Recorder {
        fn on_push(&mut self, kind: EventKind, _begin: usize, depth: usize) {
            self.events.push((kind, true, depth));
        }
        fn on_pop(&mut self, kind: EventKind, _begin: usize, _end: usize, depth: usize, _flags: ScalarFlags) {
            self.events.push((kind, false, depth));
        }
    }

    fn run(input: &[u8]) -> Recorder {
        let mut sink = Recorder::default();
        let mut lexer = Lexer::new(&mut sink, LexerLimits::default());
        lexer.feed(input).unwrap();
        lexer.finish().unwrap();
        sink
    }

    #[test]
    fn flat_array() {
        let rec = run(b"[1,2,3]");
        assert_eq!(rec.events.first(), Some(&(EventKind::Array, true, 0)));
        assert_eq!(rec.events.last(), Some(&(EventKind::Array, false, 0)));
        assert_eq!(rec.events.iter().filter(|(k, push, _)| *k == EventKind::Special && *push).count(), 3);
    }

    #[test]
    fn nested_object_reports_hashkey() {
        let rec = run(br#"{"a":{"b":1}}"#);
        assert!(rec.events.iter().any(|(k, push, _)| *k == EventKind::HashKey && *push));
    }

    #[test]
    fn depth_limit_is_enforced() {
        let mut sink = Recorder::default();
        let limits = LexerLimits { max_depth: 1, max_callback_level: usize::MAX };
        let mut lexer = Lexer::new(&mut sink, limits);
        let err = lexer.feed(b"[[1]]").unwrap_err();
        assert!(matches!(err, LexError::DepthExceeded { .. }));
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        let mut sink = Recorder::default();
        let mut lexer = Lexer::new(&mut sink, LexerLimits::default());
        let err = lexer.feed(b"[1] 2").unwrap_err();
        assert!(matches!(err, LexError::TrailingGarbage { .. }));
    }

    #[test]
    fn number_split_across_feeds() {
        let mut sink = Recorder::default();
        let mut lexer = Lexer::new(&mut sink, LexerLimits::default());
        lexer.feed(b"[12").unwrap();
        lexer.feed(b"3]").unwrap();
        lexer.finish().unwrap();
        assert_eq!(sink.events.iter().filter(|(k, push, _)| *k == EventKind::Special && *push).count(), 1);
    }

    fn finish_err(input: &[u8]) -> LexError {
        let mut sink = Recorder::default();
        let mut lexer = Lexer::new(&mut sink, LexerLimits::default());
        lexer.feed(input).unwrap();
        lexer.finish().unwrap_err()
    }

    #[test]
    fn truly_empty_input_is_empty_input() {
        assert!(matches!(finish_err(b""), LexError::EmptyInput));
    }

    #[test]
    fn open_object_with_no_key_is_unterminated_container() {
        assert!(matches!(finish_err(b"{"), LexError::UnterminatedContainer { .. }));
    }

    #[test]
    fn open_object_past_a_complete_key_is_unterminated_container() {
        assert!(matches!(finish_err(br#"{"k""#), LexError::UnterminatedContainer { .. }));
    }

    #[test]
    fn string_missing_its_closing_quote_is_unterminated_string() {
        assert!(matches!(finish_err(br#"["abc"#), LexError::UnterminatedString { .. }));
    }
}
