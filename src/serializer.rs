//! The iterative Serializer Engine (§4.3): a single `Init → BeginValue →
//! ContValue → Container → EndValue → End` walk shared by every traversal
//! that needs "enter, visit children, leave" semantics over a [`Node`]
//! tree without recursing on the machine stack.
//!
//! A `KeyVal` is modeled here as a one-child container whose single child
//! is its value — the walk treats `Item::Entry` exactly like any other
//! container, so a [`Visitor`] gets a `begin`/`end` pair around dict
//! entries for free (used by the JSON writer to emit `"key":`).

use crate::config::JsonFormat;
use crate::node::{KeyVal, Node};

#[derive(Clone, Copy)]
pub enum Item<'a> {
    Value(&'a Node),
    Entry(&'a KeyVal),
}

impl<'a> Item<'a> {
    fn len(&self) -> usize {
        match self {
            Item::Value(Node::Array(v)) => v.len(),
            Item::Value(Node::Dict(v)) => v.len(),
            Item::Entry(_) => 1,
            _ => 0,
        }
    }

    fn is_container(&self) -> bool {
        matches!(self, Item::Value(Node::Array(_)) | Item::Value(Node::Dict(_)) | Item::Entry(_))
    }

    fn child(&self, index: usize) -> Item<'a> {
        match self {
            Item::Value(Node::Array(v)) => Item::Value(&v[index]),
            Item::Value(Node::Dict(v)) => Item::Entry(&v[index]),
            Item::Entry(kv) => Item::Value(&kv.value),
            _ => unreachable!("child() only called on containers"),
        }
    }
}

/// The three callbacks a traversal supplies, in place of the engine's
/// literal `xBegin`/`xEnd`/`xDelim` type bitmasks — each callback decides
/// for itself whether a given item kind is interesting.
pub trait Visitor<'a> {
    fn begin(&mut self, item: &Item<'a>, depth: usize);
    fn delim(&mut self, parent: &Item<'a>, depth: usize, index: usize);
    fn end(&mut self, item: &Item<'a>, depth: usize);
}

pub fn walk<'a, V: Visitor<'a>>(root: &'a Node, visitor: &mut V) {
    enum State {
        BeginValue,
        ContValue,
        Container,
        EndValue,
    }

    let mut stack: Vec<(Item<'a>, usize)> = vec![(Item::Value(root), 0)];
    let mut state = State::BeginValue;

    loop {
        match state {
            State::BeginValue => {
                let (item, _) = stack.last().unwrap();
                visitor.begin(item, stack.len() - 1);
                state = State::ContValue;
            }
            State::ContValue => {
                let (item, _) = stack.last().unwrap();
                state = if item.is_container() { State::Container } else { State::EndValue };
            }
            State::Container => {
                let (item, idx) = *stack.last().unwrap();
                let len = item.len();
                if idx < len {
                    if idx > 0 {
                        visitor.delim(&item, stack.len() - 1, idx);
                    }
                    let child = item.child(idx);
                    stack.last_mut().unwrap().1 = idx + 1;
                    stack.push((child, 0));
                    state = State::BeginValue;
                } else {
                    state = State::EndValue;
                }
            }
            State::EndValue => {
                let (item, _) = stack.pop().unwrap();
                visitor.end(&item, stack.len());
                if stack.is_empty() {
                    break;
                }
                state = State::ContValue;
            }
        }
    }
}

/// Walks `sizeof(Node)` per node plus string/key byte lengths plus
/// container slot-array capacity (§4.3.3).
pub fn memory_usage(root: &Node) -> usize {
    struct Accountant {
        total: usize,
    }

    impl<'a> Visitor<'a> for Accountant {
        fn begin(&mut self, item: &Item<'a>, _depth: usize) {
            match item {
                Item::Value(node) => {
                    self.total += std::mem::size_of::<Node>();
                    match node {
                        Node::String(s) => self.total += s.len(),
                        Node::Array(v) => self.total += v.capacity() * std::mem::size_of::<Node>(),
                        Node::Dict(v) => self.total += v.capacity() * std::mem::size_of::<KeyVal>(),
                        _ => {}
                    }
                }
                Item::Entry(kv) => self.total += kv.key.len(),
            }
        }
        fn delim(&mut self, _parent: &Item<'a>, _depth: usize, _index: usize) {}
        fn end(&mut self, _item: &Item<'a>, _depth: usize) {}
    }

    let mut acc = Accountant { total: 0 };
    walk(root, &mut acc);
    acc.total
}

struct JsonWriter<'f> {
    out: &'f mut Vec<u8>,
    format: JsonFormat,
}

impl<'a, 'f> Visitor<'a> for JsonWriter<'f> {
    fn begin(&mut self, item: &Item<'a>, depth: usize) {
        match item {
            Item::Entry(kv) => {
                write_escaped_string(self.out, &kv.key, self.format.noescape);
                self.out.push(b':');
                self.out.extend_from_slice(&self.format.space);
            }
            Item::Value(node) => {
                match node {
                    Node::Null => self.out.extend_from_slice(b"null"),
                    Node::Bool(true) => self.out.extend_from_slice(b"true"),
                    Node::Bool(false) => self.out.extend_from_slice(b"false"),
                    Node::Int(i) => self.out.extend_from_slice(i.to_string().as_bytes()),
                    Node::Double(d) => self.out.extend_from_slice(format_double(*d).as_bytes()),
                    Node::String(s) => write_escaped_string(self.out, s, self.format.noescape),
                    Node::Array(_) => self.out.push(b'['),
                    Node::Dict(_) => self.out.push(b'{'),
                }
                if item.len() > 0 {
                    self.newline_indent(depth + 1);
                }
            }
        }
    }

    fn delim(&mut self, _parent: &Item<'a>, depth: usize, _index: usize) {
        self.out.push(b',');
        self.newline_indent(depth + 1);
    }

    fn end(&mut self, item: &Item<'a>, depth: usize) {
        if let Item::Value(node) = item {
            if matches!(node, Node::Array(_) | Node::Dict(_)) && item.len() > 0 {
                self.newline_indent(depth);
            }
            match node {
                Node::Array(_) => self.out.push(b']'),
                Node::Dict(_) => self.out.push(b'}'),
                _ => {}
            }
        }
    }
}

impl<'f> JsonWriter<'f> {
    fn newline_indent(&mut self, depth: usize) {
        if self.format.newline.is_empty() && self.format.indent.is_empty() {
            return;
        }
        self.out.extend_from_slice(&self.format.newline);
        for _ in 0..depth {
            self.out.extend_from_slice(&self.format.indent);
        }
    }
}

pub fn to_json(root: &Node, format: &JsonFormat) -> Vec<u8> {
    let mut out = Vec::new();
    let mut writer = JsonWriter { out: &mut out, format: format.clone() };
    walk(root, &mut writer);
    out
}

/// Renders a double at round-trip precision (17 significant digits),
/// emulating `%.17g` (`examples/original_source/src/json_object.c`'s
/// `jsonSerializeDouble`): scientific notation once the decimal exponent
/// falls outside `[-4, 17)`, fixed-point otherwise, trailing fractional
/// zeros trimmed in both.
fn format_double(d: f64) -> String {
    if d == 0.0 {
        return if d.is_sign_negative() { "-0.0".to_string() } else { "0.0".to_string() };
    }

    let negative = d.is_sign_negative();
    let sci = format!("{:.16e}", d.abs());
    let (mantissa, exp_str) = sci.split_once('e').expect("exponential format always contains 'e'");
    let exp: i32 = exp_str.parse().expect("rust's exponent is always a plain integer");
    let digits: String = mantissa.chars().filter(|c| c.is_ascii_digit()).collect();

    let mut out = String::new();
    if negative {
        out.push('-');
    }

    if exp < -4 || exp >= 17 {
        out.push(digits.as_bytes()[0] as char);
        out.push('.');
        push_trimmed_fraction(&mut out, &digits[1..]);
        out.push('e');
        out.push_str(&exp.to_string());
    } else if exp >= 0 {
        let int_len = (exp + 1) as usize;
        out.push_str(&digits[..int_len]);
        out.push('.');
        push_trimmed_fraction(&mut out, &digits[int_len..]);
    } else {
        out.push_str("0.");
        for _ in 0..(-exp - 1) {
            out.push('0');
        }
        push_trimmed_fraction(&mut out, &digits);
    }

    out
}

fn push_trimmed_fraction(out: &mut String, digits: &str) {
    let trimmed = digits.trim_end_matches('0');
    if trimmed.is_empty() {
        out.push('0');
    } else {
        out.push_str(trimmed);
    }
}

fn write_escaped_string(out: &mut Vec<u8>, bytes: &[u8], noescape: bool) {
    out.push(b'"');
    for &b in bytes {
        match b {
            b'"' => out.extend_from_slice(b"\\\""),
            b'\\' => out.extend_from_slice(b"\\\\"),
            b'/' => out.extend_from_slice(b"\\/"),
            0x08 => out.extend_from_slice(b"\\b"),
            0x0c => out.extend_from_slice(b"\\f"),
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\r' => out.extend_from_slice(b"\\r"),
            b'\t' => out.extend_from_slice(b"\\t"),
            b if b < 0x20 => out.extend_from_slice(format!("\\u{:04x}", b).as_bytes()),
            b if !noescape && b >= 0x7f => out.extend_from_slice(format!("\\u{:04x}", b).as_bytes()),
            _ => out.push(b),
        }
    }
    out.push(b'"');
}

#[cfg(test)]
mod __tests__ {
    use super::*;

    #[test]
    fn compact_object() {
        let doc = Node::Dict(vec![KeyVal { key: b"a".to_vec(), value: Node::Int(1) }]);
        assert_eq!(to_json(&doc, &JsonFormat::compact()), br#"{"a":1}"#.to_vec());
    }

    #[test]
    fn compact_array_of_scalars() {
        let doc = Node::Array(vec![Node::Int(1), Node::Bool(true), Node::Null]);
        assert_eq!(to_json(&doc, &JsonFormat::compact()), br#"[1,true,null]"#.to_vec());
    }

    #[test]
    fn escapes_control_bytes() {
        let doc = Node::String(b"a\nb\"c".to_vec());
        assert_eq!(to_json(&doc, &JsonFormat::compact()), br#""a\nb\"c""#.to_vec());
    }

    #[test]
    fn double_renders_at_round_trip_precision() {
        assert_eq!(to_json(&Node::Double(0.1), &JsonFormat::compact()), b"0.10000000000000001".to_vec());
        assert_eq!(to_json(&Node::Double(1.5), &JsonFormat::compact()), b"1.5".to_vec());
        assert_eq!(to_json(&Node::Double(100.0), &JsonFormat::compact()), b"100.0".to_vec());
        assert_eq!(to_json(&Node::Double(-0.0), &JsonFormat::compact()), b"-0.0".to_vec());
    }

    #[test]
    fn double_switches_to_scientific_outside_the_fixed_range() {
        let rendered = String::from_utf8(to_json(&Node::Double(1e18), &JsonFormat::compact())).unwrap();
        assert!(rendered.ends_with("e18"), "expected scientific notation, got {}", rendered);
        let rendered = String::from_utf8(to_json(&Node::Double(1e-5), &JsonFormat::compact())).unwrap();
        assert!(rendered.ends_with("e-5"), "expected scientific notation, got {}", rendered);
    }

    #[test]
    fn pretty_nests_with_indent() {
        let doc = Node::Array(vec![Node::Int(1)]);
        let text = String::from_utf8(to_json(&doc, &JsonFormat::pretty())).unwrap();
        assert_eq!(text, "[\n  1\n]");
    }

    #[test]
    fn memory_usage_accounts_for_string_bytes() {
        let small = Node::String(b"x".to_vec());
        let big = Node::String(vec![b'x'; 1000]);
        assert!(memory_usage(&big) > memory_usage(&small) + 900);
    }

    #[test]
    fn compact_output_is_valid_json_per_serde_json() {
        let doc = Node::Dict(vec![
            KeyVal { key: b"name".to_vec(), value: Node::String(b"ada".to_vec()) },
            KeyVal { key: b"tags".to_vec(), value: Node::Array(vec![Node::Int(1), Node::Bool(true), Node::Null]) },
        ]);
        let text = to_json(&doc, &JsonFormat::compact());
        let parsed: serde_json::Value = serde_json::from_slice(&text).unwrap();
        assert_eq!(parsed["name"], "ada");
        assert_eq!(parsed["tags"], serde_json::json!([1, true, null]));
    }
}
