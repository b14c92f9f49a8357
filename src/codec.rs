//! The persistent binary codec (§4.3.2/§6): a writer built on top of the
//! Serializer Engine's [`crate::serializer::walk`] (so writing shares the
//! same non-recursive traversal as JSON output) and a reconstructing reader
//! driven by a small recursive-descent state machine, since rebuilding a
//! tree bottom-up from a flat tag stream has no equivalent "visit, then
//! come back" shape to share with the writer.
//!
//! Tags are a single fixed byte rather than a variable-length varint —
//! this format is never meant to outlive a single host process's storage
//! file, so there is no wire-compat reason to pay varint decoding cost on
//! every node.

use crate::error::CodecError;
use crate::node::{KeyVal, Node};
use crate::serializer::{walk, Item, Visitor};

pub const TAG_NULL: u8 = 0;
pub const TAG_BOOL: u8 = 1;
pub const TAG_INT: u8 = 2;
pub const TAG_DOUBLE: u8 = 3;
pub const TAG_STRING: u8 = 4;
pub const TAG_ARRAY: u8 = 5;
pub const TAG_DICT: u8 = 6;
pub const TAG_KEY: u8 = 7;

struct BinaryWriter<'f> {
    out: &'f mut Vec<u8>,
}

fn write_len_prefixed(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u64).to_be_bytes());
    out.extend_from_slice(bytes);
}

impl<'a, 'f> Visitor<'a> for BinaryWriter<'f> {
    fn begin(&mut self, item: &Item<'a>, _depth: usize) {
        match item {
            Item::Entry(kv) => {
                self.out.push(TAG_KEY);
                write_len_prefixed(self.out, &kv.key);
            }
            Item::Value(node) => match node {
                Node::Null => self.out.push(TAG_NULL),
                Node::Bool(b) => {
                    self.out.push(TAG_BOOL);
                    self.out.push(if *b { b'1' } else { b'0' });
                }
                Node::Int(i) => {
                    self.out.push(TAG_INT);
                    self.out.extend_from_slice(&i.to_be_bytes());
                }
                Node::Double(d) => {
                    self.out.push(TAG_DOUBLE);
                    self.out.extend_from_slice(&d.to_be_bytes());
                }
                Node::String(s) => {
                    self.out.push(TAG_STRING);
                    write_len_prefixed(self.out, s);
                }
                Node::Array(v) => {
                    self.out.push(TAG_ARRAY);
                    self.out.extend_from_slice(&(v.len() as u64).to_be_bytes());
                }
                Node::Dict(v) => {
                    self.out.push(TAG_DICT);
                    self.out.extend_from_slice(&(v.len() as u64).to_be_bytes());
                }
            },
        }
    }

    fn delim(&mut self, _parent: &Item<'a>, _depth: usize, _index: usize) {}
    fn end(&mut self, _item: &Item<'a>, _depth: usize) {}
}

pub fn to_binary(root: &Node) -> Vec<u8> {
    let mut out = Vec::new();
    let mut writer = BinaryWriter { out: &mut out };
    walk(root, &mut writer);
    out
}

pub struct Reader<'b> {
    buf: &'b [u8],
    pos: usize,
}

impl<'b> Reader<'b> {
    pub fn new(buf: &'b [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'b [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::LengthTooLarge(n as u64));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    fn read_be_u64(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_be_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn read_be_i64(&mut self) -> Result<i64, CodecError> {
        Ok(i64::from_be_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn read_be_f64(&mut self) -> Result<f64, CodecError> {
        Ok(f64::from_be_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn read_len_prefixed(&mut self) -> Result<Vec<u8>, CodecError> {
        let len = self.read_be_u64()?;
        if len > self.remaining() as u64 {
            return Err(CodecError::LengthTooLarge(len));
        }
        Ok(self.take(len as usize)?.to_vec())
    }

    fn read_count(&mut self) -> Result<u64, CodecError> {
        let count = self.read_be_u64()?;
        // Every element costs at least one tag byte, so a count larger
        // than the remaining buffer can never be genuine.
        if count > self.remaining() as u64 {
            return Err(CodecError::LengthTooLarge(count));
        }
        Ok(count)
    }

    pub fn read_value(&mut self) -> Result<Node, CodecError> {
        match self.read_u8()? {
            TAG_NULL => Ok(Node::Null),
            TAG_BOOL => Ok(Node::Bool(self.read_u8()? == b'1')),
            TAG_INT => Ok(Node::Int(self.read_be_i64()?)),
            TAG_DOUBLE => Ok(Node::Double(self.read_be_f64()?)),
            TAG_STRING => {
                let bytes = self.read_len_prefixed()?;
                Ok(Node::String(bytes))
            }
            TAG_ARRAY => {
                let count = self.read_count()?;
                let mut items = Vec::with_capacity(count.min(4096) as usize);
                for _ in 0..count {
                    items.push(self.read_value()?);
                }
                Ok(Node::Array(items))
            }
            TAG_DICT => {
                let count = self.read_count()?;
                let mut entries = Vec::with_capacity(count.min(4096) as usize);
                for _ in 0..count {
                    let key_tag = self.read_u8()?;
                    if key_tag != TAG_KEY {
                        return Err(CodecError::UnknownTag(key_tag));
                    }
                    let key = self.read_len_prefixed()?;
                    let value = self.read_value()?;
                    entries.push(KeyVal { key, value });
                }
                Ok(Node::Dict(entries))
            }
            other => Err(CodecError::UnknownTag(other)),
        }
    }
}

/// Rust's `Drop` frees every `Node`/`Vec` pushed onto the call stack as
/// soon as a `read_value` frame returns early on error, so there is no
/// separate unwind-and-free path to hand-maintain (§5 "leave no partial
/// trees on error").
pub fn from_binary(buf: &[u8]) -> Result<Node, CodecError> {
    Reader::new(buf).read_value()
}

#[cfg(test)]
mod __tests__ {
    use super::*;

    fn roundtrip(node: Node) {
        let bytes = to_binary(&node);
        assert_eq!(from_binary(&bytes).unwrap(), node);
    }

    #[test]
    fn roundtrips_scalars() {
        roundtrip(Node::Null);
        roundtrip(Node::Bool(true));
        roundtrip(Node::Int(-42));
        roundtrip(Node::Double(3.5));
        roundtrip(Node::String(b"hello".to_vec()));
    }

    #[test]
    fn roundtrips_nested_structure() {
        roundtrip(Node::Dict(vec![KeyVal {
            key: b"a".to_vec(),
            value: Node::Array(vec![Node::Int(1), Node::Dict(vec![])]),
        }]));
    }

    #[test]
    fn rejects_unknown_tag() {
        let err = from_binary(&[0xff]).unwrap_err();
        assert!(matches!(err, CodecError::UnknownTag(0xff)));
    }

    #[test]
    fn rejects_implausible_length() {
        let mut bytes = vec![TAG_STRING];
        bytes.extend_from_slice(&u64::MAX.to_be_bytes());
        let err = from_binary(&bytes).unwrap_err();
        assert!(matches!(err, CodecError::LengthTooLarge(_)));
    }

    #[test]
    fn truncated_buffer_is_an_error_not_a_panic() {
        let bytes = to_binary(&Node::Int(1));
        let err = from_binary(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(err, CodecError::LengthTooLarge(_)));
    }
}
