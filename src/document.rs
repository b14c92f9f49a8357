//! The `Document` handle (§6): a document id plus its root [`Node`], and
//! every path-addressed operation the host adapter needs — each mutator
//! resolves its path with [`crate::path::eval`], applies the matching
//! [`Node`] primitive, then invalidates the serialization cache at that
//! path per §4.7's rule ("invalidated on writes to a document at or
//! containing a path").

use crate::builder::parse_json;
use crate::cache::{Cache, DocId};
use crate::codec::{from_binary, to_binary};
use crate::config::{JsonFormat, LexerLimits};
use crate::error::{CodecError, JsonParseError, NodeKind, ObjectError, PathError, PathErrorKind, PathParseError};
use crate::node::{ArithOp, Node};
use crate::path::eval::find_parent_mut;
use crate::path::{self, Segment};
use crate::serializer::{memory_usage, to_json};

#[derive(Debug)]
pub enum DocumentError {
    PathSyntax(PathParseError),
    Path(PathError),
    Object(ObjectError),
    Parse(JsonParseError),
    Codec(CodecError),
}

impl From<PathParseError> for DocumentError {
    fn from(e: PathParseError) -> Self {
        DocumentError::PathSyntax(e)
    }
}
impl From<PathError> for DocumentError {
    fn from(e: PathError) -> Self {
        DocumentError::Path(e)
    }
}
impl From<ObjectError> for DocumentError {
    fn from(e: ObjectError) -> Self {
        DocumentError::Object(e)
    }
}
impl From<JsonParseError> for DocumentError {
    fn from(e: JsonParseError) -> Self {
        DocumentError::Parse(e)
    }
}
impl From<CodecError> for DocumentError {
    fn from(e: CodecError) -> Self {
        DocumentError::Codec(e)
    }
}

impl std::fmt::Display for DocumentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentError::PathSyntax(e) => write!(f, "{}", e),
            DocumentError::Path(e) => write!(f, "{}", e),
            DocumentError::Object(e) => write!(f, "{}", e),
            DocumentError::Parse(e) => write!(f, "{}", e),
            DocumentError::Codec(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for DocumentError {}

pub struct Document {
    pub id: DocId,
    pub root: Node,
}

impl Document {
    pub fn new(id: DocId, root: Node) -> Self {
        Self { id, root }
    }

    pub fn from_json(id: DocId, text: &[u8], limits: LexerLimits) -> Result<Self, DocumentError> {
        Ok(Self::new(id, parse_json(text, limits)?))
    }

    pub fn from_binary(id: DocId, bytes: &[u8]) -> Result<Self, DocumentError> {
        Ok(Self::new(id, from_binary(bytes)?))
    }

    pub fn to_binary(&self) -> Vec<u8> {
        to_binary(&self.root)
    }

    pub fn memory_usage(&self) -> usize {
        memory_usage(&self.root)
    }

    fn segments(path: &[u8]) -> Result<Vec<Segment>, DocumentError> {
        Ok(path::parse(path)?)
    }

    fn resolve(&self, path: &[u8]) -> Result<&Node, DocumentError> {
        let segments = Self::segments(path)?;
        Ok(path::eval::find(&self.root, &segments)?.target)
    }

    fn resolve_mut(&mut self, path: &[u8]) -> Result<&mut Node, DocumentError> {
        let segments = Self::segments(path)?;
        Ok(path::eval::find_mut(&mut self.root, &segments)?)
    }

    pub fn get<'a>(&'a self, path: &[u8]) -> Result<&'a Node, DocumentError> {
        self.resolve(path)
    }

    pub fn kind(&self, path: &[u8]) -> Result<NodeKind, DocumentError> {
        Ok(self.resolve(path)?.kind())
    }

    pub fn length(&self, path: &[u8]) -> Result<usize, DocumentError> {
        Ok(self.resolve(path)?.length()?)
    }

    /// Serves a JSON-text rendering of the node at `path`, consulting
    /// `cache` first and populating it on a miss.
    pub fn get_serialized(&self, cache: &mut Cache, path: &[u8], format: &JsonFormat) -> Result<Vec<u8>, DocumentError> {
        if let Some(hit) = cache.get(self.id, path) {
            return Ok(hit);
        }
        let bytes = to_json(self.resolve(path)?, format);
        cache.add(self.id, path, bytes.clone());
        Ok(bytes)
    }

    pub fn set(&mut self, cache: &mut Cache, path: &[u8], value: Node) -> Result<(), DocumentError> {
        let segments = Self::segments(path)?;
        if segments == [Segment::Root] {
            self.root = value;
        } else {
            let (parent, last) = find_parent_mut(&mut self.root, &segments)?;
            match last {
                Segment::Key(key) => {
                    parent.dict_set(key, value)?;
                }
                Segment::Index(index) => {
                    parent.array_set(*index, value)?;
                }
                Segment::Root => unreachable!("Root only ever appears alone"),
            }
        }
        cache.clear_path(self.id, path);
        Ok(())
    }

    pub fn del(&mut self, cache: &mut Cache, path: &[u8]) -> Result<bool, DocumentError> {
        let segments = Self::segments(path)?;
        if segments == [Segment::Root] {
            return Err(PathError { kind: PathErrorKind::BadType, depth: 0 }.into());
        }
        let (parent, last) = find_parent_mut(&mut self.root, &segments)?;
        let deleted = match last {
            Segment::Key(key) => parent.dict_del(key)?,
            Segment::Index(index) => parent.array_del_range(*index, 1)? > 0,
            Segment::Root => unreachable!("Root only ever appears alone"),
        };
        if deleted {
            cache.clear_path(self.id, path);
        }
        Ok(deleted)
    }

    pub fn numeric_op(&mut self, cache: &mut Cache, path: &[u8], op: ArithOp, operand: &Node) -> Result<Node, DocumentError> {
        let result = self.resolve_mut(path)?.numeric_op(op, operand)?;
        cache.clear_path(self.id, path);
        Ok(result)
    }

    pub fn string_append(&mut self, cache: &mut Cache, path: &[u8], addition: &Node) -> Result<usize, DocumentError> {
        let new_len = self.resolve_mut(path)?.string_append(addition)?;
        cache.clear_path(self.id, path);
        Ok(new_len)
    }

    pub fn array_append(&mut self, cache: &mut Cache, path: &[u8], child: Node) -> Result<usize, DocumentError> {
        let len = self.resolve_mut(path)?.array_append(child)?;
        cache.clear_path(self.id, path);
        Ok(len)
    }

    pub fn array_prepend(&mut self, cache: &mut Cache, path: &[u8], child: Node) -> Result<usize, DocumentError> {
        let len = self.resolve_mut(path)?.array_prepend(child)?;
        cache.clear_path(self.id, path);
        Ok(len)
    }

    pub fn array_insert(&mut self, cache: &mut Cache, path: &[u8], index: i64, sub: Node) -> Result<usize, DocumentError> {
        let inserted = self.resolve_mut(path)?.array_insert(index, sub)?;
        cache.clear_path(self.id, path);
        Ok(inserted)
    }

    pub fn array_del_range(&mut self, cache: &mut Cache, path: &[u8], index: i64, count: i64) -> Result<usize, DocumentError> {
        let removed = self.resolve_mut(path)?.array_del_range(index, count)?;
        if removed > 0 {
            cache.clear_path(self.id, path);
        }
        Ok(removed)
    }

    pub fn array_trim(&mut self, cache: &mut Cache, path: &[u8], start: i64, stop: i64) -> Result<usize, DocumentError> {
        let len = self.resolve_mut(path)?.array_trim(start, stop)?;
        cache.clear_path(self.id, path);
        Ok(len)
    }

    pub fn array_index(&self, path: &[u8], target: &Node, start: i64, stop: i64) -> Result<i64, DocumentError> {
        Ok(self.resolve(path)?.array_index(target, start, stop)?)
    }

    pub fn dict_set(&mut self, cache: &mut Cache, path: &[u8], key: &[u8], value: Node) -> Result<bool, DocumentError> {
        let was_new = self.resolve_mut(path)?.dict_set(key, value)?;
        cache.clear_path(self.id, path);
        Ok(was_new)
    }

    pub fn dict_del(&mut self, cache: &mut Cache, path: &[u8], key: &[u8]) -> Result<bool, DocumentError> {
        let removed = self.resolve_mut(path)?.dict_del(key)?;
        if removed {
            cache.clear_path(self.id, path);
        }
        Ok(removed)
    }

    pub fn obj_keys(&self, path: &[u8]) -> Result<Vec<Vec<u8>>, DocumentError> {
        Ok(self.resolve(path)?.obj_keys()?.map(|k| k.to_vec()).collect())
    }

    pub fn obj_values(&self, path: &[u8]) -> Result<Vec<Node>, DocumentError> {
        Ok(self.resolve(path)?.obj_values()?.cloned().collect())
    }
}

#[cfg(test)]
mod __tests__ {
    use super::*;
    use crate::config::CacheLimits;

    fn doc(json: &str) -> Document {
        Document::from_json(1, json.as_bytes(), LexerLimits::default()).unwrap()
    }

    fn cache() -> Cache {
        Cache::new(CacheLimits::default())
    }

    #[test]
    fn set_replaces_existing_key_and_invalidates_cache() {
        let mut d = doc(r#"{"a":1}"#);
        let mut c = cache();
        let _ = d.get_serialized(&mut c, b".a", &JsonFormat::compact()).unwrap();
        d.set(&mut c, b".a", Node::Int(2)).unwrap();
        assert_eq!(d.get(b".a").unwrap(), &Node::Int(2));
        let rendered = d.get_serialized(&mut c, b".a", &JsonFormat::compact()).unwrap();
        assert_eq!(rendered, b"2");
    }

    #[test]
    fn set_at_root_replaces_whole_document() {
        let mut d = doc(r#"{"a":1}"#);
        let mut c = cache();
        d.set(&mut c, b".", Node::Array(vec![Node::Int(9)])).unwrap();
        assert_eq!(d.root, Node::Array(vec![Node::Int(9)]));
    }

    #[test]
    fn del_reports_whether_it_removed_anything() {
        let mut d = doc(r#"{"a":1}"#);
        let mut c = cache();
        assert_eq!(d.del(&mut c, b".a").unwrap(), true);
        assert_eq!(d.del(&mut c, b".a").unwrap(), false);
    }

    #[test]
    fn numeric_op_rejects_non_numeric_target() {
        let mut d = doc(r#"{"a":"x"}"#);
        let mut c = cache();
        let err = d.numeric_op(&mut c, b".a", ArithOp::Add, &Node::Int(1)).unwrap_err();
        assert!(matches!(err, DocumentError::Object(ObjectError::NotNumeric)));
    }

    #[test]
    fn array_append_grows_the_array_at_path() {
        let mut d = doc(r#"{"a":[1,2]}"#);
        let mut c = cache();
        let len = d.array_append(&mut c, b".a", Node::Int(3)).unwrap();
        assert_eq!(len, 3);
        assert_eq!(d.get(b".a").unwrap(), &Node::Array(vec![Node::Int(1), Node::Int(2), Node::Int(3)]));
    }

    #[test]
    fn binary_roundtrip_preserves_the_tree() {
        let d = doc(r#"{"a":[1,"b",null]}"#);
        let reloaded = Document::from_binary(d.id, &d.to_binary()).unwrap();
        assert_eq!(d.root, reloaded.root);
    }
}
