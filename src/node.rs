//! The document tree: a tagged-variant `Node`, its `KeyVal` dict-entry
//! payload, and the Object Model mutation primitives.
//!
//! `Dict`'s children are typed `Vec<KeyVal>` rather than `Vec<Node>` with a
//! `Node::KeyVal` arm, so "a `KeyVal` only ever appears inside a `Dict`" is
//! a fact the type system carries rather than a runtime tag an invariant
//! check has to enforce.

use crate::error::{NodeKind, ObjectError};

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(Vec<u8>),
    Array(Vec<Node>),
    Dict(Vec<KeyVal>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeyVal {
    pub key: Vec<u8>,
    pub value: Node,
}

#[derive(Debug, Clone, Copy)]
pub enum ArithOp {
    Add,
    Mul,
}

/// Mirrors the growth policy of §4.2: double capacity up to roughly 1 MiB
/// worth of slots, then grow in fixed ~1 MiB chunks.
fn grown_capacity<T>(current_cap: usize) -> usize {
    let chunk = (1 << 20) / std::mem::size_of::<T>().max(1);
    if current_cap == 0 {
        4
    } else if current_cap < chunk {
        current_cap * 2
    } else {
        current_cap + chunk
    }
}

fn reserve_one<T>(v: &mut Vec<T>) {
    if v.len() == v.capacity() {
        let target = grown_capacity::<T>(v.capacity());
        v.reserve_exact(target - v.len());
    }
}

fn clamp_index(index: i64, len: usize) -> usize {
    if index < 0 {
        let from_end = len as i64 + index;
        if from_end < 0 {
            0
        } else {
            from_end as usize
        }
    } else if index as usize > len {
        len
    } else {
        index as usize
    }
}

fn wrong_type(expected: NodeKind, actual: &Node) -> ObjectError {
    ObjectError::WrongType { expected, actual: actual.kind() }
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Null => NodeKind::Null,
            Node::Bool(_) => NodeKind::Bool,
            Node::Int(_) => NodeKind::Int,
            Node::Double(_) => NodeKind::Double,
            Node::String(_) => NodeKind::String,
            Node::Array(_) => NodeKind::Array,
            Node::Dict(_) => NodeKind::Object,
        }
    }

    pub fn is_scalar(&self) -> bool {
        !matches!(self, Node::Array(_) | Node::Dict(_))
    }

    pub fn as_array(&self) -> Result<&Vec<Node>, ObjectError> {
        match self {
            Node::Array(v) => Ok(v),
            other => Err(wrong_type(NodeKind::Array, other)),
        }
    }

    pub fn as_array_mut(&mut self) -> Result<&mut Vec<Node>, ObjectError> {
        match self {
            Node::Array(v) => Ok(v),
            other => Err(ObjectError::WrongType { expected: NodeKind::Array, actual: other.kind() }),
        }
    }

    pub fn as_dict(&self) -> Result<&Vec<KeyVal>, ObjectError> {
        match self {
            Node::Dict(v) => Ok(v),
            other => Err(wrong_type(NodeKind::Object, other)),
        }
    }

    pub fn as_dict_mut(&mut self) -> Result<&mut Vec<KeyVal>, ObjectError> {
        match self {
            Node::Dict(v) => Ok(v),
            other => Err(ObjectError::WrongType { expected: NodeKind::Object, actual: other.kind() }),
        }
    }

    /// `Length` (§4.2): byte length for a string, element count for an
    /// array, pair count for a dict.
    pub fn length(&self) -> Result<usize, ObjectError> {
        match self {
            Node::String(s) => Ok(s.len()),
            Node::Array(v) => Ok(v.len()),
            Node::Dict(v) => Ok(v.len()),
            other => Err(ObjectError::WrongType { expected: NodeKind::String, actual: other.kind() }),
        }
    }

    pub fn string_append(&mut self, src: &Node) -> Result<usize, ObjectError> {
        let addition = match src {
            Node::String(b) => b,
            other => return Err(wrong_type(NodeKind::String, other)),
        };
        match self {
            Node::String(dst) => {
                dst.reserve(addition.len());
                dst.extend_from_slice(addition);
                Ok(dst.len())
            }
            other => Err(ObjectError::WrongType { expected: NodeKind::String, actual: other.kind() }),
        }
    }

    pub fn array_append(&mut self, child: Node) -> Result<usize, ObjectError> {
        let arr = self.as_array_mut()?;
        reserve_one(arr);
        arr.push(child);
        Ok(arr.len())
    }

    pub fn array_prepend(&mut self, child: Node) -> Result<usize, ObjectError> {
        self.array_insert(0, Node::Array(vec![child]))
    }

    /// Low-level primitive (§4.2): replaces the slot without freeing the
    /// prior occupant. The caller gets it back and decides its fate.
    pub fn array_set(&mut self, index: i64, child: Node) -> Result<Node, ObjectError> {
        let arr = self.as_array_mut()?;
        let len = arr.len();
        if index < 0 || index as usize >= len {
            return Err(ObjectError::IndexOutOfRange { index, length: len });
        }
        Ok(std::mem::replace(&mut arr[index as usize], child))
    }

    pub fn array_item(&self, index: i64) -> Result<&Node, ObjectError> {
        let arr = self.as_array()?;
        let len = arr.len();
        if index < 0 || index as usize >= len {
            return Err(ObjectError::IndexOutOfRange { index, length: len });
        }
        Ok(&arr[index as usize])
    }

    pub fn array_insert(&mut self, index: i64, sub: Node) -> Result<usize, ObjectError> {
        let items = match sub {
            Node::Array(v) => v,
            other => return Err(wrong_type(NodeKind::Array, &other)),
        };
        let arr = self.as_array_mut()?;
        let at = clamp_index(index, arr.len());
        let inserted = items.len();
        arr.splice(at..at, items);
        Ok(inserted)
    }

    pub fn array_del_range(&mut self, index: i64, count: i64) -> Result<usize, ObjectError> {
        let arr = self.as_array_mut()?;
        let len = arr.len();
        let start = clamp_index(index, len);
        let count = if count < 0 { 0 } else { count as usize };
        let end = (start + count).min(len);
        Ok(arr.drain(start..end).count())
    }

    /// Supplemented op (`ArrTrim`, SPEC_FULL §3.2): two `ArrayDelRange`
    /// calls, tail first so the head offset stays valid.
    pub fn array_trim(&mut self, start: i64, stop: i64) -> Result<usize, ObjectError> {
        let len = self.as_array()?.len();
        let s = clamp_index(start, len);
        let e = clamp_index(stop, len);
        let tail_count = len.saturating_sub(e + 1);
        if tail_count > 0 {
            self.array_del_range((e + 1) as i64, tail_count as i64)?;
        }
        if s > 0 {
            self.array_del_range(0, s as i64)?;
        }
        self.length()
    }

    pub fn array_index(&self, target: &Node, start: i64, stop: i64) -> Result<i64, ObjectError> {
        if !target.is_scalar() {
            return Ok(-1);
        }
        let arr = self.as_array()?;
        let s = clamp_index(start, arr.len());
        let e = clamp_index(stop, arr.len());
        if s >= e {
            return Ok(-1);
        }
        for (idx, item) in arr.iter().enumerate().take(e).skip(s) {
            if item == target {
                return Ok(idx as i64);
            }
        }
        Ok(-1)
    }

    /// Returns `true` if `key` was newly inserted (`Length` grows by one),
    /// `false` if an existing entry's value was replaced in place.
    pub fn dict_set(&mut self, key: &[u8], value: Node) -> Result<bool, ObjectError> {
        let dict = self.as_dict_mut()?;
        if let Some(kv) = dict.iter_mut().find(|kv| kv.key == key) {
            kv.value = value;
            Ok(false)
        } else {
            reserve_one(dict);
            dict.push(KeyVal { key: key.to_vec(), value });
            Ok(true)
        }
    }

    pub fn dict_set_keyval(&mut self, entry: KeyVal) -> Result<bool, ObjectError> {
        let dict = self.as_dict_mut()?;
        if let Some(slot) = dict.iter().position(|kv| kv.key == entry.key) {
            dict[slot] = entry;
            Ok(false)
        } else {
            reserve_one(dict);
            dict.push(entry);
            Ok(true)
        }
    }

    pub fn dict_del(&mut self, key: &[u8]) -> Result<bool, ObjectError> {
        let dict = self.as_dict_mut()?;
        match dict.iter().position(|kv| kv.key == key) {
            Some(pos) => {
                dict.swap_remove(pos);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn dict_get(&self, key: &[u8]) -> Result<Option<&Node>, ObjectError> {
        Ok(self.as_dict()?.iter().find(|kv| kv.key == key).map(|kv| &kv.value))
    }

    /// Supplemented op (`OBJKEYS`, SPEC_FULL §3.3).
    pub fn obj_keys(&self) -> Result<impl Iterator<Item = &[u8]>, ObjectError> {
        Ok(self.as_dict()?.iter().map(|kv| kv.key.as_slice()))
    }

    /// Supplemented op (`OBJKEYS`/`OBJVALUES`, SPEC_FULL §3.3).
    pub fn obj_values(&self) -> Result<impl Iterator<Item = &Node>, ObjectError> {
        Ok(self.as_dict()?.iter().map(|kv| &kv.value))
    }

    fn as_numeric(&self) -> Result<(bool, i64, f64), ObjectError> {
        match self {
            Node::Int(i) => Ok((true, *i, *i as f64)),
            Node::Double(d) => Ok((false, 0, *d)),
            _ => Err(ObjectError::NotNumeric),
        }
    }

    /// Arithmetic on two numeric nodes (§4.2/§7, and `NumMultBy`,
    /// SPEC_FULL §3.2): `Int op Int` stays `Int` iff the exact result fits
    /// in 64 bits, else promotes to `Double`; never promotes on read.
    pub fn numeric_op(&mut self, op: ArithOp, operand: &Node) -> Result<Node, ObjectError> {
        let (a_is_int, a_i, a_f) = self.as_numeric()?;
        let (b_is_int, b_i, b_f) = operand.as_numeric()?;

        let result = if a_is_int && b_is_int {
            let checked = match op {
                ArithOp::Add => a_i.checked_add(b_i),
                ArithOp::Mul => a_i.checked_mul(b_i),
            };
            match checked {
                Some(v) => Node::Int(v),
                None => Node::Double(finite_or_err(match op {
                    ArithOp::Add => a_f + b_f,
                    ArithOp::Mul => a_f * b_f,
                })?),
            }
        } else {
            Node::Double(finite_or_err(match op {
                ArithOp::Add => a_f + b_f,
                ArithOp::Mul => a_f * b_f,
            })?)
        };

        *self = result.clone();
        Ok(result)
    }

    pub fn print_tree(&self) -> std::io::Result<()> {
        ptree::print_tree(&TreeView::build(self))
    }
}

fn finite_or_err(d: f64) -> Result<f64, ObjectError> {
    if d.is_finite() {
        Ok(d)
    } else {
        Err(ObjectError::NonFiniteResult)
    }
}

#[derive(Clone)]
struct TreeView {
    label: String,
    children: Vec<TreeView>,
}

impl TreeView {
    fn build(node: &Node) -> Self {
        match node {
            Node::Null => TreeView { label: "null".into(), children: vec![] },
            Node::Bool(b) => TreeView { label: b.to_string(), children: vec![] },
            Node::Int(i) => TreeView { label: i.to_string(), children: vec![] },
            Node::Double(d) => TreeView { label: d.to_string(), children: vec![] },
            Node::String(s) => TreeView { label: format!("{:?}", String::from_utf8_lossy(s)), children: vec![] },
            Node::Array(items) => TreeView {
                label: format!("array[{}]", items.len()),
                children: items.iter().map(TreeView::build).collect(),
            },
            Node::Dict(entries) => TreeView {
                label: format!("object[{}]", entries.len()),
                children: entries
                    .iter()
                    .map(|kv| TreeView {
                        label: String::from_utf8_lossy(&kv.key).into_owned(),
                        children: vec![TreeView::build(&kv.value)],
                    })
                    .collect(),
            },
        }
    }
}

impl ptree::TreeItem for TreeView {
    type Child = TreeView;

    fn write_self<W: std::io::Write>(&self, f: &mut W, style: &ptree::Style) -> std::io::Result<()> {
        write!(f, "{}", style.paint(&self.label))
    }

    fn children(&self) -> std::borrow::Cow<[Self::Child]> {
        std::borrow::Cow::from(&self.children)
    }
}

#[cfg(test)]
mod __tests__ {
    use super::*;

    #[test]
    fn dict_set_reports_whether_key_was_new() {
        let mut dict = Node::Dict(Vec::new());
        assert_eq!(dict.dict_set(b"a", Node::Int(1)).unwrap(), true);
        assert_eq!(dict.length().unwrap(), 1);
        assert_eq!(dict.dict_set(b"a", Node::Int(2)).unwrap(), false);
        assert_eq!(dict.length().unwrap(), 1);
        assert_eq!(dict.dict_get(b"a").unwrap(), Some(&Node::Int(2)));
    }

    #[test]
    fn array_insert_shifts_by_sub_length() {
        let mut arr = Node::Array(vec![Node::Int(1), Node::Int(2), Node::Int(3)]);
        let inserted = arr.array_insert(1, Node::Array(vec![Node::Int(9), Node::Int(8)])).unwrap();
        assert_eq!(inserted, 2);
        assert_eq!(arr, Node::Array(vec![Node::Int(1), Node::Int(9), Node::Int(8), Node::Int(2), Node::Int(3)]));
    }

    #[test]
    fn array_del_range_never_traps() {
        let mut arr = Node::Array(vec![Node::Int(1), Node::Int(2)]);
        assert_eq!(arr.array_del_range(-100, 1000).unwrap(), 2);
        assert_eq!(arr, Node::Array(vec![]));
        assert_eq!(arr.array_del_range(5, 5).unwrap(), 0);
    }

    #[test]
    fn array_trim_matches_scenario() {
        let mut arr = Node::Array((1..=5).map(Node::Int).collect());
        arr.array_insert(-2, Node::Array(vec![Node::Int(0)])).unwrap();
        assert_eq!(arr, Node::Array(vec![1, 2, 3, 0, 4, 5].into_iter().map(Node::Int).collect()));
        arr.array_trim(1, 4).unwrap();
        assert_eq!(arr, Node::Array(vec![2, 3, 0, 4].into_iter().map(Node::Int).collect()));
    }

    #[test]
    fn array_index_rejects_non_scalar_target() {
        let arr = Node::Array(vec![Node::Array(vec![])]);
        assert_eq!(arr.array_index(&Node::Array(vec![]), 0, 1).unwrap(), -1);
    }

    #[test]
    fn numeric_op_promotes_on_overflow() {
        let mut n = Node::Int(i64::MAX);
        let result = n.numeric_op(ArithOp::Add, &Node::Int(1)).unwrap();
        assert!(matches!(result, Node::Double(_)));
        assert!(matches!(n, Node::Double(_)));
    }

    #[test]
    fn numeric_op_stays_int_when_it_fits() {
        let mut n = Node::Int(10);
        let result = n.numeric_op(ArithOp::Add, &Node::Int(5)).unwrap();
        assert_eq!(result, Node::Int(15));
    }

    #[test]
    fn dict_set_keyval_replaces_in_place_without_reordering() {
        let mut dict = Node::Dict(vec![
            KeyVal { key: b"a".to_vec(), value: Node::Int(1) },
            KeyVal { key: b"b".to_vec(), value: Node::Int(2) },
        ]);
        let was_new = dict.dict_set_keyval(KeyVal { key: b"a".to_vec(), value: Node::Int(9) }).unwrap();
        assert_eq!(was_new, false);
        assert_eq!(dict.as_dict().unwrap()[0].value, Node::Int(9));
        assert_eq!(dict.as_dict().unwrap()[1].key, b"b");

        let was_new = dict.dict_set_keyval(KeyVal { key: b"c".to_vec(), value: Node::Int(3) }).unwrap();
        assert_eq!(was_new, true);
        assert_eq!(dict.length().unwrap(), 3);
    }
}
