//! Walks a parsed path against a tree (§4.5), grounded on RedisJSON's
//! `SearchPath_Find`/`SearchPath_FindEx`.

use super::Segment;
use crate::error::{PathError, PathErrorKind};
use crate::node::Node;
use crate::trace::{Level, Tracer};

static TRACER: Tracer = Tracer::new("path::eval", Level::Debug);

#[derive(Debug)]
pub struct Found<'a> {
    pub target: &'a Node,
    /// `None` only for the root path — callers must treat that as
    /// "replace the whole document" (§4.5 edge case).
    pub parent: Option<&'a Node>,
}

pub fn find<'a>(root: &'a Node, segments: &[Segment]) -> Result<Found<'a>, PathError> {
    if segments == [Segment::Root] {
        return Ok(Found { target: root, parent: None });
    }

    let mut parent: Option<&Node> = None;
    let mut current = root;
    for (depth, seg) in segments.iter().enumerate() {
        current = match (current, seg) {
            (Node::Dict(entries), Segment::Key(key)) => match entries.iter().find(|kv| &kv.key == key) {
                Some(kv) => {
                    parent = Some(current);
                    &kv.value
                }
                None => {
                    TRACER.debug(format_args!("no key at depth {}", depth));
                    return Err(PathError { kind: PathErrorKind::NoKey, depth });
                }
            },
            (Node::Array(items), Segment::Index(i)) => {
                let len = items.len() as i64;
                let idx = if *i < 0 { len + i } else { *i };
                if idx < 0 || idx >= len {
                    TRACER.debug(format_args!("index out of range at depth {}", depth));
                    return Err(PathError { kind: PathErrorKind::NoIndex, depth });
                }
                parent = Some(current);
                &items[idx as usize]
            }
            (_, Segment::Root) => unreachable!("Root only ever appears alone"),
            _ => {
                TRACER.debug(format_args!("type mismatch at depth {}", depth));
                return Err(PathError { kind: PathErrorKind::BadType, depth });
            }
        };
    }

    Ok(Found { target: current, parent })
}

fn step_mut<'a>(node: &'a mut Node, seg: &Segment, depth: usize) -> Result<&'a mut Node, PathError> {
    match (node, seg) {
        (Node::Dict(entries), Segment::Key(key)) => entries
            .iter_mut()
            .find(|kv| &kv.key == key)
            .map(|kv| &mut kv.value)
            .ok_or(PathError { kind: PathErrorKind::NoKey, depth }),
        (Node::Array(items), Segment::Index(i)) => {
            let len = items.len() as i64;
            let idx = if *i < 0 { len + i } else { *i };
            if idx < 0 || idx >= len {
                return Err(PathError { kind: PathErrorKind::NoIndex, depth });
            }
            Ok(&mut items[idx as usize])
        }
        (_, Segment::Root) => unreachable!("Root only ever appears alone"),
        _ => Err(PathError { kind: PathErrorKind::BadType, depth }),
    }
}

/// Used by in-place mutators (`NumIncrBy`, `StrAppend`, array/dict
/// mutators) that need `&mut` access to the addressed node itself.
pub fn find_mut<'a>(root: &'a mut Node, segments: &[Segment]) -> Result<&'a mut Node, PathError> {
    if segments == [Segment::Root] {
        return Ok(root);
    }
    let mut current = root;
    for (depth, seg) in segments.iter().enumerate() {
        current = step_mut(current, seg, depth)?;
    }
    Ok(current)
}

/// Used by mutators that replace a slot (`Set`, `Del`) and need the
/// second-to-last node plus the final segment instead of the target
/// itself. Panics if called with `[Segment::Root]`; callers handle the
/// root-replacement case specially per §4.5.
pub fn find_parent_mut<'a>(root: &'a mut Node, segments: &'a [Segment]) -> Result<(&'a mut Node, &'a Segment), PathError> {
    let (last, init) = segments.split_last().expect("path must have at least one segment");
    assert_ne!(*last, Segment::Root, "root path has no parent; callers must special-case it");
    let mut current = root;
    for (depth, seg) in init.iter().enumerate() {
        current = step_mut(current, seg, depth)?;
    }
    Ok((current, last))
}

#[cfg(test)]
mod __tests__ {
    use super::*;
    use crate::node::KeyVal;
    use crate::path::parser::parse;

    fn sample() -> Node {
        Node::Dict(vec![KeyVal {
            key: b"foo".to_vec(),
            value: Node::Dict(vec![KeyVal {
                key: b"bar".to_vec(),
                value: Node::Array(vec![Node::Int(10), Node::Int(20), Node::Int(30)]),
            }]),
        }])
    }

    #[test]
    fn root_has_no_parent() {
        let doc = sample();
        let found = find(&doc, &parse(b".").unwrap()).unwrap();
        assert!(found.parent.is_none());
        assert_eq!(found.target, &doc);
    }

    #[test]
    fn negative_index_resolves_from_end() {
        let doc = sample();
        let found = find(&doc, &parse(b"foo.bar[-1]").unwrap()).unwrap();
        assert_eq!(found.target, &Node::Int(30));
        assert!(found.parent.is_some());
    }

    #[test]
    fn missing_key_reports_depth() {
        let doc = sample();
        let err = find(&doc, &parse(b"foo.missing").unwrap()).unwrap_err();
        assert_eq!(err.kind, PathErrorKind::NoKey);
        assert_eq!(err.depth, 1);
    }

    #[test]
    fn type_mismatch_is_bad_type() {
        let doc = sample();
        let err = find(&doc, &parse(b"foo.bar.baz").unwrap()).unwrap_err();
        assert_eq!(err.kind, PathErrorKind::BadType);
    }
}
