//! Per-document LRU serialization cache (§4.7), grounded on RedisJSON's
//! `cache.c`: a global doubly-linked LRU list over a slab of slots, with
//! a second, singly-linked chain per document so invalidating a whole
//! document (or everything under a path prefix) doesn't require scanning
//! every entry in the cache.

use crate::config::CacheLimits;
use crate::trace::{Level, Tracer};
use std::collections::HashMap;

static TRACER: Tracer = Tracer::new("cache", Level::Debug);

pub type DocId = u64;

struct CacheEntry {
    doc: DocId,
    path: Vec<u8>,
    bytes: Vec<u8>,
    prev: Option<usize>,
    next: Option<usize>,
    doc_next: Option<usize>,
}

impl CacheEntry {
    fn cost(&self) -> usize {
        self.path.len() + self.bytes.len()
    }
}

pub struct Cache {
    slots: Vec<Option<CacheEntry>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    doc_heads: HashMap<DocId, usize>,
    total_bytes: usize,
    count: usize,
    limits: CacheLimits,
}

/// A serialized path overlaps another when one is a byte-prefix of the
/// other — writing `a.b` must also drop a cached `a` (its parent) and a
/// cached `a.b.c` (its child), since both read through the mutated node.
fn overlaps(a: &[u8], b: &[u8]) -> bool {
    a.starts_with(b) || b.starts_with(a)
}

impl Cache {
    pub fn new(limits: CacheLimits) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            doc_heads: HashMap::new(),
            total_bytes: 0,
            count: 0,
            limits,
        }
    }

    pub fn get(&mut self, doc: DocId, path: &[u8]) -> Option<Vec<u8>> {
        let idx = match self.find(doc, path) {
            Some(idx) => idx,
            None => {
                TRACER.debug(format_args!("miss doc={} path={}", doc, String::from_utf8_lossy(path)));
                return None;
            }
        };
        TRACER.debug(format_args!("hit doc={} path={}", doc, String::from_utf8_lossy(path)));
        self.unlink_global(idx);
        self.push_front_global(idx);
        Some(self.slots[idx].as_ref().unwrap().bytes.clone())
    }

    pub fn add(&mut self, doc: DocId, path: &[u8], bytes: Vec<u8>) {
        if bytes.len() < self.limits.min_size {
            return;
        }
        self.clear_path(doc, path);

        let cost = path.len() + bytes.len();
        while self.count > 0 && (self.count >= self.limits.max_entries || self.total_bytes + cost > self.limits.max_bytes) {
            self.evict_oldest();
        }
        if cost > self.limits.max_bytes {
            return; // a single entry too large to ever fit is simply not cached
        }

        let doc_next = self.doc_heads.get(&doc).copied();
        let entry = CacheEntry { doc, path: path.to_vec(), bytes, prev: None, next: None, doc_next };
        let idx = self.alloc_slot(entry);
        self.doc_heads.insert(doc, idx);
        self.total_bytes += cost;
        self.count += 1;
        self.push_front_global(idx);
    }

    /// Drops every cached entry for `doc` whose path overlaps `path`.
    pub fn clear_path(&mut self, doc: DocId, path: &[u8]) {
        let mut kept_head = None;
        let mut kept_tail: Option<usize> = None;
        let mut cursor = self.doc_heads.remove(&doc);

        while let Some(idx) = cursor {
            let next = self.slots[idx].as_ref().unwrap().doc_next;
            if overlaps(&self.slots[idx].as_ref().unwrap().path, path) {
                self.unlink_global(idx);
                self.free_slot(idx);
            } else if let Some(tail) = kept_tail {
                self.slots[tail].as_mut().unwrap().doc_next = Some(idx);
                kept_tail = Some(idx);
            } else {
                kept_head = Some(idx);
                kept_tail = Some(idx);
            }
            cursor = next;
        }

        if let Some(tail) = kept_tail {
            self.slots[tail].as_mut().unwrap().doc_next = None;
        }
        if let Some(head) = kept_head {
            self.doc_heads.insert(doc, head);
        }
    }

    pub fn clear_document(&mut self, doc: DocId) {
        self.clear_path(doc, b"");
    }

    fn find(&self, doc: DocId, path: &[u8]) -> Option<usize> {
        let mut cursor = self.doc_heads.get(&doc).copied();
        while let Some(idx) = cursor {
            let entry = self.slots[idx].as_ref().unwrap();
            if entry.path == path {
                return Some(idx);
            }
            cursor = entry.doc_next;
        }
        None
    }

    fn evict_oldest(&mut self) {
        if let Some(idx) = self.tail {
            let entry = self.slots[idx].as_ref().unwrap();
            let (doc, path) = (entry.doc, entry.path.clone());
            TRACER.debug(format_args!("evict doc={} path={}", doc, String::from_utf8_lossy(&path)));
            self.unlink_global(idx);
            self.free_slot(idx);
            self.remove_from_doc_chain(doc, &path);
        }
    }

    fn remove_from_doc_chain(&mut self, doc: DocId, path: &[u8]) {
        let mut prev: Option<usize> = None;
        let mut cursor = self.doc_heads.get(&doc).copied();
        while let Some(idx) = cursor {
            let (next, is_match) = match self.slots[idx].as_ref() {
                Some(entry) => (entry.doc_next, entry.path == path),
                None => (None, true), // already freed by the caller; unlink it
            };
            if is_match {
                match prev {
                    Some(p) => self.slots[p].as_mut().unwrap().doc_next = next,
                    None => match next {
                        Some(n) => {
                            self.doc_heads.insert(doc, n);
                        }
                        None => {
                            self.doc_heads.remove(&doc);
                        }
                    },
                }
                return;
            }
            prev = Some(idx);
            cursor = next;
        }
    }

    fn alloc_slot(&mut self, entry: CacheEntry) -> usize {
        match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(entry);
                idx
            }
            None => {
                self.slots.push(Some(entry));
                self.slots.len() - 1
            }
        }
    }

    fn free_slot(&mut self, idx: usize) {
        if let Some(entry) = self.slots[idx].take() {
            self.total_bytes -= entry.cost();
            self.count -= 1;
        }
        self.free.push(idx);
    }

    fn unlink_global(&mut self, idx: usize) {
        let (prev, next) = {
            let entry = self.slots[idx].as_ref().unwrap();
            (entry.prev, entry.next)
        };
        match prev {
            Some(p) => self.slots[p].as_mut().unwrap().next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slots[n].as_mut().unwrap().prev = prev,
            None => self.tail = prev,
        }
        if let Some(entry) = self.slots[idx].as_mut() {
            entry.prev = None;
            entry.next = None;
        }
    }

    fn push_front_global(&mut self, idx: usize) {
        let old_head = self.head;
        if let Some(entry) = self.slots[idx].as_mut() {
            entry.prev = None;
            entry.next = old_head;
        }
        if let Some(h) = old_head {
            self.slots[h].as_mut().unwrap().prev = Some(idx);
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }
}

#[cfg(test)]
mod __tests__ {
    use super::*;

    fn limits(max_entries: usize) -> CacheLimits {
        CacheLimits { max_entries, max_bytes: 1 << 20, min_size: 0 }
    }

    #[test]
    fn get_after_add_hits() {
        let mut cache = Cache::new(limits(8));
        cache.add(1, b".a", b"1".to_vec());
        assert_eq!(cache.get(1, b".a"), Some(b"1".to_vec()));
        assert_eq!(cache.get(1, b".b"), None);
    }

    #[test]
    fn max_entries_evicts_least_recently_used() {
        let mut cache = Cache::new(limits(2));
        cache.add(1, b".a", b"1".to_vec());
        cache.add(1, b".b", b"2".to_vec());
        cache.get(1, b".a"); // touch .a, making .b the LRU entry
        cache.add(1, b".c", b"3".to_vec());
        assert_eq!(cache.get(1, b".a"), Some(b"1".to_vec()));
        assert_eq!(cache.get(1, b".b"), None);
        assert_eq!(cache.get(1, b".c"), Some(b"3".to_vec()));
    }

    #[test]
    fn clear_path_also_clears_overlapping_ancestor_and_descendant() {
        let mut cache = Cache::new(limits(8));
        cache.add(1, b"", b"whole-doc".to_vec());
        cache.add(1, b".a", b"a-value".to_vec());
        cache.add(1, b".a.b", b"nested".to_vec());
        cache.add(1, b".z", b"untouched".to_vec());

        cache.clear_path(1, b".a");

        assert_eq!(cache.get(1, b""), None);
        assert_eq!(cache.get(1, b".a"), None);
        assert_eq!(cache.get(1, b".a.b"), None);
        assert_eq!(cache.get(1, b".z"), Some(b"untouched".to_vec()));
    }

    #[test]
    fn clear_document_drops_every_path_for_that_document_only() {
        let mut cache = Cache::new(limits(8));
        cache.add(1, b".a", b"1".to_vec());
        cache.add(2, b".a", b"2".to_vec());

        cache.clear_document(1);

        assert_eq!(cache.get(1, b".a"), None);
        assert_eq!(cache.get(2, b".a"), Some(b"2".to_vec()));
    }

    #[test]
    fn entries_below_min_size_are_never_cached() {
        let mut cache = Cache::new(CacheLimits { max_entries: 8, max_bytes: 1 << 20, min_size: 10 });
        cache.add(1, b".a", b"tiny".to_vec());
        assert_eq!(cache.get(1, b".a"), None);
    }
}
