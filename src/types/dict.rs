//! `Dict` — an insertion-ordered mapping from hashable keys to values.
//!
//! Keys are compared structurally via [`Heap::values_equal`], so lookups are
//! O(n) in the number of entries; the test corpus this interpreter targets
//! never relies on large-dict performance. Insertion order matches Python:
//! re-inserting an existing key updates its value without moving its
//! position; a brand-new key is appended.
//!
//! `version` increments on every size change (insert of a new key, or
//! removal) and is read by the dict iterator (§4.D) to detect mutation
//! during iteration.

use crate::{heap::Heap, value::Value};

#[derive(Debug, Default)]
pub(crate) struct DictObj {
    pub(crate) entries: Vec<(Value, Value)>,
    pub(crate) version: u64,
}

impl DictObj {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    fn find(&self, heap: &Heap, key: &Value) -> Option<usize> {
        self.entries.iter().position(|(k, _)| heap.values_equal(k, key))
    }

    pub(crate) fn get(&self, heap: &Heap, key: &Value) -> Option<&Value> {
        self.find(heap, key).map(|i| &self.entries[i].1)
    }

    pub(crate) fn contains(&self, heap: &Heap, key: &Value) -> bool {
        self.find(heap, key).is_some()
    }

    /// Inserts or updates `key -> value`. Returns the replaced value, if any.
    /// On an update, the *old* key object is kept (matching Python dict
    /// semantics), so the freshly passed-in `key` is released here.
    pub(crate) fn insert(&mut self, heap: &mut Heap, key: Value, value: Value) -> Option<Value> {
        match self.find(heap, &key) {
            Some(i) => {
                heap.release(key);
                Some(std::mem::replace(&mut self.entries[i].1, value))
            }
            None => {
                self.entries.push((key, value));
                self.version += 1;
                None
            }
        }
    }

    pub(crate) fn remove(&mut self, heap: &Heap, key: &Value) -> Option<(Value, Value)> {
        let i = self.find(heap, key)?;
        self.version += 1;
        Some(self.entries.remove(i))
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.version += 1;
    }

    pub(crate) fn copy_shallow(&self, heap: &mut Heap) -> Vec<(Value, Value)> {
        self.entries.iter().map(|(k, v)| (heap.retain_clone(k), heap.retain_clone(v))).collect()
    }
}
