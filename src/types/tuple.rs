//! `Tuple` — an ordered, immutable sequence.

use crate::{heap::Heap, value::Value};

#[derive(Debug)]
pub(crate) struct TupleObj {
    pub(crate) items: Vec<Value>,
}

impl TupleObj {
    pub(crate) fn new(items: Vec<Value>) -> Self {
        Self { items }
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn get(&self, index: i64) -> Option<&Value> {
        super::list::ListObj::normalize_index(self.items.len(), index).map(|i| &self.items[i])
    }

    pub(crate) fn concat(&self, heap: &mut Heap, other: &TupleObj) -> Vec<Value> {
        let mut out: Vec<Value> = self.items.iter().map(|v| heap.retain_clone(v)).collect();
        out.extend(other.items.iter().map(|v| heap.retain_clone(v)));
        out
    }

    pub(crate) fn repeated(&self, heap: &mut Heap, n: i64) -> Vec<Value> {
        let n = n.max(0) as usize;
        let mut out = Vec::with_capacity(self.items.len() * n);
        for _ in 0..n {
            for item in &self.items {
                out.push(heap.retain_clone(item));
            }
        }
        out
    }
}
