//! The object store (§3, §4.A, §5): reference-counted heap cells plus a
//! trial-deletion cycle collector.
//!
//! Every heap-resident value lives in a `Cell` addressed by a `HeapId`.
//! `alloc` hands back a handle with refcount 1; `retain`/`release` adjust
//! it, and `release` to zero recursively releases owned children. Cycles
//! (a list containing itself, two lists containing each other) never reach
//! zero through plain refcounting, so `collect_cycles` runs a mark-sweep
//! pass that finds cells whose only incoming references are from other
//! members of the same unreachable group and frees the whole group at once.

use std::fmt;

use crate::{
    exception::{ExceptionObject, ExcType, RunError},
    function::{BuiltinObj, ExternalObj, FunctionObj},
    resource::{ResourceError, ResourceTracker},
    types::{BytesObj, DictObj, IterObj, ListObj, RangeObj, SetObj, StrObj, TupleObj},
    value::{EitherStr, InlineStr, Value, INLINE_STR_BOUND},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct HeapId(u32);

pub(crate) enum HeapData {
    Str(StrObj),
    Bytes(BytesObj),
    List(ListObj),
    Tuple(TupleObj),
    Dict(DictObj),
    Set(SetObj),
    Range(RangeObj),
    Function(FunctionObj),
    External(ExternalObj),
    Builtin(BuiltinObj),
    Exception(ExceptionObject),
    Iterator(IterObj),
}

impl HeapData {
    fn type_name(&self) -> &'static str {
        match self {
            Self::Str(_) => "str",
            Self::Bytes(_) => "bytes",
            Self::List(_) => "list",
            Self::Tuple(_) => "tuple",
            Self::Dict(_) => "dict",
            Self::Set(_) => "set",
            Self::Range(_) => "range",
            Self::Function(_) => "function",
            Self::External(_) => "external_function",
            Self::Builtin(_) => "builtin_function_or_method",
            Self::Exception(_) => "exception",
            Self::Iterator(_) => "iterator",
        }
    }

    /// Approximate byte size, used by the governor's `max_memory` check.
    fn size_estimate(&self) -> usize {
        const BASE: usize = 48;
        match self {
            Self::Str(s) => BASE + s.value.len(),
            Self::Bytes(b) => BASE + b.data.len(),
            Self::List(l) => BASE + l.items.len() * 16,
            Self::Tuple(t) => BASE + t.items.len() * 16,
            Self::Dict(d) => BASE + d.entries.len() * 32,
            Self::Set(s) => BASE + s.entries.len() * 16,
            Self::Range(_) | Self::Iterator(_) => BASE,
            Self::Function(f) => BASE + f.defaults.len() * 16,
            Self::External(_) | Self::Builtin(_) | Self::Exception(_) => BASE,
        }
    }

    /// Every child `HeapId` this payload owns a strong reference to. Used
    /// both by plain release (recursive decrement) and the cycle collector
    /// (edge enumeration for trial deletion).
    fn children(&self) -> Vec<HeapId> {
        let mut out = Vec::new();
        let mut push = |v: &Value| {
            if let Some(h) = v.heap_id() {
                out.push(h);
            }
        };
        match self {
            Self::List(l) => l.items.iter().for_each(&mut push),
            Self::Tuple(t) => t.items.iter().for_each(&mut push),
            Self::Dict(d) => d.entries.iter().for_each(|(k, v)| {
                push(k);
                push(v);
            }),
            Self::Set(s) => s.entries.iter().for_each(&mut push),
            Self::Function(f) => f.defaults.values().for_each(&mut push),
            Self::Exception(e) => {
                e.args.iter().for_each(&mut push);
                if let Some(c) = e.cause {
                    out.push(c);
                }
            }
            Self::Iterator(it) => match it {
                IterObj::List { handle, .. }
                | IterObj::Tuple { handle, .. }
                | IterObj::Dict { handle, .. }
                | IterObj::Set { handle, .. }
                | IterObj::Str { handle, .. }
                | IterObj::Bytes { handle, .. } => out.push(*handle),
                IterObj::Range { .. } | IterObj::InlineStr { .. } => {}
            },
            Self::Str(_) | Self::Bytes(_) | Self::Range(_) | Self::External(_) | Self::Builtin(_) => {}
        }
        out
    }
}

struct Cell {
    data: HeapData,
    refcount: u32,
}

pub(crate) struct Heap {
    cells: Vec<Option<Cell>>,
    free_list: Vec<u32>,
    pub(crate) tracker: Box<dyn ResourceTracker>,
    depth: usize,
}

impl fmt::Debug for Heap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Heap").field("live", &self.live_count()).finish()
    }
}

impl Heap {
    pub(crate) fn new(tracker: Box<dyn ResourceTracker>) -> Self {
        Self { cells: Vec::new(), free_list: Vec::new(), tracker, depth: 0 }
    }

    pub(crate) fn live_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }

    fn cell(&self, id: HeapId) -> &Cell {
        self.cells[id.0 as usize].as_ref().expect("dangling HeapId")
    }

    fn cell_mut(&mut self, id: HeapId) -> &mut Cell {
        self.cells[id.0 as usize].as_mut().expect("dangling HeapId")
    }

    pub(crate) fn type_name(&self, id: HeapId) -> &'static str {
        self.cell(id).data.type_name()
    }

    // --- allocation & refcounting -----------------------------------------

    /// Allocates a new cell with refcount 1, subject to the governor. May
    /// trigger a cycle-collection pass if the configured `gc_interval` has
    /// elapsed.
    pub(crate) fn alloc(&mut self, data: HeapData) -> Result<HeapId, RunError> {
        let size = data.size_estimate();
        if let Err(e) = self.tracker.on_allocate(size) {
            return Err(self.resource_fault(e));
        }
        let id = match self.free_list.pop() {
            Some(idx) => {
                self.cells[idx as usize] = Some(Cell { data, refcount: 1 });
                HeapId(idx)
            }
            None => {
                self.cells.push(Some(Cell { data, refcount: 1 }));
                HeapId(self.cells.len() as u32 - 1)
            }
        };
        if self.tracker.should_collect() {
            self.collect_cycles();
            self.tracker.note_collected();
        }
        Ok(id)
    }

    /// Converts a resource-governor fault into the internal error type,
    /// allocating the backing exception cell directly (bypassing the
    /// governor check, since a sandbox that can't report "out of memory"
    /// because it's out of memory would be useless).
    fn resource_fault(&mut self, err: ResourceError) -> RunError {
        let catchable = err.catchable();
        let (kind, msg) = err.into_exc();
        let id = self.alloc_exception_unchecked(kind, Some(msg), None);
        if catchable { RunError::Raise(id) } else { RunError::Uncatchable(id) }
    }

    fn alloc_exception_unchecked(&mut self, kind: ExcType, msg: Option<String>, cause: Option<HeapId>) -> HeapId {
        let args = match msg {
            Some(m) => vec![self.alloc_str_unchecked(&m)],
            None => Vec::new(),
        };
        let idx = self.cells.len() as u32;
        self.cells.push(Some(Cell { data: HeapData::Exception(ExceptionObject { kind, args, cause }), refcount: 1 }));
        HeapId(idx)
    }

    fn alloc_str_unchecked(&mut self, s: &str) -> Value {
        if let Some(inline) = InlineStr::try_new(s) {
            return Value::Str(EitherStr::Inline(inline));
        }
        let idx = self.cells.len() as u32;
        self.cells.push(Some(Cell { data: HeapData::Str(StrObj::new(s.to_owned())), refcount: 1 }));
        Value::Str(EitherStr::Heap(HeapId(idx)))
    }

    /// Allocates a Monty exception and returns the `RunError` to propagate.
    pub(crate) fn raise(&mut self, kind: ExcType, msg: impl Into<String>) -> RunError {
        let id = self.alloc_exception_unchecked(kind, Some(msg.into()), None);
        RunError::Raise(id)
    }

    pub(crate) fn raise_bare(&mut self, kind: ExcType) -> RunError {
        let id = self.alloc_exception_unchecked(kind, None, None);
        RunError::Raise(id)
    }

    pub(crate) fn retain(&mut self, id: HeapId) {
        self.cell_mut(id).refcount += 1;
    }

    /// Retains and returns a new owning `Value` for whatever `v` is. Use
    /// this instead of `Clone` (deliberately not derived on `Value`) so
    /// every duplicate reference goes through the refcount.
    pub(crate) fn retain_clone(&mut self, v: &Value) -> Value {
        match v {
            Value::None => Value::None,
            Value::Bool(b) => Value::Bool(*b),
            Value::Int(i) => Value::Int(*i),
            Value::Float(f) => Value::Float(*f),
            Value::Str(EitherStr::Inline(s)) => Value::Str(EitherStr::Inline(s.clone())),
            Value::Str(EitherStr::Heap(h)) => {
                self.retain(*h);
                Value::Str(EitherStr::Heap(*h))
            }
            Value::Ref(h) => {
                self.retain(*h);
                Value::Ref(*h)
            }
        }
    }

    /// Releases one reference. At zero, recursively releases owned
    /// children and frees the slot. Cyclic garbage still live via internal
    /// references is reclaimed later by `collect_cycles`.
    pub(crate) fn release(&mut self, v: Value) {
        let Some(id) = v.heap_id() else { return };
        self.release_id(id);
    }

    fn release_id(&mut self, id: HeapId) {
        let cell = self.cell_mut(id);
        cell.refcount -= 1;
        if cell.refcount > 0 {
            return;
        }
        let Some(Cell { data, .. }) = self.cells[id.0 as usize].take() else { return };
        let size = data.size_estimate();
        let children = data.children();
        self.tracker.on_free(size);
        self.free_list.push(id.0);
        for child in children {
            self.release_id(child);
        }
    }

    // --- cycle collection ---------------------------------------------

    /// Trial-deletion mark-sweep over every live cell (§4.A, §5). Run
    /// on-demand at `gc_interval` and unconditionally at program end so
    /// invariant 9 (zero live cells after `run`) holds even for cycles.
    pub(crate) fn collect_cycles(&mut self) {
        let live: Vec<HeapId> = (0..self.cells.len() as u32).map(HeapId).filter(|id| self.cells[id.0 as usize].is_some()).collect();
        if live.is_empty() {
            return;
        }
        let mut gc_refs: std::collections::HashMap<HeapId, i64> =
            live.iter().map(|&id| (id, i64::from(self.cell(id).refcount))).collect();
        for &id in &live {
            for child in self.cell(id).data.children() {
                if let Some(r) = gc_refs.get_mut(&child) {
                    *r -= 1;
                }
            }
        }
        let mut reachable = std::collections::HashSet::new();
        let mut stack: Vec<HeapId> = live.iter().copied().filter(|id| gc_refs[id] > 0).collect();
        while let Some(id) = stack.pop() {
            if !reachable.insert(id) {
                continue;
            }
            stack.extend(self.cell(id).data.children());
        }
        let garbage: Vec<HeapId> = live.into_iter().filter(|id| !reachable.contains(id)).collect();
        if garbage.is_empty() {
            return;
        }
        let garbage_set: std::collections::HashSet<HeapId> = garbage.iter().copied().collect();
        for &id in &garbage {
            let Some(Cell { data, .. }) = self.cells[id.0 as usize].take() else { continue };
            self.tracker.on_free(data.size_estimate());
            self.free_list.push(id.0);
            for child in data.children() {
                if !garbage_set.contains(&child) {
                    self.release_id(child);
                }
            }
        }
    }

    // --- recursion depth -------------------------------------------------

    pub(crate) fn push_call(&mut self) -> Result<(), RunError> {
        self.depth += 1;
        let depth = self.depth;
        self.tracker.check_recursion(depth).map_err(|e| self.resource_fault(e))
    }

    pub(crate) fn pop_call(&mut self) {
        self.depth -= 1;
    }

    pub(crate) fn check_time(&mut self) -> Result<(), RunError> {
        match self.tracker.check_time() {
            Ok(()) => Ok(()),
            Err(e) => Err(self.resource_fault(e)),
        }
    }

    pub(crate) fn note_container_growth(&mut self) -> Result<(), RunError> {
        match self.tracker.on_allocate(0) {
            Ok(()) => Ok(()),
            Err(e) => Err(self.resource_fault(e)),
        }
    }

    // --- string helper -----------------------------------------------

    pub(crate) fn alloc_str(&mut self, s: &str) -> Result<Value, RunError> {
        if let Some(inline) = InlineStr::try_new(s) {
            return Ok(Value::Str(EitherStr::Inline(inline)));
        }
        let id = self.alloc(HeapData::Str(StrObj::new(s.to_owned())))?;
        Ok(Value::Str(EitherStr::Heap(id)))
    }

    pub(crate) fn str_of<'a>(&'a self, v: &'a Value) -> Option<&'a str> {
        match v {
            Value::Str(EitherStr::Inline(s)) => Some(s.as_str()),
            Value::Str(EitherStr::Heap(h)) => match &self.cell(*h).data {
                HeapData::Str(s) => Some(s.as_str()),
                _ => None,
            },
            _ => None,
        }
    }

    // --- typed accessors -----------------------------------------------

    pub(crate) fn get(&self, id: HeapId) -> &HeapData {
        &self.cell(id).data
    }

    pub(crate) fn get_mut(&mut self, id: HeapId) -> &mut HeapData {
        &mut self.cell_mut(id).data
    }

    pub(crate) const fn max_bound() -> usize {
        INLINE_STR_BOUND
    }

    // --- structural equality & hashing -----------------------------------

    /// Structural equality (§4.A). `None==None`; numeric promotion across
    /// `Bool`/`Int`/`Float` (`True == 1`); containers compare element-wise
    /// with an early length check; otherwise distinct types are unequal.
    pub(crate) fn values_equal(&self, a: &Value, b: &Value) -> bool {
        use Value::{Bool, Float, Int, None as VNone, Ref, Str};
        match (a, b) {
            (VNone, VNone) => true,
            (Bool(x), Bool(y)) => x == y,
            (Bool(x), Int(y)) | (Int(y), Bool(x)) => i64::from(*x) == *y,
            (Bool(x), Float(y)) | (Float(y), Bool(x)) => (f64::from(*x)) == *y,
            (Int(x), Int(y)) => x == y,
            (Float(x), Float(y)) => x == y,
            (Int(x), Float(y)) | (Float(y), Int(x)) => (*x as f64) == *y,
            (Str(_), Str(_)) => self.str_of(a) == self.str_of(b),
            (Ref(x), Ref(y)) => self.heap_values_equal(*x, *y),
            _ => false,
        }
    }

    fn heap_values_equal(&self, x: HeapId, y: HeapId) -> bool {
        if x == y {
            return true;
        }
        match (&self.cell(x).data, &self.cell(y).data) {
            (HeapData::Bytes(a), HeapData::Bytes(b)) => a.data == b.data,
            (HeapData::List(a), HeapData::List(b)) => {
                a.items.len() == b.items.len() && a.items.iter().zip(&b.items).all(|(p, q)| self.values_equal(p, q))
            }
            (HeapData::Tuple(a), HeapData::Tuple(b)) => {
                a.items.len() == b.items.len() && a.items.iter().zip(&b.items).all(|(p, q)| self.values_equal(p, q))
            }
            (HeapData::Set(a), HeapData::Set(b)) => {
                a.entries.len() == b.entries.len() && a.entries.iter().all(|v| b.entries.iter().any(|w| self.values_equal(v, w)))
            }
            (HeapData::Dict(a), HeapData::Dict(b)) => {
                a.entries.len() == b.entries.len()
                    && a.entries.iter().all(|(k, v)| b.get(self, k).is_some_and(|bv| self.values_equal(v, bv)))
            }
            (HeapData::Range(a), HeapData::Range(b)) => a == b,
            _ => false,
        }
    }

    /// `hash(v)`; unhashable values (mutable containers, functions) return
    /// `None` so callers can raise `TypeError`.
    pub(crate) fn py_hash(&self, v: &Value) -> Option<u64> {
        crate::py_hash::hash_value(self, v)
    }

    pub(crate) fn is_hashable(&self, v: &Value) -> bool {
        self.py_hash(v).is_some()
    }

    // --- truthiness --------------------------------------------------

    pub(crate) fn truthy(&self, v: &Value) -> bool {
        if let Some(b) = v.immediate_truthy() {
            return b;
        }
        match v {
            Value::Str(EitherStr::Heap(h)) => match &self.cell(*h).data {
                HeapData::Str(s) => !s.value.is_empty(),
                _ => true,
            },
            Value::Ref(h) => match &self.cell(*h).data {
                HeapData::Bytes(b) => !b.data.is_empty(),
                HeapData::List(l) => !l.items.is_empty(),
                HeapData::Tuple(t) => !t.items.is_empty(),
                HeapData::Dict(d) => !d.entries.is_empty(),
                HeapData::Set(s) => !s.entries.is_empty(),
                HeapData::Range(r) => r.len() > 0,
                _ => true,
            },
            _ => true,
        }
    }

    // --- iteration ---------------------------------------------------

    /// Advances the iterator cell at `id` one step. Needs `&mut self`
    /// because a list/tuple/bytes/str step may retain a new owning
    /// reference to the yielded element.
    /// Duplicates a `Value` without bumping its refcount yet — used to read
    /// an element out of a borrowed container before the retain, which needs
    /// `&mut self` and so can't happen while the container borrow is alive.
    pub(crate) fn shallow_copy_of(&self, v: &Value) -> Value {
        match v {
            Value::None => Value::None,
            Value::Bool(b) => Value::Bool(*b),
            Value::Int(i) => Value::Int(*i),
            Value::Float(f) => Value::Float(*f),
            Value::Str(EitherStr::Inline(s)) => Value::Str(EitherStr::Inline(s.clone())),
            Value::Str(EitherStr::Heap(h)) => Value::Str(EitherStr::Heap(*h)),
            Value::Ref(h) => Value::Ref(*h),
        }
    }

    pub(crate) fn finish_retain(&mut self, v: Value) -> Value {
        if let Some(h) = v.heap_id() {
            self.retain(h);
        }
        v
    }

    /// Detaches the list at `id` from the heap, runs `f` against it with
    /// unrestricted `&mut Heap` access, then puts it back. Needed whenever an
    /// operation both reads a container's own payload (`&self`) and mutates
    /// the heap (e.g. retaining copies of its elements) — the two borrows
    /// can't coexist while the container is still addressed through `self`.
    pub(crate) fn with_list<R>(&mut self, id: HeapId, f: impl FnOnce(&ListObj, &mut Heap) -> R) -> R {
        let HeapData::List(list) = std::mem::replace(self.get_mut(id), HeapData::List(ListObj::default())) else {
            panic!("with_list on a non-list cell")
        };
        let result = f(&list, self);
        *self.get_mut(id) = HeapData::List(list);
        result
    }

    pub(crate) fn with_tuple<R>(&mut self, id: HeapId, f: impl FnOnce(&TupleObj, &mut Heap) -> R) -> R {
        let HeapData::Tuple(tuple) = std::mem::replace(self.get_mut(id), HeapData::Tuple(TupleObj::new(Vec::new()))) else {
            panic!("with_tuple on a non-tuple cell")
        };
        let result = f(&tuple, self);
        *self.get_mut(id) = HeapData::Tuple(tuple);
        result
    }

    pub(crate) fn with_dict<R>(&mut self, id: HeapId, f: impl FnOnce(&DictObj, &mut Heap) -> R) -> R {
        let HeapData::Dict(dict) = std::mem::replace(self.get_mut(id), HeapData::Dict(DictObj::default())) else {
            panic!("with_dict on a non-dict cell")
        };
        let result = f(&dict, self);
        *self.get_mut(id) = HeapData::Dict(dict);
        result
    }

    pub(crate) fn with_set<R>(&mut self, id: HeapId, f: impl FnOnce(&SetObj, &mut Heap) -> R) -> R {
        let HeapData::Set(set) = std::mem::replace(self.get_mut(id), HeapData::Set(SetObj::default())) else {
            panic!("with_set on a non-set cell")
        };
        let result = f(&set, self);
        *self.get_mut(id) = HeapData::Set(set);
        result
    }

    /// Mutable counterpart to `with_dict`: needed for `insert`, which takes
    /// `&mut DictObj` *and* `&mut Heap` at once (to release a replaced
    /// value), the same borrow conflict `with_dict` exists to avoid.
    pub(crate) fn with_dict_mut<R>(&mut self, id: HeapId, f: impl FnOnce(&mut DictObj, &mut Heap) -> R) -> R {
        let HeapData::Dict(mut dict) = std::mem::replace(self.get_mut(id), HeapData::Dict(DictObj::default())) else {
            panic!("with_dict_mut on a non-dict cell")
        };
        let result = f(&mut dict, self);
        *self.get_mut(id) = HeapData::Dict(dict);
        result
    }

    /// Mutable counterpart to `with_set`, for `add`/`remove`.
    pub(crate) fn with_set_mut<R>(&mut self, id: HeapId, f: impl FnOnce(&mut SetObj, &mut Heap) -> R) -> R {
        let HeapData::Set(mut set) = std::mem::replace(self.get_mut(id), HeapData::Set(SetObj::default())) else {
            panic!("with_set_mut on a non-set cell")
        };
        let result = f(&mut set, self);
        *self.get_mut(id) = HeapData::Set(set);
        result
    }

    pub(crate) fn iter_next(&mut self, id: HeapId) -> crate::types::iter::StepResult {
        use crate::types::iter::{DictView, StepResult};

        // Snapshot the cursor state (all `Copy`) before touching the heap
        // again, so nothing here holds a borrow of `self` again.
        enum Snapshot {
            List { handle: HeapId, cursor: usize },
            Tuple { handle: HeapId, cursor: usize },
            Dict { handle: HeapId, version: u64, cursor: usize, view: DictView },
            Set { handle: HeapId, version: u64, cursor: usize },
            Range { start: i64, stop: i64, step: i64 },
            Str { handle: HeapId, cursor: usize },
            InlineStr { cursor: usize, ch: Option<char> },
            Bytes { handle: HeapId, cursor: usize },
        }

        let snapshot = match &self.cell(id).data {
            HeapData::Iterator(IterObj::List { handle, cursor }) => Snapshot::List { handle: *handle, cursor: *cursor },
            HeapData::Iterator(IterObj::Tuple { handle, cursor }) => Snapshot::Tuple { handle: *handle, cursor: *cursor },
            HeapData::Iterator(IterObj::Dict { handle, version, cursor, view }) => {
                Snapshot::Dict { handle: *handle, version: *version, cursor: *cursor, view: *view }
            }
            HeapData::Iterator(IterObj::Set { handle, version, cursor }) => {
                Snapshot::Set { handle: *handle, version: *version, cursor: *cursor }
            }
            HeapData::Iterator(IterObj::Range { start, stop, step }) => Snapshot::Range { start: *start, stop: *stop, step: *step },
            HeapData::Iterator(IterObj::Str { handle, cursor }) => Snapshot::Str { handle: *handle, cursor: *cursor },
            HeapData::Iterator(IterObj::InlineStr { chars, cursor }) => {
                Snapshot::InlineStr { cursor: *cursor, ch: chars.get(*cursor).copied() }
            }
            HeapData::Iterator(IterObj::Bytes { handle, cursor }) => Snapshot::Bytes { handle: *handle, cursor: *cursor },
            _ => panic!("iter_next on non-iterator cell"),
        };

        match snapshot {
            Snapshot::List { handle, cursor } => {
                let HeapData::List(l) = &self.cell(handle).data else { unreachable!() };
                if cursor >= l.items.len() {
                    return StepResult::Exhausted;
                }
                let dup = self.shallow_copy_of(&l.items[cursor]);
                let v = self.finish_retain(dup);
                self.advance_cursor(id);
                StepResult::Value(v)
            }
            Snapshot::Tuple { handle, cursor } => {
                let HeapData::Tuple(t) = &self.cell(handle).data else { unreachable!() };
                if cursor >= t.items.len() {
                    return StepResult::Exhausted;
                }
                let dup = self.shallow_copy_of(&t.items[cursor]);
                let v = self.finish_retain(dup);
                self.advance_cursor(id);
                StepResult::Value(v)
            }
            Snapshot::Dict { handle, version, cursor, view } => {
                let HeapData::Dict(d) = &self.cell(handle).data else { unreachable!() };
                if d.version != version {
                    return StepResult::SizeChanged;
                }
                if cursor >= d.entries.len() {
                    return StepResult::Exhausted;
                }
                let (key_dup, val_dup) = (self.shallow_copy_of(&d.entries[cursor].0), self.shallow_copy_of(&d.entries[cursor].1));
                let k = self.finish_retain(key_dup);
                let v = self.finish_retain(val_dup);
                self.advance_cursor(id);
                let value = match view {
                    DictView::Keys => {
                        self.release(v);
                        k
                    }
                    DictView::Values => {
                        self.release(k);
                        v
                    }
                    DictView::Items => {
                        let tuple = self.alloc(HeapData::Tuple(TupleObj::new(vec![k, v]))).expect("pair alloc");
                        Value::Ref(tuple)
                    }
                };
                StepResult::Value(value)
            }
            Snapshot::Set { handle, version, cursor } => {
                let HeapData::Set(s) = &self.cell(handle).data else { unreachable!() };
                if s.version != version {
                    return StepResult::SizeChanged;
                }
                if cursor >= s.entries.len() {
                    return StepResult::Exhausted;
                }
                let dup = self.shallow_copy_of(&s.entries[cursor]);
                let v = self.finish_retain(dup);
                self.advance_cursor(id);
                StepResult::Value(v)
            }
            Snapshot::Range { start, stop, step } => {
                let r = RangeObj::new(start, stop, step);
                if r.len() == 0 {
                    return StepResult::Exhausted;
                }
                let n = r.nth(0).expect("non-empty range has a first element");
                self.advance_range(id);
                StepResult::Value(Value::Int(n))
            }
            Snapshot::Str { handle, cursor } => {
                let HeapData::Str(s) = &self.cell(handle).data else { unreachable!() };
                match s.value.chars().nth(cursor) {
                    Some(c) => {
                        self.advance_cursor(id);
                        self.value_for_char(c)
                    }
                    None => StepResult::Exhausted,
                }
            }
            Snapshot::InlineStr { ch, .. } => match ch {
                Some(c) => {
                    self.advance_cursor(id);
                    self.value_for_char(c)
                }
                None => StepResult::Exhausted,
            },
            Snapshot::Bytes { handle, cursor } => {
                let HeapData::Bytes(b) = &self.cell(handle).data else { unreachable!() };
                match b.data.get(cursor).copied() {
                    Some(byte) => {
                        self.advance_cursor(id);
                        StepResult::Value(Value::Int(i64::from(byte)))
                    }
                    None => StepResult::Exhausted,
                }
            }
        }
    }

    fn value_for_char(&mut self, c: char) -> crate::types::iter::StepResult {
        let mut buf = [0u8; 4];
        let s = c.encode_utf8(&mut buf);
        crate::types::iter::StepResult::Value(self.alloc_str(s).expect("char alloc"))
    }

    fn advance_cursor(&mut self, id: HeapId) {
        if let HeapData::Iterator(it) = &mut self.cell_mut(id).data {
            match it {
                IterObj::List { cursor, .. }
                | IterObj::Tuple { cursor, .. }
                | IterObj::Dict { cursor, .. }
                | IterObj::Set { cursor, .. }
                | IterObj::Str { cursor, .. }
                | IterObj::InlineStr { cursor, .. }
                | IterObj::Bytes { cursor, .. } => *cursor += 1,
                IterObj::Range { .. } => unreachable!("range advances via advance_range"),
            }
        }
    }

    fn advance_range(&mut self, id: HeapId) {
        if let HeapData::Iterator(IterObj::Range { start, step, .. }) = &mut self.cell_mut(id).data {
            *start += *step;
        }
    }

    // --- repr / str ----------------------------------------------------

    pub(crate) fn repr(&self, v: &Value) -> String {
        let mut seen = Vec::new();
        self.repr_inner(v, true, &mut seen)
    }

    pub(crate) fn str_text(&self, v: &Value) -> String {
        match v {
            Value::Str(_) => self.str_of(v).unwrap_or_default().to_owned(),
            Value::Ref(h) => match &self.cell(*h).data {
                HeapData::Exception(e) => self.exception_message(e).unwrap_or_default().to_owned(),
                _ => self.repr(v),
            },
            _ => self.repr(v),
        }
    }

    /// The exception's first constructor argument, resolved to `&str` if it
    /// was a string (the common case: `raise ValueError("message")`).
    pub(crate) fn exception_message<'a>(&'a self, e: &'a ExceptionObject) -> Option<&'a str> {
        match e.first_arg()? {
            v @ Value::Str(_) => self.str_of(v),
            _ => None,
        }
    }

    fn repr_inner(&self, v: &Value, _top: bool, seen: &mut Vec<HeapId>) -> String {
        match v {
            Value::None => "None".to_owned(),
            Value::Bool(true) => "True".to_owned(),
            Value::Bool(false) => "False".to_owned(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => format_float(*f),
            Value::Str(_) => repr_str(self.str_of(v).unwrap_or_default()),
            Value::Ref(h) => self.repr_heap(*h, seen),
        }
    }

    fn repr_heap(&self, h: HeapId, seen: &mut Vec<HeapId>) -> String {
        if seen.contains(&h) {
            return match &self.cell(h).data {
                HeapData::Dict(_) => "{...}".to_owned(),
                _ => "[...]".to_owned(),
            };
        }
        match &self.cell(h).data {
            HeapData::Str(s) => repr_str(&s.value),
            HeapData::Bytes(b) => b.repr(),
            HeapData::List(l) => {
                seen.push(h);
                let s = format!("[{}]", l.items.iter().map(|v| self.repr_inner(v, false, seen)).collect::<Vec<_>>().join(", "));
                seen.pop();
                s
            }
            HeapData::Tuple(t) => {
                seen.push(h);
                let inner = t.items.iter().map(|v| self.repr_inner(v, false, seen)).collect::<Vec<_>>().join(", ");
                seen.pop();
                if t.items.len() == 1 { format!("({inner},)") } else { format!("({inner})") }
            }
            HeapData::Dict(d) => {
                seen.push(h);
                let s = format!(
                    "{{{}}}",
                    d.entries.iter().map(|(k, v)| format!("{}: {}", self.repr_inner(k, false, seen), self.repr_inner(v, false, seen))).collect::<Vec<_>>().join(", ")
                );
                seen.pop();
                s
            }
            HeapData::Set(s) => {
                if s.entries.is_empty() {
                    return "set()".to_owned();
                }
                seen.push(h);
                let out = format!("{{{}}}", s.entries.iter().map(|v| self.repr_inner(v, false, seen)).collect::<Vec<_>>().join(", "));
                seen.pop();
                out
            }
            HeapData::Range(r) => {
                if r.step == 1 {
                    format!("range({}, {})", r.start, r.stop)
                } else {
                    format!("range({}, {}, {})", r.start, r.stop, r.step)
                }
            }
            HeapData::Function(f) => format!("<function {}>", f.name),
            HeapData::External(e) => format!("<external_function {}>", e.name),
            HeapData::Builtin(b) => format!("<built-in function {}>", b.name),
            HeapData::Exception(e) => match self.exception_message(e) {
                Some(m) => format!("{}({})", e.kind, repr_str(m)),
                None => format!("{}()", e.kind),
            },
            HeapData::Iterator(_) => "<iterator>".to_owned(),
        }
    }
}

fn repr_str(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

pub(crate) fn format_float(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_owned();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf".to_owned() } else { "-inf".to_owned() };
    }
    if f == f.trunc() && f.abs() < 1e16 {
        format!("{f:.1}")
    } else {
        format!("{f}")
    }
}
