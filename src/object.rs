//! The host-visible value type and the materialization boundary between it
//! and the internal, heap-handle based [`crate::value::Value`].
//!
//! `Object` is plain, owned, and `Clone` — unlike `Value` it carries no
//! strong reference into the interpreter's object store, so a host can hold
//! one after `run` returns without pinning heap cells alive. Crossing the
//! boundary in either direction is a deep, eager conversion: `materialize`
//! (`Value` → `Object`) walks and clones containers one level at a time (used
//! for inputs, external-function arguments, and the final return value);
//! `internalize` (`Object` → `Value`) allocates fresh heap cells (used for
//! external-function results and declared inputs).

use std::collections::HashMap;

use crate::{
    exception::RunResult,
    heap::{Heap, HeapData, HeapId},
    types::{BytesObj, DictObj, ListObj, RangeObj, SetObj, TupleObj},
    value::Value,
};

/// A fully owned, host-visible Monty value.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Object>),
    Tuple(Vec<Object>),
    Dict(Vec<(Object, Object)>),
    Set(Vec<Object>),
    Range { start: i64, stop: i64, step: i64 },
    /// A materialized exception, returned from `Program::run` on an
    /// uncaught error or produced by `str(exc)`/`repr(exc)` round-tripping.
    Exception { kind: String, message: Option<String>, cause: Option<Box<Object>> },
}

impl Object {
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }
}

/// Deep-converts a `Value` into an owned `Object`, without consuming (or
/// releasing) the borrowed `Value`'s reference.
///
/// Cyclic containers are possible (§3, §8 scenario 6/7) and `Object` has no
/// cyclic representation, so this tracks the handles currently being
/// descended into the same way `Heap::repr` does, short-circuiting a
/// container that contains itself to a truncated placeholder instead of
/// recursing forever.
pub(crate) fn materialize(heap: &Heap, v: &Value) -> Object {
    let mut seen = Vec::new();
    materialize_inner(heap, v, &mut seen)
}

fn materialize_inner(heap: &Heap, v: &Value, seen: &mut Vec<HeapId>) -> Object {
    match v {
        Value::None => Object::None,
        Value::Bool(b) => Object::Bool(*b),
        Value::Int(i) => Object::Int(*i),
        Value::Float(f) => Object::Float(*f),
        Value::Str(_) => Object::Str(heap.str_of(v).unwrap_or_default().to_owned()),
        Value::Ref(h) => materialize_heap(heap, *h, seen),
    }
}

fn materialize_heap(heap: &Heap, h: HeapId, seen: &mut Vec<HeapId>) -> Object {
    if seen.contains(&h) {
        return match heap.get(h) {
            HeapData::Dict(_) => Object::Str("{...}".to_owned()),
            _ => Object::Str("[...]".to_owned()),
        };
    }
    match heap.get(h) {
        HeapData::Str(s) => Object::Str(s.value.clone()),
        HeapData::Bytes(b) => Object::Bytes(b.data.clone()),
        HeapData::List(l) => {
            seen.push(h);
            let out = Object::List(l.items.iter().map(|v| materialize_inner(heap, v, seen)).collect());
            seen.pop();
            out
        }
        HeapData::Tuple(t) => {
            seen.push(h);
            let out = Object::Tuple(t.items.iter().map(|v| materialize_inner(heap, v, seen)).collect());
            seen.pop();
            out
        }
        HeapData::Dict(d) => {
            seen.push(h);
            let out = Object::Dict(d.entries.iter().map(|(k, v)| (materialize_inner(heap, k, seen), materialize_inner(heap, v, seen))).collect());
            seen.pop();
            out
        }
        HeapData::Set(s) => {
            seen.push(h);
            let out = Object::Set(s.entries.iter().map(|v| materialize_inner(heap, v, seen)).collect());
            seen.pop();
            out
        }
        HeapData::Range(r) => Object::Range { start: r.start, stop: r.stop, step: r.step },
        HeapData::Exception(e) => {
            seen.push(h);
            let out = Object::Exception {
                kind: e.kind.to_string(),
                message: heap.exception_message(e).map(str::to_owned),
                cause: e.cause.map(|c| Box::new(materialize_heap(heap, c, seen))),
            };
            seen.pop();
            out
        }
        HeapData::Function(f) => Object::Str(format!("<function {}>", f.name)),
        HeapData::External(f) => Object::Str(format!("<external_function {}>", f.name)),
        HeapData::Builtin(b) => Object::Str(format!("<built-in function {}>", b.name)),
        HeapData::Iterator(_) => Object::Str("<iterator>".to_owned()),
    }
}

/// Allocates fresh heap cells for `obj`, returning an owning `Value` handle.
pub(crate) fn internalize(heap: &mut Heap, obj: &Object) -> RunResult<Value> {
    Ok(match obj {
        Object::None => Value::None,
        Object::Bool(b) => Value::Bool(*b),
        Object::Int(i) => Value::Int(*i),
        Object::Float(f) => Value::Float(*f),
        Object::Str(s) => heap.alloc_str(s)?,
        Object::Bytes(data) => Value::Ref(heap.alloc(HeapData::Bytes(BytesObj::new(data.clone())))?),
        Object::List(items) => {
            let vals = items.iter().map(|o| internalize(heap, o)).collect::<RunResult<Vec<_>>>()?;
            Value::Ref(heap.alloc(HeapData::List(ListObj::new(vals)))?)
        }
        Object::Tuple(items) => {
            let vals = items.iter().map(|o| internalize(heap, o)).collect::<RunResult<Vec<_>>>()?;
            Value::Ref(heap.alloc(HeapData::Tuple(TupleObj::new(vals)))?)
        }
        Object::Dict(entries) => {
            let mut dict = DictObj::new();
            for (k, v) in entries {
                let key = internalize(heap, k)?;
                let val = internalize(heap, v)?;
                dict.insert(heap, key, val);
            }
            Value::Ref(heap.alloc(HeapData::Dict(dict))?)
        }
        Object::Set(items) => {
            let mut set = SetObj::new();
            for o in items {
                let v = internalize(heap, o)?;
                set.add(heap, v);
            }
            Value::Ref(heap.alloc(HeapData::Set(set))?)
        }
        Object::Range { start, stop, step } => Value::Ref(heap.alloc(HeapData::Range(RangeObj::new(*start, *stop, *step)))?),
        Object::Exception { kind, message, cause } => {
            let kind = kind.parse().map_err(|_| crate::exception::RunError::Internal("unknown exception kind in Object"))?;
            let cause_id = match cause {
                Some(c) => internalize(heap, c)?.heap_id(),
                None => None,
            };
            let args = match message {
                Some(m) => vec![heap.alloc_str(m)?],
                None => Vec::new(),
            };
            Value::Ref(heap.alloc(HeapData::Exception(crate::exception::ExceptionObject { kind, args, cause: cause_id }))?)
        }
    })
}

/// Converts an `Object::Str`-keyed-ish kwargs style dict into the
/// `(name, Value)` pairs external calls pass back, used by `run::dispatch`.
pub(crate) fn dict_to_pairs(heap: &mut Heap, entries: &[(Object, Object)]) -> RunResult<Vec<(String, Value)>> {
    entries
        .iter()
        .map(|(k, v)| {
            let key = k.as_str().unwrap_or_default().to_owned();
            Ok((key, internalize(heap, v)?))
        })
        .collect()
}

/// A convenience used by `Program::run` for converting the declared-input
/// map (host-side `HashMap<String, Object>`) a single name at a time.
pub(crate) fn lookup_input<'a>(inputs: &'a HashMap<String, Object>, name: &str) -> Option<&'a Object> {
    inputs.get(name)
}
