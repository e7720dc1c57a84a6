//! `hash(v)` (§4.A): defined on immutables, tuples-of-hashables, bytes, and
//! strings. `a == b` must imply `hash(a) == hash(b)` (§8, invariant 3); mutable
//! containers and functions are unhashable and return `None` so callers can
//! raise `TypeError`.

use std::hash::{Hash, Hasher};

use crate::heap::{Heap, HeapData};
use crate::value::Value;

pub(crate) fn hash_value(heap: &Heap, v: &Value) -> Option<u64> {
    let mut hasher = ahash::AHasher::default();
    match v {
        Value::None => 0u8.hash(&mut hasher),
        Value::Bool(b) => i64::from(*b).hash(&mut hasher),
        Value::Int(i) => i.hash(&mut hasher),
        Value::Float(f) => hash_float(*f, &mut hasher),
        Value::Str(_) => heap.str_of(v)?.hash(&mut hasher),
        Value::Ref(h) => match heap.get(*h) {
            HeapData::Bytes(b) => b.data.hash(&mut hasher),
            HeapData::Tuple(t) => {
                for item in &t.items {
                    hasher.write_u64(hash_value(heap, item)?);
                }
            }
            HeapData::Range(r) => {
                r.start.hash(&mut hasher);
                r.stop.hash(&mut hasher);
                r.step.hash(&mut hasher);
            }
            _ => return None,
        },
    }
    Some(hasher.finish())
}

/// An integral float hashes the same as the equal `Int` (`hash(1.0) ==
/// hash(1)`), since `1.0 == 1` must imply equal hashes.
fn hash_float(f: f64, hasher: &mut impl Hasher) {
    if f.fract() == 0.0 && f.is_finite() {
        (f as i64).hash(hasher);
    } else {
        f.to_bits().hash(hasher);
    }
}
