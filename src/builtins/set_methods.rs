//! `set` methods (§4.B). Binary set algebra (`|`, `&`, `-`, `^`) already
//! lives in [`super::arithmetic`]; the method forms below build on it
//! rather than re-deriving it. `args`/`kwargs` are borrowed — the caller
//! releases them once this returns.

use ruff_python_ast::Operator;

use crate::{
    eval::{collect_iterable, Ctx},
    exception::{ExcType, RunResult},
    heap::{Heap, HeapData, HeapId},
    types::set::SetObj,
    value::Value,
};

pub(crate) fn call(ctx: &mut Ctx, id: HeapId, attr: &str, args: &[Value], kwargs: &[(String, Value)]) -> RunResult<Value> {
    if !kwargs.is_empty() {
        let k = kwargs[0].0.clone();
        return Err(super::unexpected_kwarg(ctx, attr, &k));
    }
    match attr {
        "add" => {
            check_arity(ctx, attr, args, 1)?;
            let v = ctx.heap.retain_clone(&args[0]);
            ctx.heap.with_set_mut(id, |s, heap| s.add(heap, v));
            Ok(Value::None)
        }
        "remove" => {
            check_arity(ctx, attr, args, 1)?;
            let removed = ctx.heap.with_set_mut(id, |s, heap| s.remove(heap, &args[0]));
            match removed {
                Some(v) => {
                    ctx.heap.release(v);
                    Ok(Value::None)
                }
                None => {
                    let repr = ctx.heap.repr(&args[0]);
                    Err(ctx.heap.raise(ExcType::KeyError, repr))
                }
            }
        }
        "discard" => {
            check_arity(ctx, attr, args, 1)?;
            let removed = ctx.heap.with_set_mut(id, |s, heap| s.remove(heap, &args[0]));
            if let Some(v) = removed {
                ctx.heap.release(v);
            }
            Ok(Value::None)
        }
        "pop" => {
            check_arity(ctx, attr, args, 0)?;
            let HeapData::Set(s) = ctx.heap.get_mut(id) else { unreachable!() };
            if s.entries.is_empty() {
                return Err(ctx.heap.raise(ExcType::KeyError, "pop from an empty set"));
            }
            s.version += 1;
            Ok(s.entries.remove(0))
        }
        "clear" => {
            check_arity(ctx, attr, args, 0)?;
            let HeapData::Set(s) = ctx.heap.get_mut(id) else { unreachable!() };
            let old = std::mem::take(&mut s.entries);
            s.version += 1;
            for v in old {
                ctx.heap.release(v);
            }
            Ok(Value::None)
        }
        "copy" => {
            check_arity(ctx, attr, args, 0)?;
            let entries = ctx.heap.with_set(id, |s, heap| s.copy_shallow(heap));
            let mut new = SetObj::new();
            for v in entries {
                new.add(&mut ctx.heap, v);
            }
            let new_id = ctx.heap.alloc(HeapData::Set(new))?;
            Ok(Value::Ref(new_id))
        }
        "union" => combine(ctx, id, args, Operator::BitOr, false),
        "intersection" => combine(ctx, id, args, Operator::BitAnd, false),
        "difference" => combine(ctx, id, args, Operator::Sub, false),
        "symmetric_difference" => combine(ctx, id, args, Operator::BitXor, false),
        "update" => combine(ctx, id, args, Operator::BitOr, true),
        "intersection_update" => combine(ctx, id, args, Operator::BitAnd, true),
        "difference_update" => combine(ctx, id, args, Operator::Sub, true),
        "symmetric_difference_update" => combine(ctx, id, args, Operator::BitXor, true),
        "issubset" => relation(ctx, id, args, Relation::Subset),
        "issuperset" => relation(ctx, id, args, Relation::Superset),
        "isdisjoint" => relation(ctx, id, args, Relation::Disjoint),
        _ => {
            let tn = ctx.heap.type_name(id);
            Err(ctx.heap.raise(ExcType::AttributeError, format!("'{tn}' object has no attribute '{attr}'")))
        }
    }
}

fn check_arity(ctx: &mut Ctx, name: &str, args: &[Value], n: usize) -> RunResult<()> {
    if args.len() != n {
        return Err(ctx.heap.raise(ExcType::TypeError, format!("set.{name}() takes exactly {n} argument(s) ({} given)", args.len())));
    }
    Ok(())
}

/// Builds a plain `SetObj` out of an arbitrary iterable argument (not
/// necessarily a set), so `union`/`issubset`/etc. accept any iterable the
/// way Python's do.
fn coerce_to_set(ctx: &mut Ctx, v: &Value) -> RunResult<SetObj> {
    if let Value::Ref(oid) = v {
        if matches!(ctx.heap.get(*oid), HeapData::Set(_)) {
            let entries = ctx.heap.with_set(*oid, |s, heap| s.copy_shallow(heap));
            let mut out = SetObj::new();
            for item in entries {
                out.add(&mut ctx.heap, item);
            }
            return Ok(out);
        }
    }
    let cloned = ctx.heap.retain_clone(v);
    let items = collect_iterable(ctx, cloned)?;
    let mut out = SetObj::new();
    for item in items {
        if !ctx.heap.is_hashable(&item) {
            let tn = item.type_name(&ctx.heap);
            ctx.heap.release(item);
            return Err(ctx.heap.raise(ExcType::TypeError, format!("unhashable type: '{tn}'")));
        }
        out.add(&mut ctx.heap, item);
    }
    Ok(out)
}

/// `op` over `self` and each positional argument, left to right. `in_place`
/// writes the final result back into `id` instead of allocating a new set.
fn combine(ctx: &mut Ctx, id: HeapId, args: &[Value], op: Operator, in_place: bool) -> RunResult<Value> {
    let mut acc = ctx.heap.with_set(id, |s, heap| s.copy_shallow(heap));
    for arg in args {
        let other = match coerce_to_set(ctx, arg) {
            Ok(o) => o,
            Err(e) => {
                for v in acc {
                    ctx.heap.release(v);
                }
                return Err(e);
            }
        };
        let shallow = apply_set_op(&ctx.heap, &acc, &other, op);
        let next: Vec<Value> = shallow.into_iter().map(|v| ctx.heap.finish_retain(v)).collect();
        for v in acc {
            ctx.heap.release(v);
        }
        for v in other.entries {
            ctx.heap.release(v);
        }
        acc = next;
    }
    if in_place {
        let old = ctx.heap.with_set_mut(id, |s, _heap| {
            s.version += 1;
            std::mem::take(&mut s.entries)
        });
        for v in old {
            ctx.heap.release(v);
        }
        ctx.heap.with_set_mut(id, |s, heap| {
            for v in acc {
                s.add(heap, v);
            }
        });
        Ok(Value::None)
    } else {
        let mut new = SetObj::new();
        for v in acc {
            new.add(&mut ctx.heap, v);
        }
        let new_id = ctx.heap.alloc(HeapData::Set(new))?;
        Ok(Value::Ref(new_id))
    }
}

/// Returns shallow (not-yet-retained) copies — the caller runs each one
/// through `Heap::finish_retain` once this returns, mirroring how
/// `arithmetic::set_or_fail` avoids holding `&ctx.heap` and `&mut ctx.heap`
/// open across the same iterator chain.
fn apply_set_op(heap: &Heap, a: &[Value], b: &SetObj, op: Operator) -> Vec<Value> {
    match op {
        Operator::BitOr => {
            let mut out: Vec<Value> = a.iter().map(|v| heap.shallow_copy_of(v)).collect();
            for v in &b.entries {
                if !a.iter().any(|w| heap.values_equal(v, w)) {
                    out.push(heap.shallow_copy_of(v));
                }
            }
            out
        }
        Operator::BitAnd => a.iter().filter(|v| b.entries.iter().any(|w| heap.values_equal(v, w))).map(|v| heap.shallow_copy_of(v)).collect(),
        Operator::Sub => a.iter().filter(|v| !b.entries.iter().any(|w| heap.values_equal(v, w))).map(|v| heap.shallow_copy_of(v)).collect(),
        Operator::BitXor => {
            let mut out: Vec<Value> = a.iter().filter(|v| !b.entries.iter().any(|w| heap.values_equal(v, w))).map(|v| heap.shallow_copy_of(v)).collect();
            out.extend(b.entries.iter().filter(|v| !a.iter().any(|w| heap.values_equal(v, w))).map(|v| heap.shallow_copy_of(v)));
            out
        }
        _ => unreachable!("only set algebra operators reach here"),
    }
}

enum Relation {
    Subset,
    Superset,
    Disjoint,
}

fn relation(ctx: &mut Ctx, id: HeapId, args: &[Value], which: Relation) -> RunResult<Value> {
    if args.len() != 1 {
        return Err(ctx.heap.raise(ExcType::TypeError, "expected exactly one argument"));
    }
    let other = coerce_to_set(ctx, &args[0])?;
    let ours = ctx.heap.with_set(id, |s, heap| s.copy_shallow(heap));
    let result = match which {
        Relation::Subset => ours.iter().all(|v| other.entries.iter().any(|w| ctx.heap.values_equal(v, w))),
        Relation::Superset => other.entries.iter().all(|v| ours.iter().any(|w| ctx.heap.values_equal(v, w))),
        Relation::Disjoint => !ours.iter().any(|v| other.entries.iter().any(|w| ctx.heap.values_equal(v, w))),
    };
    for v in ours {
        ctx.heap.release(v);
    }
    for v in other.entries {
        ctx.heap.release(v);
    }
    Ok(Value::Bool(result))
}
