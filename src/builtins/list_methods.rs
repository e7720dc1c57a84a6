//! `list` methods (§4.B). Called only from `call_method` once the receiver
//! is known to be a `List`; `args`/`kwargs` are borrowed — the caller
//! releases them once this returns.

use super::{as_i64, globals};
use crate::{
    eval::Ctx,
    exception::{ExcType, RunResult},
    frame::Frame,
    heap::{HeapData, HeapId},
    types::list::ListObj,
    value::Value,
};

pub(crate) fn call(ctx: &mut Ctx, frame: &mut Frame, id: HeapId, attr: &str, args: &[Value], kwargs: &[(String, Value)]) -> RunResult<Value> {
    if !kwargs.is_empty() && attr != "sort" {
        let k = kwargs[0].0.clone();
        return Err(super::unexpected_kwarg(ctx, attr, &k));
    }
    match attr {
        "append" => append(ctx, id, args),
        "extend" => extend(ctx, id, args),
        "insert" => insert(ctx, id, args),
        "remove" => remove(ctx, id, args),
        "pop" => pop(ctx, id, args),
        "clear" => {
            check_arity(ctx, attr, args, 0)?;
            let HeapData::List(l) = ctx.heap.get_mut(id) else { unreachable!() };
            for v in std::mem::take(&mut l.items) {
                ctx.heap.release(v);
            }
            Ok(Value::None)
        }
        "reverse" => {
            check_arity(ctx, attr, args, 0)?;
            let HeapData::List(l) = ctx.heap.get_mut(id) else { unreachable!() };
            l.reverse();
            Ok(Value::None)
        }
        "copy" => {
            check_arity(ctx, attr, args, 0)?;
            let items = ctx.heap.with_list(id, |l, heap| l.copy_shallow(heap));
            let new_id = ctx.heap.alloc(HeapData::List(ListObj::new(items)))?;
            Ok(Value::Ref(new_id))
        }
        "index" => index_of(ctx, id, args),
        "count" => count(ctx, id, args),
        "sort" => sort(ctx, frame, id, kwargs),
        _ => {
            let tn = ctx.heap.type_name(id);
            Err(ctx.heap.raise(ExcType::AttributeError, format!("'{tn}' object has no attribute '{attr}'")))
        }
    }
}

fn check_arity(ctx: &mut Ctx, name: &str, args: &[Value], n: usize) -> RunResult<()> {
    if args.len() != n {
        return Err(ctx.heap.raise(ExcType::TypeError, format!("list.{name}() takes exactly {n} argument(s) ({} given)", args.len())));
    }
    Ok(())
}

fn append(ctx: &mut Ctx, id: HeapId, args: &[Value]) -> RunResult<Value> {
    check_arity(ctx, "append", args, 1)?;
    let v = ctx.heap.retain_clone(&args[0]);
    let HeapData::List(l) = ctx.heap.get_mut(id) else { unreachable!() };
    l.append(v);
    Ok(Value::None)
}

fn extend(ctx: &mut Ctx, id: HeapId, args: &[Value]) -> RunResult<Value> {
    check_arity(ctx, "extend", args, 1)?;
    let cloned = ctx.heap.retain_clone(&args[0]);
    let items = crate::eval::collect_iterable(ctx, cloned)?;
    let HeapData::List(l) = ctx.heap.get_mut(id) else { unreachable!() };
    l.extend(items);
    Ok(Value::None)
}

fn insert(ctx: &mut Ctx, id: HeapId, args: &[Value]) -> RunResult<Value> {
    check_arity(ctx, "insert", args, 2)?;
    let idx = as_i64(ctx, &args[0], "list.insert() index")?;
    let v = ctx.heap.retain_clone(&args[1]);
    let HeapData::List(l) = ctx.heap.get_mut(id) else { unreachable!() };
    l.insert(idx, v);
    Ok(Value::None)
}

fn remove(ctx: &mut Ctx, id: HeapId, args: &[Value]) -> RunResult<Value> {
    check_arity(ctx, "remove", args, 1)?;
    let found = ctx.heap.with_list(id, |l, heap| l.items.iter().position(|v| heap.values_equal(v, &args[0])));
    match found {
        Some(idx) => {
            let HeapData::List(l) = ctx.heap.get_mut(id) else { unreachable!() };
            let removed = l.remove_at(idx);
            ctx.heap.release(removed);
            Ok(Value::None)
        }
        None => Err(ctx.heap.raise(ExcType::ValueError, "list.remove(x): x not in list")),
    }
}

fn pop(ctx: &mut Ctx, id: HeapId, args: &[Value]) -> RunResult<Value> {
    if args.len() > 1 {
        return Err(ctx.heap.raise(ExcType::TypeError, format!("list.pop() takes at most 1 argument ({} given)", args.len())));
    }
    let idx = args.first().map(|v| as_i64(ctx, v, "list.pop() index")).transpose()?;
    let HeapData::List(l) = ctx.heap.get_mut(id) else { unreachable!() };
    match l.pop(idx) {
        Some(v) => Ok(v),
        None => Err(ctx.heap.raise(ExcType::IndexError, "pop from empty list")),
    }
}

fn index_of(ctx: &mut Ctx, id: HeapId, args: &[Value]) -> RunResult<Value> {
    if args.is_empty() || args.len() > 3 {
        return Err(ctx.heap.raise(ExcType::TypeError, format!("list.index() takes 1 to 3 arguments ({} given)", args.len())));
    }
    let len = match ctx.heap.get(id) {
        HeapData::List(l) => l.len(),
        _ => unreachable!(),
    };
    let start = args.get(1).map(|v| as_i64(ctx, v, "list.index() start")).transpose()?;
    let stop = args.get(2).map(|v| as_i64(ctx, v, "list.index() stop")).transpose()?;
    let range = super::slice_indices(len, start, stop, 1);
    let found = ctx.heap.with_list(id, |l, heap| range.iter().find(|&&i| heap.values_equal(&l.items[i], &args[0])).copied());
    match found {
        Some(i) => Ok(Value::Int(i as i64)),
        None => {
            let repr = ctx.heap.repr(&args[0]);
            Err(ctx.heap.raise(ExcType::ValueError, format!("{repr} is not in list")))
        }
    }
}

fn count(ctx: &mut Ctx, id: HeapId, args: &[Value]) -> RunResult<Value> {
    check_arity(ctx, "count", args, 1)?;
    let n = ctx.heap.with_list(id, |l, heap| l.items.iter().filter(|v| heap.values_equal(v, &args[0])).count());
    Ok(Value::Int(n as i64))
}

fn sort(ctx: &mut Ctx, frame: &mut Frame, id: HeapId, kwargs: &[(String, Value)]) -> RunResult<Value> {
    let key = kwargs.iter().find(|(k, _)| k == "key").map(|(_, v)| v);
    let reverse = kwargs
        .iter()
        .find(|(k, _)| k == "reverse")
        .map(|(_, v)| ctx.heap.truthy(v))
        .unwrap_or(false);
    if let Some((k, _)) = kwargs.iter().find(|(k, _)| k != "key" && k != "reverse") {
        let k = k.clone();
        return Err(super::unexpected_kwarg(ctx, "sort", &k));
    }
    let HeapData::List(l) = ctx.heap.get_mut(id) else { unreachable!() };
    let items = std::mem::take(&mut l.items);
    let sorted = globals::sort_values(ctx, frame, items, key, reverse);
    let HeapData::List(l) = ctx.heap.get_mut(id) else { unreachable!() };
    l.items = sorted?;
    Ok(Value::None)
}
