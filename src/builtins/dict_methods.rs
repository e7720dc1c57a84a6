//! `dict` methods (§4.B). `args`/`kwargs` are borrowed — the caller
//! releases them once this returns.

use crate::{
    eval::Ctx,
    exception::{ExcType, RunResult},
    heap::{HeapData, HeapId},
    types::{dict::DictObj, list::ListObj, tuple::TupleObj},
    value::Value,
};

pub(crate) fn call(ctx: &mut Ctx, id: HeapId, attr: &str, args: &[Value], kwargs: &[(String, Value)]) -> RunResult<Value> {
    if !kwargs.is_empty() && attr != "update" {
        let k = kwargs[0].0.clone();
        return Err(super::unexpected_kwarg(ctx, attr, &k));
    }
    match attr {
        "get" => get(ctx, id, args),
        "setdefault" => setdefault(ctx, id, args),
        "pop" => pop(ctx, id, args),
        "popitem" => popitem(ctx, id),
        "update" => update(ctx, id, args, kwargs),
        "clear" => {
            check_arity(ctx, attr, args, 0)?;
            let HeapData::Dict(d) = ctx.heap.get_mut(id) else { unreachable!() };
            let old = std::mem::take(&mut d.entries);
            d.version += 1;
            for (k, v) in old {
                ctx.heap.release(k);
                ctx.heap.release(v);
            }
            Ok(Value::None)
        }
        "copy" => {
            check_arity(ctx, attr, args, 0)?;
            let entries = ctx.heap.with_dict(id, |d, heap| d.copy_shallow(heap));
            let mut new = DictObj::new();
            for (k, v) in entries {
                new.insert(&mut ctx.heap, k, v);
            }
            let new_id = ctx.heap.alloc(HeapData::Dict(new))?;
            Ok(Value::Ref(new_id))
        }
        "keys" => view(ctx, id, View::Keys),
        "values" => view(ctx, id, View::Values),
        "items" => view(ctx, id, View::Items),
        _ => {
            let tn = ctx.heap.type_name(id);
            Err(ctx.heap.raise(ExcType::AttributeError, format!("'{tn}' object has no attribute '{attr}'")))
        }
    }
}

fn check_arity(ctx: &mut Ctx, name: &str, args: &[Value], n: usize) -> RunResult<()> {
    if args.len() != n {
        return Err(ctx.heap.raise(ExcType::TypeError, format!("dict.{name}() takes exactly {n} argument(s) ({} given)", args.len())));
    }
    Ok(())
}

fn check_hashable(ctx: &mut Ctx, key: &Value) -> RunResult<()> {
    if !ctx.heap.is_hashable(key) {
        return Err(ctx.heap.raise(ExcType::TypeError, "unhashable type"));
    }
    Ok(())
}

fn get(ctx: &mut Ctx, id: HeapId, args: &[Value]) -> RunResult<Value> {
    if args.is_empty() || args.len() > 2 {
        return Err(ctx.heap.raise(ExcType::TypeError, format!("dict.get() takes 1 or 2 arguments ({} given)", args.len())));
    }
    check_hashable(ctx, &args[0])?;
    let found = ctx.heap.with_dict(id, |d, heap| d.get(heap, &args[0]).map(|v| heap.shallow_copy_of(v)));
    match found {
        Some(v) => Ok(ctx.heap.finish_retain(v)),
        None => match args.get(1) {
            Some(default) => Ok(ctx.heap.retain_clone(default)),
            None => Ok(Value::None),
        },
    }
}

fn setdefault(ctx: &mut Ctx, id: HeapId, args: &[Value]) -> RunResult<Value> {
    if args.is_empty() || args.len() > 2 {
        return Err(ctx.heap.raise(ExcType::TypeError, format!("dict.setdefault() takes 1 or 2 arguments ({} given)", args.len())));
    }
    check_hashable(ctx, &args[0])?;
    let found = ctx.heap.with_dict(id, |d, heap| d.get(heap, &args[0]).map(|v| heap.shallow_copy_of(v)));
    if let Some(v) = found {
        return Ok(ctx.heap.finish_retain(v));
    }
    let default = match args.get(1) {
        Some(v) => ctx.heap.retain_clone(v),
        None => Value::None,
    };
    let key = ctx.heap.retain_clone(&args[0]);
    let value_for_dict = ctx.heap.retain_clone(&default);
    ctx.heap.with_dict_mut(id, |d, heap| d.insert(heap, key, value_for_dict));
    Ok(default)
}

fn pop(ctx: &mut Ctx, id: HeapId, args: &[Value]) -> RunResult<Value> {
    if args.is_empty() || args.len() > 2 {
        return Err(ctx.heap.raise(ExcType::TypeError, format!("dict.pop() takes 1 or 2 arguments ({} given)", args.len())));
    }
    check_hashable(ctx, &args[0])?;
    let removed = ctx.heap.with_dict_mut(id, |d, heap| d.remove(heap, &args[0]));
    match removed {
        Some((k, v)) => {
            ctx.heap.release(k);
            Ok(v)
        }
        None => match args.get(1) {
            Some(default) => Ok(ctx.heap.retain_clone(default)),
            None => {
                let repr = ctx.heap.repr(&args[0]);
                Err(ctx.heap.raise(ExcType::KeyError, repr))
            }
        },
    }
}

fn popitem(ctx: &mut Ctx, id: HeapId) -> RunResult<Value> {
    let HeapData::Dict(d) = ctx.heap.get_mut(id) else { unreachable!() };
    let last = d.entries.pop();
    if last.is_some() {
        d.version += 1;
    }
    match last {
        Some((k, v)) => {
            let pair_id = ctx.heap.alloc(HeapData::Tuple(TupleObj::new(vec![k, v])))?;
            Ok(Value::Ref(pair_id))
        }
        None => Err(ctx.heap.raise(ExcType::KeyError, "popitem(): dictionary is empty")),
    }
}

fn update(ctx: &mut Ctx, id: HeapId, args: &[Value], kwargs: &[(String, Value)]) -> RunResult<Value> {
    if args.len() > 1 {
        return Err(ctx.heap.raise(ExcType::TypeError, format!("dict.update() takes at most 1 argument ({} given)", args.len())));
    }
    if let Some(other) = args.first() {
        let pairs = match other {
            Value::Ref(oid) if matches!(ctx.heap.get(*oid), HeapData::Dict(_)) => ctx.heap.with_dict(*oid, |d, heap| d.copy_shallow(heap)),
            v => {
                let cloned = ctx.heap.retain_clone(v);
    let items = crate::eval::collect_iterable(ctx, cloned)?;
                let mut pairs = Vec::with_capacity(items.len());
                let mut err = None;
                for item in items {
                    match item {
                        Value::Ref(pid) if matches!(ctx.heap.get(pid), HeapData::Tuple(_) | HeapData::List(_)) => {
                            let (k, v) = pair_of(ctx, pid);
                            match (k, v) {
                                (Some(k), Some(v)) => pairs.push((k, v)),
                                _ => {
                                    err = Some(ctx.heap.raise(ExcType::ValueError, "dictionary update sequence element has wrong length"));
                                    break;
                                }
                            }
                        }
                        other => {
                            err = Some(ctx.heap.raise(ExcType::TypeError, "cannot convert update sequence element to a pair"));
                            ctx.heap.release(other);
                            break;
                        }
                    }
                }
                if let Some(e) = err {
                    for (k, v) in pairs {
                        ctx.heap.release(k);
                        ctx.heap.release(v);
                    }
                    return Err(e);
                }
                pairs
            }
        };
        for (k, v) in pairs {
            if !ctx.heap.is_hashable(&k) {
                ctx.heap.release(k);
                ctx.heap.release(v);
                return Err(ctx.heap.raise(ExcType::TypeError, "unhashable type"));
            }
            if let Some(old) = ctx.heap.with_dict_mut(id, |d, heap| d.insert(heap, k, v)) {
                ctx.heap.release(old);
            }
        }
    }
    for (name, v) in kwargs {
        let key = ctx.heap.alloc_str(name)?;
        let v = ctx.heap.retain_clone(v);
        if let Some(old) = ctx.heap.with_dict_mut(id, |d, heap| d.insert(heap, key, v)) {
            ctx.heap.release(old);
        }
    }
    Ok(Value::None)
}

fn pair_of(ctx: &mut Ctx, id: HeapId) -> (Option<Value>, Option<Value>) {
    let items: Vec<Value> = match ctx.heap.get(id) {
        HeapData::Tuple(t) => t.items.iter().map(|v| ctx.heap.shallow_copy_of(v)).collect(),
        HeapData::List(l) => l.items.iter().map(|v| ctx.heap.shallow_copy_of(v)).collect(),
        _ => unreachable!(),
    };
    let mut items: Vec<Value> = items.into_iter().map(|v| ctx.heap.finish_retain(v)).collect();
    ctx.heap.release(Value::Ref(id));
    if items.len() != 2 {
        for v in items {
            ctx.heap.release(v);
        }
        return (None, None);
    }
    let b = items.pop();
    let a = items.pop();
    (a, b)
}

enum View {
    Keys,
    Values,
    Items,
}

fn view(ctx: &mut Ctx, id: HeapId, which: View) -> RunResult<Value> {
    let entries = match ctx.heap.get(id) {
        HeapData::Dict(d) => d.entries.iter().map(|(k, v)| (ctx.heap.shallow_copy_of(k), ctx.heap.shallow_copy_of(v))).collect::<Vec<_>>(),
        _ => unreachable!(),
    };
    let mut items = Vec::with_capacity(entries.len());
    for (k, v) in entries {
        let k = ctx.heap.finish_retain(k);
        let v = ctx.heap.finish_retain(v);
        match which {
            View::Keys => {
                ctx.heap.release(v);
                items.push(k);
            }
            View::Values => {
                ctx.heap.release(k);
                items.push(v);
            }
            View::Items => {
                let pair_id = ctx.heap.alloc(HeapData::Tuple(TupleObj::new(vec![k, v])))?;
                items.push(Value::Ref(pair_id));
            }
        }
    }
    let list_id = ctx.heap.alloc(HeapData::List(ListObj::new(items)))?;
    Ok(Value::Ref(list_id))
}
